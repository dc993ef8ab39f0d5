//! Light types
//!
//! Lights are owned by the lighting code; shadow code only reads them.

use glam::Vec3;

/// Light kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

/// A light as seen by the shadow subsystem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    /// World position. Directional lights use it as the eye of their
    /// orthographic shadow volume.
    pub position: Vec3,
    /// Direction the light points at (ignored by point lights).
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// Cosine of the spot half-angle.
    pub cutoff: f32,
}

impl Light {
    /// Create a directional light.
    pub fn directional(position: Vec3, direction: Vec3) -> Self {
        Self {
            kind: LightKind::Directional,
            position,
            direction,
            color: Vec3::ONE,
            intensity: 1.0,
            cutoff: 0.0,
        }
    }

    /// Create a point light.
    pub fn point(position: Vec3) -> Self {
        Self {
            kind: LightKind::Point,
            position,
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
            intensity: 1.0,
            cutoff: 0.0,
        }
    }

    /// Create a spot light with a half-angle in degrees.
    pub fn spot(position: Vec3, direction: Vec3, half_angle_degrees: f32) -> Self {
        Self {
            kind: LightKind::Spot,
            position,
            direction,
            color: Vec3::ONE,
            intensity: 1.0,
            cutoff: half_angle_degrees.to_radians().cos(),
        }
    }

    /// Set the color (builder pattern).
    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    /// Set the intensity (builder pattern).
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }
}
