//! Scene collaborator
//!
//! Shadow passes only need each object's world transform and a way to draw
//! its geometry with whatever program is currently bound.

use crate::device::{DeviceError, GraphicsDevice, MeshId};
use glam::{Mat4, Quat, Vec3};

/// Position, Euler rotation (radians) and scale of an object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Transform {
    /// Identity transform.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    /// Transform at a position.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Set the scale (builder pattern).
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Set the rotation (builder pattern).
    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    /// Model matrix: translate, then rotate X, Y, Z, then scale.
    pub fn model_matrix(&self) -> Mat4 {
        let rotation = Quat::from_rotation_x(self.rotation.x)
            * Quat::from_rotation_y(self.rotation.y)
            * Quat::from_rotation_z(self.rotation.z);
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Something that can be drawn into a shadow map.
pub trait Renderable {
    /// World transform of the object.
    fn transform(&self) -> Transform;

    /// Issue the draw calls for this object's geometry. Programs and
    /// uniforms are already bound by the caller.
    fn draw_geometry(&self, device: &mut dyn GraphicsDevice);
}

impl<T: Renderable + ?Sized> Renderable for &T {
    fn transform(&self) -> Transform {
        (**self).transform()
    }

    fn draw_geometry(&self, device: &mut dyn GraphicsDevice) {
        (**self).draw_geometry(device)
    }
}

impl<T: Renderable + ?Sized> Renderable for Box<T> {
    fn transform(&self) -> Transform {
        (**self).transform()
    }

    fn draw_geometry(&self, device: &mut dyn GraphicsDevice) {
        (**self).draw_geometry(device)
    }
}

/// An uploaded mesh with a transform.
#[derive(Debug, Clone, Copy)]
pub struct MeshObject {
    pub mesh: MeshId,
    pub index_count: u32,
    pub transform: Transform,
}

impl MeshObject {
    /// Upload geometry and wrap it in an object.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        positions: &[[f32; 3]],
        indices: &[u32],
        transform: Transform,
    ) -> Result<Self, DeviceError> {
        let mesh = device.create_mesh(positions, indices)?;
        Ok(Self {
            mesh,
            index_count: indices.len() as u32,
            transform,
        })
    }

    /// Unit cube centered at the origin.
    pub fn cube(device: &mut dyn GraphicsDevice, transform: Transform) -> Result<Self, DeviceError> {
        let (positions, indices) = cube_geometry();
        Self::new(device, &positions, &indices, transform)
    }

    /// Flat square in the XZ plane, `size` units wide, facing +Y.
    pub fn plane(device: &mut dyn GraphicsDevice, size: f32, transform: Transform) -> Result<Self, DeviceError> {
        let h = size * 0.5;
        let positions = [[-h, 0.0, -h], [-h, 0.0, h], [h, 0.0, h], [h, 0.0, -h]];
        Self::new(device, &positions, &[0, 1, 2, 0, 2, 3], transform)
    }
}

impl Renderable for MeshObject {
    fn transform(&self) -> Transform {
        self.transform
    }

    fn draw_geometry(&self, device: &mut dyn GraphicsDevice) {
        device.draw_indexed(self.mesh, self.index_count);
    }
}

/// Positions and counter-clockwise indices of a unit cube.
pub fn cube_geometry() -> (Vec<[f32; 3]>, Vec<u32>) {
    let positions = vec![
        [-0.5, -0.5, -0.5],
        [0.5, -0.5, -0.5],
        [0.5, 0.5, -0.5],
        [-0.5, 0.5, -0.5],
        [-0.5, -0.5, 0.5],
        [0.5, -0.5, 0.5],
        [0.5, 0.5, 0.5],
        [-0.5, 0.5, 0.5],
    ];
    let indices = vec![
        4, 5, 6, 4, 6, 7, // front (+Z)
        1, 0, 3, 1, 3, 2, // back (-Z)
        0, 4, 7, 0, 7, 3, // left (-X)
        5, 1, 2, 5, 2, 6, // right (+X)
        7, 6, 2, 7, 2, 3, // top (+Y)
        0, 1, 5, 0, 5, 4, // bottom (-Y)
    ];
    (positions, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_matrix_order() {
        let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0))
            .with_scale(Vec3::splat(2.0))
            .with_rotation(Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0));
        let model = transform.model_matrix();

        // Scale is applied first, then rotation, then translation.
        let p = model.transform_point3(Vec3::X);
        assert!((p - Vec3::new(1.0, 2.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_cube_geometry() {
        let (positions, indices) = cube_geometry();
        assert_eq!(positions.len(), 8);
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&i| (i as usize) < positions.len()));
    }
}
