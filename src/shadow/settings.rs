//! Shadow configuration and runtime settings

use crate::error::ShadowError;
use std::fmt;
use std::path::PathBuf;

/// Shadow map quality tier. Selects map resolution when a resource is
/// created; existing resources keep their size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityTier {
    /// All tiers, lowest first.
    pub const ALL: [QualityTier; 3] = [QualityTier::Low, QualityTier::Medium, QualityTier::High];

    /// Index into resolution tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Next tier, wrapping from High back to Low.
    pub fn next(self) -> Self {
        match self {
            QualityTier::Low => QualityTier::Medium,
            QualityTier::Medium => QualityTier::High,
            QualityTier::High => QualityTier::Low,
        }
    }
}

impl TryFrom<u8> for QualityTier {
    type Error = ShadowError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        QualityTier::ALL
            .get(value as usize)
            .copied()
            .ok_or(ShadowError::InvalidQuality(value))
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        };
        f.write_str(name)
    }
}

/// Near/far planes and extent of a light projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParams {
    /// Half-extent of an orthographic volume. Unused by perspective
    /// projections.
    pub half_extent: f32,
    pub near: f32,
    pub far: f32,
}

/// Vertex and fragment source of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl ShaderSource {
    /// `<dir>/<name>_vertex.wgsl` and `<dir>/<name>_fragment.wgsl`.
    pub fn named(dir: impl Into<PathBuf>, name: &str) -> Self {
        let dir = dir.into();
        Self {
            vertex: dir.join(format!("{name}_vertex.wgsl")),
            fragment: dir.join(format!("{name}_fragment.wgsl")),
        }
    }
}

/// Shader files of the shadow programs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPaths {
    /// Depth program for directional and spot maps.
    pub depth: ShaderSource,
    /// Linear-distance depth program for point cube maps.
    pub point_depth: ShaderSource,
    /// On-screen shadow map visualization. Optional at runtime.
    pub debug: ShaderSource,
}

impl ShaderPaths {
    /// Standard file names under `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            depth: ShaderSource::named(&dir, "shadow"),
            point_depth: ShaderSource::named(&dir, "point_shadow"),
            debug: ShaderSource::named(&dir, "debug"),
        }
    }
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self::in_dir("shaders/shadows")
    }
}

/// Shadow subsystem configuration.
#[derive(Debug, Clone)]
pub struct ShadowConfig {
    /// Slots per light kind.
    pub pool_capacity: usize,
    /// 2D map resolution per quality tier.
    pub map_sizes: [u32; 3],
    /// Cube face resolution per quality tier.
    pub cube_map_sizes: [u32; 3],
    pub default_quality: QualityTier,
    /// Depth bias published to the lighting shader.
    pub bias: f32,
    /// Far plane of new point shadow maps.
    pub point_far_plane: f32,
    pub point_near: f32,
    /// First texture unit used for shadow maps.
    pub first_texture_unit: u32,
    /// Drop resources whose light vanished or changed kind during reconcile.
    pub prune_stale: bool,
    pub directional: ProjectionParams,
    pub spot: ProjectionParams,
    pub shaders: ShaderPaths,
}

impl ShadowConfig {
    /// 2D map resolution for a tier.
    pub fn map_size(&self, quality: QualityTier) -> u32 {
        self.map_sizes[quality.index()]
    }

    /// Cube face resolution for a tier.
    pub fn cube_map_size(&self, quality: QualityTier) -> u32 {
        self.cube_map_sizes[quality.index()]
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 8,
            map_sizes: [512, 1024, 2048],
            cube_map_sizes: [256, 512, 1024],
            default_quality: QualityTier::Medium,
            bias: 0.005,
            point_far_plane: 25.0,
            point_near: 1.0,
            first_texture_unit: 10,
            prune_stale: true,
            directional: ProjectionParams {
                half_extent: 5.0,
                near: 1.0,
                far: 7.5,
            },
            spot: ProjectionParams {
                half_extent: 0.0,
                near: 1.0,
                far: 25.0,
            },
            shaders: ShaderPaths::default(),
        }
    }
}

/// Runtime shadow settings, changed by the controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSettings {
    pub enabled: bool,
    pub bias: f32,
    pub quality: QualityTier,
    pub show_debug: bool,
}

impl ShadowSettings {
    /// Initial settings for a configuration.
    pub fn from_config(config: &ShadowConfig) -> Self {
        Self {
            enabled: true,
            bias: config.bias,
            quality: config.default_quality,
            show_debug: false,
        }
    }
}
