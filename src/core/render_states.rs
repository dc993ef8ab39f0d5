//! Render state configurations
//!
//! Small value types describing fixed-function state for shadow and debug
//! pipelines.

/// Clear state for depth-only targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearState {
    /// Depth value to clear to (0.0-1.0), or None to keep the contents.
    pub depth: Option<f32>,
}

impl ClearState {
    /// Clear depth to the given value.
    pub fn depth(depth: f32) -> Self {
        Self { depth: Some(depth) }
    }

    /// Keep the existing depth contents.
    pub fn load() -> Self {
        Self { depth: None }
    }

    /// Get the wgpu load operation for depth.
    pub fn depth_load_op(&self) -> wgpu::LoadOp<f32> {
        match self.depth {
            Some(d) => wgpu::LoadOp::Clear(d),
            None => wgpu::LoadOp::Load,
        }
    }
}

impl Default for ClearState {
    fn default() -> Self {
        Self::depth(1.0)
    }
}

/// Depth test configuration.
#[derive(Debug, Clone, Copy)]
pub struct DepthState {
    /// Whether to write to the depth buffer.
    pub write: bool,
    /// Comparison function for depth test.
    pub compare: wgpu::CompareFunction,
}

impl DepthState {
    /// Depth testing enabled with writes.
    pub fn read_write() -> Self {
        Self {
            write: true,
            compare: wgpu::CompareFunction::LessEqual,
        }
    }

    /// Convert to wgpu depth stencil state.
    pub fn to_wgpu(&self, format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        wgpu::DepthStencilState {
            format,
            depth_write_enabled: self.write,
            depth_compare: self.compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    }
}

impl Default for DepthState {
    fn default() -> Self {
        Self::read_write()
    }
}

/// Cull mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullState {
    /// No culling.
    #[default]
    None,
    /// Cull front faces. Shadow passes use this to keep thin geometry from
    /// self-shadowing.
    Front,
    /// Cull back faces.
    Back,
}

impl CullState {
    /// Every cull state, in pipeline-variant order.
    pub const ALL: [CullState; 3] = [CullState::None, CullState::Front, CullState::Back];

    /// Convert to wgpu cull mode.
    pub fn to_wgpu(&self) -> Option<wgpu::Face> {
        match self {
            CullState::None => None,
            CullState::Front => Some(wgpu::Face::Front),
            CullState::Back => Some(wgpu::Face::Back),
        }
    }

    /// Index into per-cull-state arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}
