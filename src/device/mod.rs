//! Graphics device abstraction
//!
//! The shadow subsystem talks to the GPU through [`GraphicsDevice`], a small
//! stateful object model: textures, depth-only framebuffers, programs with
//! named uniforms, texture units and a viewport. Two backends are provided:
//! [`WgpuDevice`] records commands and encodes them into wgpu render passes,
//! [`HeadlessDevice`] keeps the same state in memory for tests and tooling.

mod gpu;
mod headless;
mod uniform;

pub use gpu::WgpuDevice;
pub use headless::{ClearRecord, DrawRecord, HeadlessDevice};
pub use uniform::{UniformDecl, UniformLayout, UniformLocation, UniformType, UniformValue};

use crate::core::render_states::CullState;
use std::fmt;
use std::path::PathBuf;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Raw handle value. Never zero and never reused by a device.
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// Handle to a depth texture (2D or cube).
    TextureId
);
handle!(
    /// Handle to a framebuffer object.
    FramebufferId
);
handle!(
    /// Handle to a compiled shader program.
    ProgramId
);
handle!(
    /// Handle to uploaded indexed geometry (a vertex array).
    MeshId
);

/// Monotonic handle counter. Starts at 1 so 0 can never be a live handle.
#[derive(Debug)]
pub(crate) struct HandleAllocator {
    next: u32,
}

impl HandleAllocator {
    pub(crate) fn new() -> Self {
        Self { next: 1 }
    }

    pub(crate) fn allocate(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Rectangle of the current render target that draws map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Create a new viewport.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Square viewport anchored at the origin.
    pub fn square(size: u32) -> Self {
        Self::new(0, 0, size, size)
    }

    /// Get the aspect ratio.
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Cube map face, in the conventional +X, -X, +Y, -Y, +Z, -Z layer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    /// All faces in layer order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Array layer of this face inside a cube texture.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Shape of a depth texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    /// Single `size x size` layer.
    Flat,
    /// Six `size x size` faces.
    Cube,
}

impl TextureKind {
    /// Number of array layers backing the texture.
    pub fn layers(self) -> u32 {
        match self {
            TextureKind::Flat => 1,
            TextureKind::Cube => 6,
        }
    }
}

/// Sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

/// Coordinate wrapping outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrap {
    ClampToEdge,
    /// Clamp to an opaque white border, i.e. depth 1.0.
    ClampToBorderWhite,
}

/// Sampler state attached to a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub wrap: Wrap,
    /// Depth comparison sampling (`LessEqual`).
    pub compare: bool,
}

/// Depth texture description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub kind: TextureKind,
    pub size: u32,
    pub sampler: SamplerDesc,
}

/// What part of a texture a framebuffer renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// The whole texture. For cube textures this is a layered attachment.
    Texture,
    /// A single face of a cube texture.
    CubeFace(CubeFace),
}

/// Result of a framebuffer completeness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    /// No depth attachment.
    MissingAttachment,
    /// Attachment has a zero, non-square or over-limit size.
    InvalidDimensions,
    /// A color buffer is still enabled on a depth-only framebuffer.
    ColorBufferEnabled,
    /// The attachment combination is not supported by the device.
    Unsupported,
}

impl FramebufferStatus {
    /// Whether the framebuffer can be rendered into.
    pub fn is_complete(self) -> bool {
        self == FramebufferStatus::Complete
    }
}

impl fmt::Display for FramebufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FramebufferStatus::Complete => "complete",
            FramebufferStatus::MissingAttachment => "missing depth attachment",
            FramebufferStatus::InvalidDimensions => "invalid attachment dimensions",
            FramebufferStatus::ColorBufferEnabled => "color buffer enabled",
            FramebufferStatus::Unsupported => "unsupported attachment combination",
        };
        f.write_str(text)
    }
}

/// Where a program's fragments go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramOutput {
    /// Depth only, into the bound framebuffer.
    Depth,
    /// Color, into the screen target.
    Screen,
}

/// Vertex input consumed by a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexInput {
    /// Meshes created with [`GraphicsDevice::create_mesh`].
    Positions,
    /// No vertex buffer; vertices are generated from the vertex index.
    None,
}

/// Program description: two source files plus the uniform interface.
#[derive(Debug, Clone)]
pub struct ProgramDesc {
    pub label: &'static str,
    pub vertex: PathBuf,
    pub fragment: PathBuf,
    pub uniforms: Vec<UniformDecl>,
    pub output: ProgramOutput,
    pub vertex_input: VertexInput,
    /// Texture unit sampled by the program, if any.
    pub sampled_unit: Option<u32>,
}

/// Errors reported by a graphics device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("out of device memory")]
    OutOfMemory,
    #[error("unknown {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u32 },
    #[error("texture size {size} exceeds device limit {limit}")]
    TextureTooLarge { size: u32, limit: u32 },
    #[error("failed to read shader source {path:?}")]
    ShaderSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// GPU object model consumed by the shadow subsystem.
///
/// Calls are immediate and single-threaded. Creation calls may change the
/// bound framebuffer; callers must not rely on bindings surviving them.
pub trait GraphicsDevice {
    /// Allocate a depth texture.
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, DeviceError>;

    /// Free a texture. Unknown handles are ignored.
    fn delete_texture(&mut self, texture: TextureId);

    /// Allocate an empty framebuffer.
    fn create_framebuffer(&mut self) -> Result<FramebufferId, DeviceError>;

    /// Free a framebuffer. Unknown handles are ignored.
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Attach a texture (or one cube face) as the depth attachment.
    fn attach_depth(&mut self, framebuffer: FramebufferId, texture: TextureId, attachment: Attachment);

    /// Disable color draw and read buffers.
    fn set_depth_only(&mut self, framebuffer: FramebufferId);

    /// Check framebuffer completeness.
    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus;

    /// Bind a framebuffer for drawing, or the screen with `None`.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    /// Current viewport.
    fn viewport(&self) -> Viewport;

    /// Set the viewport used by subsequent draws.
    fn set_viewport(&mut self, viewport: Viewport);

    /// Clear the depth of the bound target.
    fn clear_depth(&mut self, depth: f32);

    /// Set face culling for subsequent draws.
    fn set_cull(&mut self, cull: CullState);

    /// Compile a program from its vertex and fragment sources.
    fn load_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, DeviceError>;

    /// Free a program. Unknown handles are ignored.
    fn delete_program(&mut self, program: ProgramId);

    /// Make a program current for subsequent draws.
    fn use_program(&mut self, program: ProgramId);

    /// Look up a uniform by name, `name[i]` selecting an array element.
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// Set a uniform value.
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    /// Bind a texture to a texture unit.
    fn bind_texture(&mut self, unit: u32, texture: TextureId);

    /// Upload indexed triangle geometry.
    fn create_mesh(&mut self, positions: &[[f32; 3]], indices: &[u32]) -> Result<MeshId, DeviceError>;

    /// Draw `index_count` indices of a mesh with the current program.
    fn draw_indexed(&mut self, mesh: MeshId, index_count: u32);

    /// Draw generated vertices with the current program.
    fn draw_procedural(&mut self, vertex_count: u32);

    /// Set a uniform by name. Returns `false` when the program has no such
    /// uniform, which callers treat as "not used by this shader".
    fn set_uniform_by_name(&mut self, program: ProgramId, name: &str, value: UniformValue) -> bool {
        match self.uniform_location(program, name) {
            Some(location) => {
                self.set_uniform(location, value);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_allocator_never_reuses() {
        let mut ids = HandleAllocator::new();
        let a = ids.allocate();
        let b = ids.allocate();
        assert_eq!(a, 1);
        assert!(b > a);
    }

    #[test]
    fn test_cube_face_layer_order() {
        for (i, face) in CubeFace::ALL.iter().enumerate() {
            assert_eq!(face.index(), i);
        }
        assert_eq!(TextureKind::Cube.layers(), 6);
        assert_eq!(TextureKind::Flat.layers(), 1);
    }
}
