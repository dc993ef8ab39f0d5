//! Core rendering abstractions
//!
//! Mid-level wrappers over wgpu primitives used by [`crate::device::WgpuDevice`].

pub mod buffer;
pub mod pipeline;
pub mod render_states;
pub mod texture;
pub mod vertex;

pub use buffer::{DynamicUniformBuffer, IndexBuffer, VertexBuffer};
pub use pipeline::PipelineBuilder;
pub use render_states::{ClearState, CullState, DepthState};
pub use texture::DepthTexture;
pub use vertex::VertexP;
