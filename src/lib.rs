//! rein shadow mapping
//!
//! Shadow maps for directional, spot and point lights, built on wgpu.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **context** - Core wgpu wrapper (Device, Queue)
//! 2. **core** - GPU primitives (buffers, depth textures, pipelines)
//! 3. **device** - Graphics device object model with wgpu and headless backends
//! 4. **light** / **scene** - What the shadow passes read: lights and renderable objects
//! 5. **shadow** - Shadow resources, light matrices, depth passes and lighting uniforms
//!
//! A frame runs [`ShadowSystem::frame`] before the main pass, then
//! [`ShadowSystem::bind_and_publish`] with the lighting program.

pub mod context;
pub mod core;
pub mod device;
pub mod error;
pub mod light;
pub mod scene;
pub mod shadow;

// Re-export commonly used types
pub use context::WgpuContext;

pub use core::{ClearState, CullState, DepthState, DepthTexture, PipelineBuilder, VertexP};

pub use device::{
    DeviceError, GraphicsDevice, HeadlessDevice, ProgramId, TextureId, Viewport, WgpuDevice,
};

pub use error::ShadowError;

pub use light::{Light, LightKind};

pub use scene::{MeshObject, Renderable, Transform};

pub use shadow::{
    QualityTier, ReconcileReport, ShaderPaths, ShadowBindings, ShadowConfig, ShadowKind,
    ShadowSettings, ShadowSystem,
};
