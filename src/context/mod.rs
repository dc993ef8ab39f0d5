//! WgpuContext - Device and Queue wrapper
//!
//! Owns the wgpu device and queue and remembers which optional features the
//! adapter granted.

use std::sync::Arc;

/// Core wgpu context containing device and queue.
#[derive(Clone)]
pub struct WgpuContext {
    /// The wgpu device for creating GPU resources.
    pub device: Arc<wgpu::Device>,
    /// The wgpu queue for submitting commands.
    pub queue: Arc<wgpu::Queue>,
}

impl WgpuContext {
    /// Create a new context from existing device and queue.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
        }
    }

    /// Create a new context asynchronously.
    ///
    /// Border clamping is requested when the adapter offers it so shadow
    /// lookups outside a map read as fully lit.
    pub async fn new_async(compatible_surface: Option<&wgpu::Surface<'_>>) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await?;

        let required_features =
            adapter.features() & wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER;
        if required_features.is_empty() {
            tracing::info!("adapter lacks border clamping, shadow edges clamp to edge");
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("rein-shadow device"),
                required_features,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: Default::default(),
                experimental_features: Default::default(),
            })
            .await?;

        Ok(Self::new(device, queue))
    }

    /// Create a new context synchronously (blocks).
    pub fn new_blocking(compatible_surface: Option<&wgpu::Surface<'_>>) -> anyhow::Result<Self> {
        pollster::block_on(Self::new_async(compatible_surface))
    }

    /// Whether samplers may clamp to a border color.
    pub fn supports_border_clamp(&self) -> bool {
        self.device
            .features()
            .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER)
    }

    /// Run `create` inside a validation error scope.
    ///
    /// Shader and pipeline errors are reported through the scope instead of
    /// the uncaptured-error handler, which panics by default.
    pub fn validated<T>(&self, what: &str, create: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = create();
        match pollster::block_on(scope.pop()) {
            Some(error) => Err(anyhow::anyhow!("{what} failed validation: {error}")),
            None => result,
        }
    }

    /// Largest supported edge length of a 2D texture or cube face.
    pub fn max_texture_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Submit command buffers to the queue.
    pub fn submit<I: IntoIterator<Item = wgpu::CommandBuffer>>(&self, command_buffers: I) {
        self.queue.submit(command_buffers);
    }

    /// Create a command encoder.
    pub fn create_encoder(&self, label: Option<&str>) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label })
    }
}

impl std::fmt::Debug for WgpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuContext")
            .field("border_clamp", &self.supports_border_clamp())
            .finish()
    }
}
