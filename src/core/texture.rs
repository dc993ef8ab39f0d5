//! Depth texture abstractions
//!
//! Shadow maps are depth textures that are rendered one layer at a time and
//! sampled as a whole: a 2D texture for directional and spot lights, a
//! six-layer cube for point lights.

use crate::context::WgpuContext;
use crate::device::{Filter, SamplerDesc, TextureDesc, TextureKind, Wrap};

/// A depth texture with per-layer render views and a sampling view.
pub struct DepthTexture {
    #[allow(dead_code)]
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) layer_views: Vec<wgpu::TextureView>,
    pub(crate) sampler: wgpu::Sampler,
    pub(crate) kind: TextureKind,
    pub(crate) size: u32,
}

impl DepthTexture {
    /// The depth format used by shadow maps.
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Create a depth texture from a device-level description.
    pub fn new(ctx: &WgpuContext, desc: &TextureDesc) -> Self {
        let layers = desc.kind.layers();
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.size,
                height: desc.size,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view_dimension = match desc.kind {
            TextureKind::Flat => wgpu::TextureViewDimension::D2,
            TextureKind::Cube => wgpu::TextureViewDimension::Cube,
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(view_dimension),
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });

        // One render view per layer (per cube face)
        let layer_views = (0..layers)
            .map(|layer| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    aspect: wgpu::TextureAspect::DepthOnly,
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let sampler = create_sampler(ctx, desc.label, &desc.sampler);

        Self {
            texture,
            view,
            layer_views,
            sampler,
            kind: desc.kind,
            size: desc.size,
        }
    }

    /// Get the sampling view (2D or cube).
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Get the render view of a single layer.
    pub fn layer_view(&self, layer: usize) -> Option<&wgpu::TextureView> {
        self.layer_views.get(layer)
    }

    /// Get the sampler.
    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// Get the texture kind.
    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    /// Get the edge length of each layer.
    pub fn size(&self) -> u32 {
        self.size
    }
}

/// Translate a sampler description, falling back to edge clamping when the
/// adapter lacks border clamping.
fn create_sampler(ctx: &WgpuContext, label: &str, desc: &SamplerDesc) -> wgpu::Sampler {
    let filter = match desc.filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    };

    let (address_mode, border_color) = match desc.wrap {
        Wrap::ClampToEdge => (wgpu::AddressMode::ClampToEdge, None),
        Wrap::ClampToBorderWhite if ctx.supports_border_clamp() => (
            wgpu::AddressMode::ClampToBorder,
            Some(wgpu::SamplerBorderColor::OpaqueWhite),
        ),
        Wrap::ClampToBorderWhite => {
            tracing::warn!("border clamp unsupported, {} falls back to edge clamp", label);
            (wgpu::AddressMode::ClampToEdge, None)
        }
    };

    let sampler_label = format!("{} sampler", label);
    ctx.device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(sampler_label.as_str()),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        compare: desc.compare.then_some(wgpu::CompareFunction::LessEqual),
        border_color,
        ..Default::default()
    })
}

/// Non-filtering sampler for reading raw depth values, e.g. for display.
pub fn create_depth_read_sampler(ctx: &WgpuContext) -> wgpu::Sampler {
    ctx.device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("depth read sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    })
}
