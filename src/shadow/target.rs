//! Depth render targets for shadow maps

use crate::device::{
    Attachment, CubeFace, Filter, FramebufferId, GraphicsDevice, SamplerDesc, TextureDesc,
    TextureId, TextureKind, Wrap,
};
use crate::error::{Result, ShadowError};

/// A depth texture attached to a depth-only framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthTarget {
    pub framebuffer: FramebufferId,
    pub texture: TextureId,
    pub kind: TextureKind,
    /// Edge length of the map (of each face for cube targets).
    pub size: u32,
}

fn texture_desc(kind: TextureKind, size: u32) -> TextureDesc {
    match kind {
        // Outside the light frustum reads as depth 1.0, i.e. lit.
        TextureKind::Flat => TextureDesc {
            label: "shadow map",
            kind,
            size,
            sampler: SamplerDesc {
                filter: Filter::Linear,
                wrap: Wrap::ClampToBorderWhite,
                compare: true,
            },
        },
        TextureKind::Cube => TextureDesc {
            label: "point shadow map",
            kind,
            size,
            sampler: SamplerDesc {
                filter: Filter::Linear,
                wrap: Wrap::ClampToEdge,
                compare: false,
            },
        },
    }
}

/// Allocate a depth-only target of `size x size` (per face for cubes).
///
/// Leaves the screen bound. On failure every handle created so far is
/// released.
pub fn create_depth_target(device: &mut dyn GraphicsDevice, kind: TextureKind, size: u32) -> Result<DepthTarget> {
    let framebuffer = device
        .create_framebuffer()
        .map_err(|source| ShadowError::AllocationFailed {
            what: "framebuffer",
            source,
        })?;

    let texture = match device.create_texture(&texture_desc(kind, size)) {
        Ok(texture) => texture,
        Err(source) => {
            device.delete_framebuffer(framebuffer);
            return Err(ShadowError::AllocationFailed {
                what: "depth texture",
                source,
            });
        }
    };

    // Cube targets start on the first face; the render pass re-attaches
    // each face in turn.
    let attachment = match kind {
        TextureKind::Flat => Attachment::Texture,
        TextureKind::Cube => Attachment::CubeFace(CubeFace::PositiveX),
    };
    device.bind_framebuffer(Some(framebuffer));
    device.attach_depth(framebuffer, texture, attachment);
    device.set_depth_only(framebuffer);

    let status = device.framebuffer_status(framebuffer);
    device.bind_framebuffer(None);
    if !status.is_complete() {
        device.delete_texture(texture);
        device.delete_framebuffer(framebuffer);
        return Err(ShadowError::FramebufferIncomplete { status });
    }

    Ok(DepthTarget {
        framebuffer,
        texture,
        kind,
        size,
    })
}

/// Free a target's texture and framebuffer.
pub fn release_depth_target(device: &mut dyn GraphicsDevice, target: &DepthTarget) {
    device.delete_texture(target.texture);
    device.delete_framebuffer(target.framebuffer);
}
