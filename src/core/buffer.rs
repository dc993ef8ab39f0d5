//! GPU buffer abstractions
//!
//! Vertex and index buffers for shadow casters, plus a growable uniform
//! buffer addressed with dynamic offsets.

use crate::context::WgpuContext;
use bytemuck::{Pod, Zeroable};

/// A GPU buffer containing vertex data.
pub struct VertexBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) count: u32,
}

impl VertexBuffer {
    /// Create a new vertex buffer from a slice of vertices.
    pub fn new<V: Pod + Zeroable>(ctx: &WgpuContext, vertices: &[V], label: Option<&str>) -> Self {
        use wgpu::util::DeviceExt;
        let buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label,
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        Self {
            buffer,
            count: vertices.len() as u32,
        }
    }

    /// Get the number of vertices.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Create a buffer slice for the entire buffer.
    pub fn slice(&self) -> wgpu::BufferSlice<'_> {
        self.buffer.slice(..)
    }
}

/// A GPU buffer containing u32 index data.
pub struct IndexBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) count: u32,
}

impl IndexBuffer {
    /// Create a new index buffer from u32 indices.
    pub fn new_u32(ctx: &WgpuContext, indices: &[u32], label: Option<&str>) -> Self {
        use wgpu::util::DeviceExt;
        let buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label,
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        Self {
            buffer,
            count: indices.len() as u32,
        }
    }

    /// Get the number of indices.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Get the index format.
    pub fn format(&self) -> wgpu::IndexFormat {
        wgpu::IndexFormat::Uint32
    }

    /// Create a buffer slice for the entire buffer.
    pub fn slice(&self) -> wgpu::BufferSlice<'_> {
        self.buffer.slice(..)
    }
}

/// Uniform buffer holding one block per draw, bound with dynamic offsets.
///
/// Blocks are staged on the CPU while a frame is recorded and uploaded in a
/// single write before encoding.
pub struct DynamicUniformBuffer {
    buffer: wgpu::Buffer,
    capacity: u64,
    staging: UniformStaging,
    label: &'static str,
}

/// CPU side of a [`DynamicUniformBuffer`]: blocks packed at aligned offsets.
#[derive(Debug, Clone)]
pub struct UniformStaging {
    bytes: Vec<u8>,
    alignment: u64,
}

impl UniformStaging {
    pub fn new(alignment: u64) -> Self {
        Self {
            bytes: Vec::new(),
            alignment: alignment.max(1),
        }
    }

    /// Append a block and return its offset.
    pub fn push(&mut self, block: &[u8]) -> u32 {
        let offset = align_to(self.bytes.len() as u64, self.alignment);
        self.bytes.resize(offset as usize, 0);
        self.bytes.extend_from_slice(block);
        offset as u32
    }

    /// Buffer size needed to hold the staged blocks.
    pub fn required_size(&self) -> u64 {
        align_to(self.bytes.len() as u64, self.alignment)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

impl DynamicUniformBuffer {
    /// Create a buffer with room for `initial_capacity` bytes.
    pub fn new(ctx: &WgpuContext, initial_capacity: u64, label: &'static str) -> Self {
        let alignment = ctx.device.limits().min_uniform_buffer_offset_alignment as u64;
        let capacity = initial_capacity.max(alignment);
        Self {
            buffer: Self::allocate(ctx, capacity, label),
            capacity,
            staging: UniformStaging::new(alignment),
            label,
        }
    }

    fn allocate(ctx: &WgpuContext, size: u64, label: &'static str) -> wgpu::Buffer {
        ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Stage a block and return its dynamic offset.
    pub fn push(&mut self, block: &[u8]) -> u32 {
        self.staging.push(block)
    }

    /// Upload staged blocks. Returns `true` when the buffer was reallocated,
    /// which invalidates bind groups built on the old one.
    pub fn upload(&mut self, ctx: &WgpuContext) -> bool {
        let needed = self.staging.required_size();
        let mut grown = false;
        if needed > self.capacity {
            self.capacity = needed.next_power_of_two();
            self.buffer = Self::allocate(ctx, self.capacity, self.label);
            grown = true;
        }
        if !self.staging.is_empty() {
            ctx.queue.write_buffer(&self.buffer, 0, self.staging.bytes());
        }
        self.staging.clear();
        grown
    }

    /// Get the raw wgpu buffer.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

/// Round `value` up to a multiple of `alignment`.
pub(crate) fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(0, 256), 0);
        assert_eq!(align_to(1, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 256), 512);
    }

    #[test]
    fn test_staging_aligns_each_block() {
        let mut staging = UniformStaging::new(256);
        assert!(staging.is_empty());
        assert_eq!(staging.required_size(), 0);

        assert_eq!(staging.push(&[1; 128]), 0);
        assert_eq!(staging.push(&[2; 64]), 256);
        assert_eq!(staging.push(&[3; 300]), 512);
        assert_eq!(staging.bytes().len(), 812);
        assert_eq!(staging.required_size(), 1024);
        assert_eq!(staging.bytes()[255], 0);
        assert_eq!(staging.bytes()[256], 2);

        staging.clear();
        assert_eq!(staging.push(&[4; 16]), 0);
    }
}
