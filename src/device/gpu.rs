//! wgpu-backed graphics device
//!
//! wgpu has no immediate-mode state machine, so [`WgpuDevice`] records the
//! object-model calls into passes (one per render target run) and encodes
//! them on [`WgpuDevice::flush`]. Uniform values are snapshotted per draw
//! into a dynamic-offset uniform buffer, so changing a uniform between two
//! draws behaves like it does on an immediate-mode device.

use super::{
    Attachment, DeviceError, FramebufferId, FramebufferStatus, GraphicsDevice, HandleAllocator,
    MeshId, ProgramDesc, ProgramId, ProgramOutput, TextureDesc, TextureId, TextureKind,
    UniformLayout, UniformLocation, UniformValue, VertexInput, Viewport,
};
use crate::context::WgpuContext;
use crate::core::buffer::{DynamicUniformBuffer, IndexBuffer, VertexBuffer};
use crate::core::pipeline::PipelineBuilder;
use crate::core::render_states::{ClearState, CullState, DepthState};
use crate::core::texture::{create_depth_read_sampler, DepthTexture};
use crate::core::vertex::VertexP;
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU64;
use std::path::Path;

struct FramebufferRecord {
    depth: Option<(TextureId, Attachment)>,
    depth_only: bool,
}

struct GpuProgram {
    label: &'static str,
    layout: UniformLayout,
    block: Vec<u8>,
    /// One pipeline per [`CullState`], indexed by [`CullState::index`].
    pipelines: Vec<wgpu::RenderPipeline>,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: Option<wgpu::BindGroupLayout>,
    sampled_unit: Option<u32>,
    output: ProgramOutput,
}

struct GpuMesh {
    vertices: VertexBuffer,
    indices: IndexBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassTarget {
    Layer { texture: TextureId, layer: u32 },
    Screen,
}

#[derive(Debug, Clone, Copy)]
enum Geometry {
    Indexed { mesh: MeshId, count: u32 },
    Procedural(u32),
}

#[derive(Debug, Clone, Copy)]
struct RecordedDraw {
    program: ProgramId,
    cull: CullState,
    viewport: Viewport,
    uniform_offset: u32,
    geometry: Geometry,
    sampled: Option<TextureId>,
}

#[derive(Debug)]
struct RecordedPass {
    target: PassTarget,
    clear: Option<f32>,
    draws: Vec<RecordedDraw>,
}

/// [`GraphicsDevice`] implementation on top of wgpu.
pub struct WgpuDevice {
    ctx: WgpuContext,
    ids: HandleAllocator,
    screen_format: wgpu::TextureFormat,
    screen_view: Option<wgpu::TextureView>,
    screen_size: (u32, u32),
    textures: HashMap<TextureId, DepthTexture>,
    framebuffers: HashMap<FramebufferId, FramebufferRecord>,
    programs: HashMap<ProgramId, GpuProgram>,
    meshes: HashMap<MeshId, GpuMesh>,
    units: BTreeMap<u32, TextureId>,
    bound_framebuffer: Option<FramebufferId>,
    viewport: Viewport,
    cull: CullState,
    current_program: Option<ProgramId>,
    uniforms: DynamicUniformBuffer,
    depth_read_sampler: wgpu::Sampler,
    passes: Vec<RecordedPass>,
}

impl WgpuDevice {
    /// Create a device drawing screen-space programs into `screen_format`
    /// targets of `width x height`.
    pub fn new(ctx: WgpuContext, screen_format: wgpu::TextureFormat, width: u32, height: u32) -> Self {
        let uniforms = DynamicUniformBuffer::new(&ctx, 64 * 1024, "shadow uniforms");
        let depth_read_sampler = create_depth_read_sampler(&ctx);
        Self {
            ctx,
            ids: HandleAllocator::new(),
            screen_format,
            screen_view: None,
            screen_size: (width, height),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            meshes: HashMap::new(),
            units: BTreeMap::new(),
            bound_framebuffer: None,
            viewport: Viewport::new(0, 0, width, height),
            cull: CullState::None,
            current_program: None,
            uniforms,
            depth_read_sampler,
            passes: Vec::new(),
        }
    }

    /// Get the underlying context.
    pub fn context(&self) -> &WgpuContext {
        &self.ctx
    }

    /// Set the view that screen draws (`bind_framebuffer(None)`) go to.
    pub fn set_screen_target(&mut self, view: Option<wgpu::TextureView>) {
        self.screen_view = view;
    }

    /// Resize the screen. The viewport is reset to cover it.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.screen_size = (width, height);
        self.viewport = Viewport::new(0, 0, width, height);
    }

    /// Sampling view and sampler of the texture bound to `unit`, for
    /// lighting passes that sample shadow maps.
    pub fn unit_binding(&self, unit: u32) -> Option<(&wgpu::TextureView, &wgpu::Sampler)> {
        let texture = self.textures.get(self.units.get(&unit)?)?;
        Some((texture.view(), texture.sampler()))
    }

    /// Number of recorded passes waiting for [`WgpuDevice::flush`].
    pub fn pending_passes(&self) -> usize {
        self.passes.len()
    }

    fn current_target(&self) -> PassTarget {
        let depth = self
            .bound_framebuffer
            .and_then(|fb| self.framebuffers.get(&fb))
            .and_then(|fb| fb.depth);
        pass_target(depth)
    }

    fn record_draw(&mut self, geometry: Geometry) {
        let Some(program_id) = self.current_program else {
            tracing::debug!("draw without a current program dropped");
            return;
        };
        let Some(program) = self.programs.get(&program_id) else {
            return;
        };

        let target = self.current_target();
        let wants_screen = program.output == ProgramOutput::Screen;
        if wants_screen != (target == PassTarget::Screen) {
            tracing::debug!("program {} does not match the bound target", program.label);
            return;
        }

        let sampled = program
            .sampled_unit
            .and_then(|unit| self.units.get(&unit))
            .copied();
        if program.sampled_unit.is_some() && sampled.is_none() {
            tracing::debug!("program {} drawn with an empty texture unit", program.label);
            return;
        }

        let uniform_offset = self.uniforms.push(&program.block);
        let draw = RecordedDraw {
            program: program_id,
            cull: self.cull,
            viewport: self.viewport,
            uniform_offset,
            geometry,
            sampled,
        };
        pass_for(&mut self.passes, target).draws.push(draw);
    }

    fn build_program(&self, desc: &ProgramDesc, source: &str, layout: &UniformLayout) -> anyhow::Result<GpuProgram> {
        self.ctx
            .validated(desc.label, || self.create_program(desc, source, layout))
    }

    fn create_program(&self, desc: &ProgramDesc, source: &str, layout: &UniformLayout) -> anyhow::Result<GpuProgram> {
        let uniform_layout = self
            .ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(desc.label),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(layout.size() as u64),
                    },
                    count: None,
                }],
            });

        let texture_layout = desc.sampled_unit.map(|_| {
            self.ctx
                .device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(desc.label),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Depth,
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                            count: None,
                        },
                    ],
                })
        });

        let mut pipelines = Vec::with_capacity(CullState::ALL.len());
        for cull in CullState::ALL {
            let mut builder = PipelineBuilder::new(&self.ctx)
                .label(desc.label)
                .shader(source)
                .bind_group_layout(&uniform_layout)
                .cull(cull);
            if let Some(texture_layout) = &texture_layout {
                builder = builder.bind_group_layout(texture_layout);
            }
            if desc.vertex_input == VertexInput::Positions {
                builder = builder.vertex_layout(VertexP::layout());
            }
            let pipeline = match desc.output {
                ProgramOutput::Depth => builder.depth(DepthState::read_write()).build_depth_only()?,
                ProgramOutput::Screen => builder.build(self.screen_format)?,
            };
            pipelines.push(pipeline);
        }

        Ok(GpuProgram {
            label: desc.label,
            layout: layout.clone(),
            block: vec![0; layout.size() as usize],
            pipelines,
            uniform_layout,
            texture_layout,
            sampled_unit: desc.sampled_unit,
            output: desc.output,
        })
    }

    /// Encode and submit everything recorded since the last flush.
    pub fn flush(&mut self) {
        let passes = std::mem::take(&mut self.passes);
        if passes.is_empty() {
            return;
        }
        self.uniforms.upload(&self.ctx);

        // Bind groups are rebuilt per flush; the uniform buffer may have grown.
        let mut uniform_groups: HashMap<ProgramId, wgpu::BindGroup> = HashMap::new();
        let mut texture_groups: HashMap<(ProgramId, TextureId), wgpu::BindGroup> = HashMap::new();
        for draw in passes.iter().flat_map(|pass| &pass.draws) {
            let Some(program) = self.programs.get(&draw.program) else {
                continue;
            };
            uniform_groups.entry(draw.program).or_insert_with(|| {
                self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(program.label),
                    layout: &program.uniform_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: self.uniforms.buffer(),
                            offset: 0,
                            size: NonZeroU64::new(program.layout.size() as u64),
                        }),
                    }],
                })
            });

            let (Some(texture_id), Some(layout)) = (draw.sampled, &program.texture_layout) else {
                continue;
            };
            let Some(texture) = self.textures.get(&texture_id) else {
                continue;
            };
            if texture.kind() != TextureKind::Flat {
                continue;
            }
            texture_groups
                .entry((draw.program, texture_id))
                .or_insert_with(|| {
                    self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(program.label),
                        layout,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: wgpu::BindingResource::TextureView(texture.view()),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: wgpu::BindingResource::Sampler(&self.depth_read_sampler),
                            },
                        ],
                    })
                });
        }

        let mut encoder = self.ctx.create_encoder(Some("shadow encoder"));
        for pass in &passes {
            let (size, depth_view, color_view) = match pass.target {
                PassTarget::Layer { texture, layer } => {
                    let Some(view) = self
                        .textures
                        .get(&texture)
                        .and_then(|t| t.layer_view(layer as usize).map(|v| (t.size(), v)))
                    else {
                        tracing::debug!("pass target {} was deleted before flush", texture.raw());
                        continue;
                    };
                    ((view.0, view.0), Some(view.1), None)
                }
                PassTarget::Screen => {
                    let Some(view) = &self.screen_view else {
                        tracing::warn!("screen draws recorded without a screen target");
                        continue;
                    };
                    (self.screen_size, None, Some(view))
                }
            };

            let color_attachments: Vec<_> = color_view
                .map(|view| wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
                .into_iter()
                .map(Some)
                .collect();
            let depth_stencil_attachment =
                depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: pass.clear.map_or(ClearState::load(), ClearState::depth).depth_load_op(),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for draw in &pass.draws {
                let Some(program) = self.programs.get(&draw.program) else {
                    continue;
                };
                let Some(uniform_group) = uniform_groups.get(&draw.program) else {
                    continue;
                };
                let Some(viewport) = clip_viewport(draw.viewport, size) else {
                    continue;
                };

                render_pass.set_pipeline(&program.pipelines[draw.cull.index()]);
                render_pass.set_bind_group(0, uniform_group, &[draw.uniform_offset]);
                if let Some(texture) = draw.sampled {
                    let Some(group) = texture_groups.get(&(draw.program, texture)) else {
                        continue;
                    };
                    render_pass.set_bind_group(1, group, &[]);
                }
                render_pass.set_viewport(
                    viewport.x as f32,
                    viewport.y as f32,
                    viewport.width as f32,
                    viewport.height as f32,
                    0.0,
                    1.0,
                );

                match draw.geometry {
                    Geometry::Indexed { mesh, count } => {
                        let Some(mesh) = self.meshes.get(&mesh) else {
                            continue;
                        };
                        render_pass.set_vertex_buffer(0, mesh.vertices.slice());
                        render_pass.set_index_buffer(mesh.indices.slice(), mesh.indices.format());
                        render_pass.draw_indexed(0..count.min(mesh.indices.count()), 0, 0..1);
                    }
                    Geometry::Procedural(count) => render_pass.draw(0..count, 0..1),
                }
            }
        }

        self.ctx.submit(std::iter::once(encoder.finish()));
    }
}

/// Render target of draws issued while `depth` is the bound attachment.
fn pass_target(depth: Option<(TextureId, Attachment)>) -> PassTarget {
    match depth {
        Some((texture, Attachment::Texture)) => PassTarget::Layer { texture, layer: 0 },
        Some((texture, Attachment::CubeFace(face))) => PassTarget::Layer {
            texture,
            layer: face.index() as u32,
        },
        None => PassTarget::Screen,
    }
}

/// The open pass for `target`, starting a new one when the target changed.
fn pass_for(passes: &mut Vec<RecordedPass>, target: PassTarget) -> &mut RecordedPass {
    let reuse = matches!(passes.last(), Some(pass) if pass.target == target);
    if !reuse {
        passes.push(RecordedPass {
            target,
            clear: None,
            draws: Vec::new(),
        });
    }
    let last = passes.len() - 1;
    &mut passes[last]
}

/// Record a depth clear. A clear after draws starts a new pass so the draws
/// keep their output.
fn record_clear(passes: &mut Vec<RecordedPass>, target: PassTarget, depth: f32) {
    let fresh = matches!(passes.last(), Some(pass) if pass.target == target && pass.draws.is_empty());
    if !fresh {
        passes.push(RecordedPass {
            target,
            clear: None,
            draws: Vec::new(),
        });
    }
    pass_for(passes, target).clear = Some(depth);
}

/// Clip a viewport to a target of `size`. `None` when nothing remains.
fn clip_viewport(viewport: Viewport, size: (u32, u32)) -> Option<Viewport> {
    let width = viewport.width.min(size.0.saturating_sub(viewport.x));
    let height = viewport.height.min(size.1.saturating_sub(viewport.y));
    (width > 0 && height > 0).then(|| Viewport::new(viewport.x, viewport.y, width, height))
}

fn read_source(path: &Path) -> Result<String, DeviceError> {
    std::fs::read_to_string(path).map_err(|source| DeviceError::ShaderSource {
        path: path.to_path_buf(),
        source,
    })
}

impl GraphicsDevice for WgpuDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, DeviceError> {
        let limit = self.ctx.max_texture_size();
        if desc.size == 0 || desc.size > limit {
            return Err(DeviceError::TextureTooLarge { size: desc.size, limit });
        }
        let id = TextureId(self.ids.allocate());
        self.textures.insert(id, DepthTexture::new(&self.ctx, desc));
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.units.retain(|_, bound| *bound != texture);
    }

    fn create_framebuffer(&mut self) -> Result<FramebufferId, DeviceError> {
        let id = FramebufferId(self.ids.allocate());
        self.framebuffers.insert(
            id,
            FramebufferRecord {
                depth: None,
                depth_only: false,
            },
        );
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn attach_depth(&mut self, framebuffer: FramebufferId, texture: TextureId, attachment: Attachment) {
        if let Some(fb) = self.framebuffers.get_mut(&framebuffer) {
            fb.depth = Some((texture, attachment));
        }
    }

    fn set_depth_only(&mut self, framebuffer: FramebufferId) {
        if let Some(fb) = self.framebuffers.get_mut(&framebuffer) {
            fb.depth_only = true;
        }
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        let Some((texture, attachment)) = self.framebuffers.get(&framebuffer).and_then(|fb| fb.depth) else {
            return FramebufferStatus::MissingAttachment;
        };
        let Some(texture) = self.textures.get(&texture) else {
            return FramebufferStatus::MissingAttachment;
        };
        if !self.framebuffers.get(&framebuffer).is_some_and(|fb| fb.depth_only) {
            return FramebufferStatus::ColorBufferEnabled;
        }
        if texture.size() == 0 || texture.size() > self.ctx.max_texture_size() {
            return FramebufferStatus::InvalidDimensions;
        }
        if matches!(attachment, Attachment::CubeFace(_)) && texture.kind() != TextureKind::Cube {
            return FramebufferStatus::Unsupported;
        }
        FramebufferStatus::Complete
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.bound_framebuffer = framebuffer;
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn clear_depth(&mut self, depth: f32) {
        let target = self.current_target();
        if target == PassTarget::Screen {
            tracing::debug!("screen target has no depth buffer to clear");
            return;
        }
        record_clear(&mut self.passes, target, depth);
    }

    fn set_cull(&mut self, cull: CullState) {
        self.cull = cull;
    }

    fn load_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, DeviceError> {
        let vertex = read_source(&desc.vertex)?;
        let fragment = read_source(&desc.fragment)?;
        let source = format!("{vertex}\n{fragment}");

        let layout = UniformLayout::new(&desc.uniforms);
        let program = self.build_program(desc, &source, &layout)?;
        let id = ProgramId(self.ids.allocate());
        tracing::debug!("loaded program {} ({} uniform bytes)", desc.label, layout.size());
        self.programs.insert(id, program);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        if self.programs.contains_key(&program) {
            self.current_program = Some(program);
        }
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let (offset, ty) = self.programs.get(&program)?.layout.resolve(name)?;
        Some(UniformLocation { program, offset, ty })
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        if value.ty() != location.ty {
            tracing::debug!("uniform type mismatch at offset {}", location.offset);
            return;
        }
        let Some(program) = self.programs.get_mut(&location.program) else {
            return;
        };
        let start = location.offset as usize;
        let end = start + location.ty.slot_size() as usize;
        if let Some(slot) = program.block.get_mut(start..end) {
            value.write_to(slot);
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        self.units.insert(unit, texture);
    }

    fn create_mesh(&mut self, positions: &[[f32; 3]], indices: &[u32]) -> Result<MeshId, DeviceError> {
        let vertices: Vec<VertexP> = positions.iter().copied().map(VertexP::new).collect();
        let mesh = GpuMesh {
            vertices: VertexBuffer::new(&self.ctx, &vertices, Some("shadow caster vertices")),
            indices: IndexBuffer::new_u32(&self.ctx, indices, Some("shadow caster indices")),
        };
        let id = MeshId(self.ids.allocate());
        self.meshes.insert(id, mesh);
        Ok(id)
    }

    fn draw_indexed(&mut self, mesh: MeshId, index_count: u32) {
        if !self.meshes.contains_key(&mesh) {
            tracing::debug!("draw with unknown mesh {}", mesh.raw());
            return;
        }
        self.record_draw(Geometry::Indexed {
            mesh,
            count: index_count,
        });
    }

    fn draw_procedural(&mut self, vertex_count: u32) {
        self.record_draw(Geometry::Procedural(vertex_count));
    }
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("textures", &self.textures.len())
            .field("framebuffers", &self.framebuffers.len())
            .field("programs", &self.programs.len())
            .field("pending_passes", &self.passes.len())
            .finish()
    }
}
