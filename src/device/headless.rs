//! In-memory graphics device
//!
//! Implements the full [`GraphicsDevice`] object model without a GPU. Every
//! clear, draw and binding is recorded so callers can inspect what a frame
//! did, and failures can be injected to exercise degraded paths.

use super::{
    Attachment, FramebufferId, FramebufferStatus, GraphicsDevice, HandleAllocator, MeshId,
    ProgramDesc, ProgramId, TextureDesc, TextureId, TextureKind, UniformLayout, UniformLocation,
    UniformValue, Viewport,
};
use super::DeviceError;
use crate::core::render_states::CullState;
use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// A recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    /// Framebuffer bound at draw time (`None` = screen).
    pub framebuffer: Option<FramebufferId>,
    /// Depth attachment of that framebuffer at draw time.
    pub attachment: Option<(TextureId, Attachment)>,
    pub program: Option<ProgramId>,
    pub viewport: Viewport,
    pub cull: CullState,
    /// Mesh for indexed draws, `None` for procedural draws.
    pub mesh: Option<MeshId>,
    pub count: u32,
}

/// A recorded depth clear.
#[derive(Debug, Clone, PartialEq)]
pub struct ClearRecord {
    pub framebuffer: Option<FramebufferId>,
    pub attachment: Option<(TextureId, Attachment)>,
    pub depth: f32,
}

#[derive(Debug)]
struct FramebufferRecord {
    depth: Option<(TextureId, Attachment)>,
    depth_only: bool,
}

#[derive(Debug)]
struct ProgramRecord {
    label: &'static str,
    layout: UniformLayout,
    values: BTreeMap<u32, UniformValue>,
}

/// Graphics device that keeps all state in memory.
#[derive(Debug)]
pub struct HeadlessDevice {
    ids: HandleAllocator,
    textures: HashMap<TextureId, TextureDesc>,
    framebuffers: HashMap<FramebufferId, FramebufferRecord>,
    programs: HashMap<ProgramId, ProgramRecord>,
    meshes: HashMap<MeshId, u32>,
    bound_framebuffer: Option<FramebufferId>,
    viewport: Viewport,
    cull: CullState,
    current_program: Option<ProgramId>,
    units: BTreeMap<u32, TextureId>,
    draws: Vec<DrawRecord>,
    clears: Vec<ClearRecord>,
    max_texture_size: u32,
    incomplete_framebuffers: Cell<u32>,
    failing_allocations: u32,
    missing_sources: Vec<PathBuf>,
}

impl HeadlessDevice {
    /// Create a device whose screen (and initial viewport) is `width x height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            ids: HandleAllocator::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            meshes: HashMap::new(),
            bound_framebuffer: None,
            viewport: Viewport::new(0, 0, width, height),
            cull: CullState::None,
            current_program: None,
            units: BTreeMap::new(),
            draws: Vec::new(),
            clears: Vec::new(),
            max_texture_size: 8192,
            incomplete_framebuffers: Cell::new(0),
            failing_allocations: 0,
            missing_sources: Vec::new(),
        }
    }

    /// Limit texture sizes, like `max_texture_dimension_2d` on a real adapter.
    pub fn with_max_texture_size(mut self, size: u32) -> Self {
        self.max_texture_size = size;
        self
    }

    /// Report the next `count` completeness checks as incomplete.
    pub fn fail_next_framebuffers(&mut self, count: u32) {
        self.incomplete_framebuffers.set(count);
    }

    /// Fail the next `count` texture or framebuffer allocations.
    pub fn fail_next_allocations(&mut self, count: u32) {
        self.failing_allocations = count;
    }

    /// Treat a shader source path as missing.
    pub fn mark_missing(&mut self, path: impl Into<PathBuf>) {
        self.missing_sources.push(path.into());
    }

    /// Description of a live texture.
    pub fn texture(&self, texture: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&texture)
    }

    /// Number of live textures.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Number of live framebuffers.
    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    /// Number of live programs.
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Whether a framebuffer handle is live.
    pub fn has_framebuffer(&self, framebuffer: FramebufferId) -> bool {
        self.framebuffers.contains_key(&framebuffer)
    }

    /// Current depth attachment of a framebuffer.
    pub fn depth_attachment(&self, framebuffer: FramebufferId) -> Option<(TextureId, Attachment)> {
        self.framebuffers.get(&framebuffer).and_then(|fb| fb.depth)
    }

    /// Currently bound framebuffer.
    pub fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound_framebuffer
    }

    /// Current cull state.
    pub fn cull(&self) -> CullState {
        self.cull
    }

    /// Current program.
    pub fn current_program(&self) -> Option<ProgramId> {
        self.current_program
    }

    /// Label of a live program.
    pub fn program_label(&self, program: ProgramId) -> Option<&'static str> {
        self.programs.get(&program).map(|p| p.label)
    }

    /// Texture units with a texture bound.
    pub fn bound_units(&self) -> &BTreeMap<u32, TextureId> {
        &self.units
    }

    /// Recorded draws.
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Recorded depth clears.
    pub fn clears(&self) -> &[ClearRecord] {
        &self.clears
    }

    /// Forget recorded draws, clears and unit bindings.
    pub fn reset_frame(&mut self) {
        self.draws.clear();
        self.clears.clear();
        self.units.clear();
    }

    /// Last value written to a uniform, by name.
    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        let record = self.programs.get(&program)?;
        let (offset, _) = record.layout.resolve(name)?;
        record.values.get(&offset).copied()
    }

    fn take_allocation_failure(&mut self) -> bool {
        if self.failing_allocations > 0 {
            self.failing_allocations -= 1;
            true
        } else {
            false
        }
    }

    fn record_target(&self) -> Option<(TextureId, Attachment)> {
        self.bound_framebuffer
            .and_then(|fb| self.framebuffers.get(&fb))
            .and_then(|fb| fb.depth)
    }

    fn record_draw(&mut self, mesh: Option<MeshId>, count: u32) {
        let record = DrawRecord {
            framebuffer: self.bound_framebuffer,
            attachment: self.record_target(),
            program: self.current_program,
            viewport: self.viewport,
            cull: self.cull,
            mesh,
            count,
        };
        self.draws.push(record);
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, DeviceError> {
        if self.take_allocation_failure() {
            return Err(DeviceError::OutOfMemory);
        }
        if desc.size > self.max_texture_size {
            return Err(DeviceError::TextureTooLarge {
                size: desc.size,
                limit: self.max_texture_size,
            });
        }
        let id = TextureId(self.ids.allocate());
        self.textures.insert(id, *desc);
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.units.retain(|_, bound| *bound != texture);
    }

    fn create_framebuffer(&mut self) -> Result<FramebufferId, DeviceError> {
        if self.take_allocation_failure() {
            return Err(DeviceError::OutOfMemory);
        }
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
        let pending = self.incomplete_framebuffers.get();
        if pending > 0 {
            self.incomplete_framebuffers.set(pending - 1);
            return FramebufferStatus::Unsupported;
        }

        let Some(fb) = self.framebuffers.get(&framebuffer) else {
            return FramebufferStatus::MissingAttachment;
        };
        let Some((texture, attachment)) = fb.depth else {
            return FramebufferStatus::MissingAttachment;
        };
        let Some(desc) = self.textures.get(&texture) else {
            return FramebufferStatus::MissingAttachment;
        };
        if !fb.depth_only {
            return FramebufferStatus::ColorBufferEnabled;
        }
        if desc.size == 0 || desc.size > self.max_texture_size {
            return FramebufferStatus::InvalidDimensions;
        }
        if matches!(attachment, Attachment::CubeFace(_)) && desc.kind != TextureKind::Cube {
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
        let record = ClearRecord {
            framebuffer: self.bound_framebuffer,
            attachment: self.record_target(),
            depth,
        };
        self.clears.push(record);
    }

    fn set_cull(&mut self, cull: CullState) {
        self.cull = cull;
    }

    fn load_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, DeviceError> {
        for path in [&desc.vertex, &desc.fragment] {
            if self.missing_sources.contains(path) {
                return Err(DeviceError::ShaderSource {
                    path: path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                });
            }
        }

        let id = ProgramId(self.ids.allocate());
        self.programs.insert(
            id,
            ProgramRecord {
                label: desc.label,
                layout: UniformLayout::new(&desc.uniforms),
                values: BTreeMap::new(),
            },
        );
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
        Some(UniformLocation {
            program,
            offset,
            ty,
        })
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        if value.ty() != location.ty {
            tracing::debug!("uniform type mismatch at offset {}", location.offset);
            return;
        }
        if let Some(record) = self.programs.get_mut(&location.program) {
            record.values.insert(location.offset, value);
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        self.units.insert(unit, texture);
    }

    fn create_mesh(&mut self, _positions: &[[f32; 3]], indices: &[u32]) -> Result<MeshId, DeviceError> {
        let id = MeshId(self.ids.allocate());
        self.meshes.insert(id, indices.len() as u32);
        Ok(id)
    }

    fn draw_indexed(&mut self, mesh: MeshId, index_count: u32) {
        match self.meshes.get(&mesh) {
            Some(&available) => self.record_draw(Some(mesh), index_count.min(available)),
            None => tracing::debug!("draw with unknown mesh {}", mesh.raw()),
        }
    }

    fn draw_procedural(&mut self, vertex_count: u32) {
        self.record_draw(None, vertex_count);
    }
}
