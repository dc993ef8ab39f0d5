//! Shadow depth passes
//!
//! Renders every active shadow resource: directional maps, then point cube
//! maps, then spot maps. The caller's viewport is restored afterwards.

use super::registry::{CubeShadowMap, ShadowMap, ShadowRegistry};
use super::settings::{ShaderPaths, ShaderSource};
use crate::core::render_states::CullState;
use crate::device::{
    Attachment, CubeFace, DeviceError, GraphicsDevice, ProgramDesc, ProgramId, ProgramOutput,
    UniformDecl, UniformType, UniformValue, VertexInput, Viewport,
};
use crate::scene::Renderable;

/// Texture unit the debug program samples.
pub const DEBUG_TEXTURE_UNIT: u32 = 0;

fn program_desc(label: &'static str, source: &ShaderSource, uniforms: Vec<UniformDecl>) -> ProgramDesc {
    ProgramDesc {
        label,
        vertex: source.vertex.clone(),
        fragment: source.fragment.clone(),
        uniforms,
        output: ProgramOutput::Depth,
        vertex_input: VertexInput::Positions,
        sampled_unit: None,
    }
}

/// Depth program for directional and spot maps.
pub fn depth_program_desc(paths: &ShaderPaths) -> ProgramDesc {
    program_desc(
        "shadow depth",
        &paths.depth,
        vec![
            UniformDecl::scalar("lightSpaceMatrix", UniformType::Mat4),
            UniformDecl::scalar("model", UniformType::Mat4),
        ],
    )
}

/// Depth program for point cube maps; writes distance to the light over
/// the far plane.
pub fn point_depth_program_desc(paths: &ShaderPaths) -> ProgramDesc {
    program_desc(
        "point shadow depth",
        &paths.point_depth,
        vec![
            UniformDecl::scalar("lightSpaceMatrix", UniformType::Mat4),
            UniformDecl::scalar("model", UniformType::Mat4),
            UniformDecl::scalar("lightPos", UniformType::Vec3),
            UniformDecl::scalar("far_plane", UniformType::Float),
        ],
    )
}

/// Screen program showing one shadow map.
pub fn debug_program_desc(paths: &ShaderPaths) -> ProgramDesc {
    ProgramDesc {
        output: ProgramOutput::Screen,
        vertex_input: VertexInput::None,
        sampled_unit: Some(DEBUG_TEXTURE_UNIT),
        ..program_desc(
            "shadow debug",
            &paths.debug,
            vec![UniformDecl::scalar("depthMap", UniformType::Int)],
        )
    }
}

/// Programs used by the shadow subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowPrograms {
    pub depth: ProgramId,
    pub point_depth: ProgramId,
    /// Missing when the debug shader failed to load.
    pub debug: Option<ProgramId>,
}

impl ShadowPrograms {
    /// Load the depth programs, and the debug program when available.
    ///
    /// Fails with the label of the first required program that did not
    /// load; nothing stays allocated in that case.
    pub fn load(
        device: &mut dyn GraphicsDevice,
        paths: &ShaderPaths,
    ) -> Result<Self, (&'static str, DeviceError)> {
        let depth_desc = depth_program_desc(paths);
        let depth = device
            .load_program(&depth_desc)
            .map_err(|err| (depth_desc.label, err))?;

        let point_desc = point_depth_program_desc(paths);
        let point_depth = match device.load_program(&point_desc) {
            Ok(program) => program,
            Err(err) => {
                device.delete_program(depth);
                return Err((point_desc.label, err));
            }
        };

        let debug = match device.load_program(&debug_program_desc(paths)) {
            Ok(program) => Some(program),
            Err(err) => {
                tracing::warn!("shadow debug view unavailable: {}", err);
                None
            }
        };

        Ok(Self {
            depth,
            point_depth,
            debug,
        })
    }

    /// Delete every program.
    pub fn delete(&self, device: &mut dyn GraphicsDevice) {
        device.delete_program(self.depth);
        device.delete_program(self.point_depth);
        if let Some(debug) = self.debug {
            device.delete_program(debug);
        }
    }
}

fn draw_objects<R: Renderable>(device: &mut dyn GraphicsDevice, program: ProgramId, objects: &[R]) {
    for object in objects {
        let model = object.transform().model_matrix();
        device.set_uniform_by_name(program, "model", UniformValue::Mat4(model));
        object.draw_geometry(device);
    }
}

fn render_map<R: Renderable>(device: &mut dyn GraphicsDevice, program: ProgramId, map: &ShadowMap, objects: &[R]) {
    device.set_viewport(Viewport::square(map.size()));
    device.bind_framebuffer(Some(map.target.framebuffer));
    device.clear_depth(1.0);
    device.set_uniform_by_name(program, "lightSpaceMatrix", UniformValue::Mat4(map.light_matrix));
    draw_objects(device, program, objects);
    device.bind_framebuffer(None);
}

fn render_cube<R: Renderable>(
    device: &mut dyn GraphicsDevice,
    program: ProgramId,
    cube: &CubeShadowMap,
    objects: &[R],
) {
    let target = &cube.target;
    device.set_viewport(Viewport::square(cube.size()));
    device.bind_framebuffer(Some(target.framebuffer));
    device.set_uniform_by_name(program, "lightPos", UniformValue::Vec3(cube.light_position));
    device.set_uniform_by_name(program, "far_plane", UniformValue::Float(cube.far_plane));

    for (face, matrix) in CubeFace::ALL.into_iter().zip(cube.face_matrices) {
        device.attach_depth(target.framebuffer, target.texture, Attachment::CubeFace(face));
        device.clear_depth(1.0);
        device.set_uniform_by_name(program, "lightSpaceMatrix", UniformValue::Mat4(matrix));
        draw_objects(device, program, objects);
    }
    device.bind_framebuffer(None);
}

/// Render every shadow resource in the registry. Returns the number of
/// maps rendered.
pub fn render_shadow_maps<R: Renderable>(
    device: &mut dyn GraphicsDevice,
    programs: &ShadowPrograms,
    registry: &ShadowRegistry,
    objects: &[R],
) -> usize {
    let saved_viewport = device.viewport();
    let mut rendered = 0;

    // Front faces are culled to keep thin casters from self-shadowing.
    device.use_program(programs.depth);
    device.set_cull(CullState::Front);
    for (_, map) in registry.directional().iter() {
        render_map(device, programs.depth, map, objects);
        rendered += 1;
    }

    device.use_program(programs.point_depth);
    device.set_cull(CullState::None);
    for (_, cube) in registry.point().iter() {
        render_cube(device, programs.point_depth, cube, objects);
        rendered += 1;
    }

    device.use_program(programs.depth);
    device.set_cull(CullState::Front);
    for (_, map) in registry.spot().iter() {
        render_map(device, programs.depth, map, objects);
        rendered += 1;
    }

    device.bind_framebuffer(None);
    device.set_cull(CullState::None);
    device.set_viewport(saved_viewport);
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HeadlessDevice, TextureId};
    use crate::light::Light;
    use crate::scene::{MeshObject, Transform};
    use crate::shadow::registry::CreateParams;
    use crate::shadow::settings::ShadowConfig;
    use glam::Vec3;

    struct Fixture {
        device: HeadlessDevice,
        programs: ShadowPrograms,
        registry: ShadowRegistry,
        objects: Vec<MeshObject>,
    }

    fn fixture(lights: &[Light]) -> Fixture {
        let mut device = HeadlessDevice::new(1280, 720);
        let config = ShadowConfig::default();
        let programs = ShadowPrograms::load(&mut device, &config.shaders).unwrap();
        let mut registry = ShadowRegistry::new(8);
        let params = CreateParams {
            map_size: 1024,
            cube_map_size: 512,
            point_far_plane: 25.0,
        };
        registry.reconcile(&mut device, lights, params, true);
        registry.update_matrices(lights, &config);

        let objects = vec![
            MeshObject::cube(&mut device, Transform::from_position(Vec3::new(0.0, 1.0, 0.0))).unwrap(),
            MeshObject::plane(&mut device, 20.0, Transform::IDENTITY).unwrap(),
        ];
        Fixture {
            device,
            programs,
            registry,
            objects,
        }
    }

    #[test]
    fn test_load_programs() {
        let mut device = HeadlessDevice::new(800, 600);
        let programs = ShadowPrograms::load(&mut device, &ShaderPaths::default()).unwrap();
        assert_eq!(device.live_programs(), 3);
        assert_eq!(device.program_label(programs.depth), Some("shadow depth"));
        assert_eq!(device.program_label(programs.point_depth), Some("point shadow depth"));
        assert_eq!(programs.debug.and_then(|p| device.program_label(p)), Some("shadow debug"));

        programs.delete(&mut device);
        assert_eq!(device.live_programs(), 0);
    }

    #[test]
    fn test_missing_point_shader_releases_depth_program() {
        let mut device = HeadlessDevice::new(800, 600);
        let paths = ShaderPaths::default();
        device.mark_missing(paths.point_depth.fragment.clone());

        let (label, _) = ShadowPrograms::load(&mut device, &paths).unwrap_err();
        assert_eq!(label, "point shadow depth");
        assert_eq!(device.live_programs(), 0);
    }

    #[test]
    fn test_missing_debug_shader_is_optional() {
        let mut device = HeadlessDevice::new(800, 600);
        let paths = ShaderPaths::default();
        device.mark_missing(paths.debug.vertex.clone());

        let programs = ShadowPrograms::load(&mut device, &paths).unwrap();
        assert_eq!(programs.debug, None);
    }

    #[test]
    fn test_directional_pass_state() {
        let lights = [Light::directional(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y)];
        let mut f = fixture(&lights);
        let map = f.registry.directional().get(0).unwrap().clone();

        let rendered = render_shadow_maps(&mut f.device, &f.programs, &f.registry, &f.objects);
        assert_eq!(rendered, 1);

        let draws = f.device.draws();
        assert_eq!(draws.len(), 2);
        for draw in draws {
            assert_eq!(draw.framebuffer, Some(map.target.framebuffer));
            assert_eq!(draw.viewport, Viewport::square(1024));
            assert_eq!(draw.cull, CullState::Front);
            assert_eq!(draw.program, Some(f.programs.depth));
        }
        assert_eq!(f.device.clears().len(), 1);
        assert_eq!(
            f.device.uniform(f.programs.depth, "lightSpaceMatrix"),
            Some(UniformValue::Mat4(map.light_matrix))
        );
        assert_eq!(f.device.viewport(), Viewport::new(0, 0, 1280, 720));
        assert_eq!(f.device.bound_framebuffer(), None);
        assert_eq!(f.device.cull(), CullState::None);
    }

    #[test]
    fn test_point_pass_renders_six_faces() {
        let lights = [Light::point(Vec3::new(1.0, 4.0, 0.0))];
        let mut f = fixture(&lights);
        let cube = f.registry.point().get(0).unwrap().clone();

        render_shadow_maps(&mut f.device, &f.programs, &f.registry, &f.objects);

        let clears = f.device.clears();
        assert_eq!(clears.len(), 6);
        for (clear, face) in clears.iter().zip(CubeFace::ALL) {
            assert_eq!(clear.attachment, Some((cube.target.texture, Attachment::CubeFace(face))));
        }

        let draws = f.device.draws();
        assert_eq!(draws.len(), 12);
        assert!(draws.iter().all(|d| d.cull == CullState::None && d.viewport == Viewport::square(512)));
        assert_eq!(
            f.device.uniform(f.programs.point_depth, "lightPos"),
            Some(UniformValue::Vec3(Vec3::new(1.0, 4.0, 0.0)))
        );
        assert_eq!(
            f.device.uniform(f.programs.point_depth, "far_plane"),
            Some(UniformValue::Float(25.0))
        );
    }

    #[test]
    fn test_pass_order_directional_point_spot() {
        let lights = [
            Light::spot(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, 30.0),
            Light::point(Vec3::new(0.0, 3.0, 0.0)),
            Light::directional(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y),
        ];
        let mut f = fixture(&lights);
        let directional = f.registry.directional().get(0).unwrap().target.texture;
        let point = f.registry.point().get(0).unwrap().target.texture;
        let spot = f.registry.spot().get(0).unwrap().target.texture;

        render_shadow_maps(&mut f.device, &f.programs, &f.registry, &f.objects);

        let order: Vec<TextureId> = f
            .device
            .clears()
            .iter()
            .filter_map(|clear| clear.attachment.map(|(texture, _)| texture))
            .collect();
        assert_eq!(order.first(), Some(&directional));
        assert!(order[1..7].iter().all(|&t| t == point));
        assert_eq!(order.last(), Some(&spot));
    }
}
