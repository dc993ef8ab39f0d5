//! Shadow mapping
//!
//! [`ShadowSystem`] owns the shadow resources of every light and drives the
//! per-frame protocol:
//!
//! 1. [`ShadowSystem::reconcile`] gives every light a shadow resource,
//! 2. [`ShadowSystem::render`] renders the depth of all scene objects from
//!    each light,
//! 3. [`ShadowSystem::bind_and_publish`] binds the maps and publishes their
//!    uniforms to the lighting program before the main pass draws.
//!
//! Every failure degrades to fewer shadows, or none, and is logged.

mod debug;
mod matrix;
mod pass;
mod publish;
mod registry;
mod settings;
mod target;

pub use debug::debug_texture;
pub use matrix::{
    directional_light_matrix, light_view, point_face_views, point_light_matrices, point_projection,
    spot_fov, spot_light_matrix, CUBE_FACE_TABLE,
};
pub use pass::{
    debug_program_desc, depth_program_desc, point_depth_program_desc, ShadowPrograms,
    DEBUG_TEXTURE_UNIT,
};
pub use publish::ShadowBindings;
pub use registry::{
    CreateParams, CubeShadowMap, ReconcileReport, ShadowKind, ShadowMap, ShadowRegistry, SlotPool,
};
pub use settings::{
    ProjectionParams, QualityTier, ShaderPaths, ShaderSource, ShadowConfig, ShadowSettings,
};
pub use target::{create_depth_target, release_depth_target, DepthTarget};

use crate::device::{GraphicsDevice, ProgramId};
use crate::error::{Result, ShadowError};
use crate::light::Light;
use crate::scene::Renderable;

/// Shadow mapping subsystem.
#[derive(Debug)]
pub struct ShadowSystem {
    config: ShadowConfig,
    settings: ShadowSettings,
    registry: ShadowRegistry,
    programs: Option<ShadowPrograms>,
}

impl ShadowSystem {
    /// Create an uninitialized system. No GPU work happens until
    /// [`ShadowSystem::init`].
    pub fn new(config: ShadowConfig) -> Self {
        Self {
            settings: ShadowSettings::from_config(&config),
            registry: ShadowRegistry::new(config.pool_capacity),
            programs: None,
            config,
        }
    }

    /// Load the shadow programs.
    ///
    /// On failure the system stays uninitialized with shadows disabled; the
    /// rest of the renderer can carry on without them.
    pub fn init(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        if self.programs.is_some() {
            tracing::debug!("shadow system already initialized");
            return Ok(());
        }

        match ShadowPrograms::load(device, &self.config.shaders) {
            Ok(programs) => {
                self.programs = Some(programs);
                tracing::info!(
                    "shadow system initialized ({} slots per kind, {} quality)",
                    self.config.pool_capacity,
                    self.settings.quality
                );
                Ok(())
            }
            Err((program, source)) => {
                self.settings.enabled = false;
                tracing::warn!("shadows disabled, {} program failed to load: {}", program, source);
                Err(ShadowError::ShaderLoad { program, source })
            }
        }
    }

    /// Whether [`ShadowSystem::init`] succeeded.
    pub fn is_initialized(&self) -> bool {
        self.programs.is_some()
    }

    /// Release every resource and program. Safe to call repeatedly.
    pub fn shutdown(&mut self, device: &mut dyn GraphicsDevice) {
        let Some(programs) = self.programs.take() else {
            return;
        };
        let released = self.registry.total();
        self.registry.clear(device);
        programs.delete(device);
        tracing::info!("shadow system shut down, released {} shadow maps", released);
    }

    fn require_init(&self) -> Result<()> {
        if self.programs.is_some() {
            Ok(())
        } else {
            Err(ShadowError::NotInitialized)
        }
    }

    fn create_params(&self) -> CreateParams {
        let quality = self.settings.quality;
        CreateParams {
            map_size: self.config.map_size(quality),
            cube_map_size: self.config.cube_map_size(quality),
            point_far_plane: self.config.point_far_plane,
        }
    }

    /// Create a directional shadow map for a light at the current quality.
    pub fn create_directional(&mut self, device: &mut dyn GraphicsDevice, light_index: usize) -> Result<usize> {
        self.require_init()?;
        let size = self.create_params().map_size;
        self.registry.create_map(device, ShadowKind::Directional, light_index, size)
    }

    /// Create a spot shadow map for a light at the current quality.
    pub fn create_spot(&mut self, device: &mut dyn GraphicsDevice, light_index: usize) -> Result<usize> {
        self.require_init()?;
        let size = self.create_params().map_size;
        self.registry.create_map(device, ShadowKind::Spot, light_index, size)
    }

    /// Create a point shadow cube map for a light at the current quality.
    pub fn create_point(&mut self, device: &mut dyn GraphicsDevice, light_index: usize) -> Result<usize> {
        self.require_init()?;
        let params = self.create_params();
        self.registry
            .create_cube(device, light_index, params.cube_map_size, params.point_far_plane)
    }

    /// Destroy the resource in a slot. Returns `false` for an empty slot.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice, kind: ShadowKind, slot: usize) -> bool {
        self.registry.destroy(device, kind, slot)
    }

    /// Create missing shadow resources for `lights`, pruning stale ones
    /// first when configured to. Skipped while uninitialized or disabled.
    pub fn reconcile(&mut self, device: &mut dyn GraphicsDevice, lights: &[Light]) -> ReconcileReport {
        if !self.is_active() {
            return ReconcileReport::default();
        }
        let params = self.create_params();
        let report = self
            .registry
            .reconcile(device, lights, params, self.config.prune_stale);
        if report != ReconcileReport::default() {
            tracing::debug!(
                "shadow reconcile: {} created, {} pruned, {} skipped",
                report.created,
                report.pruned,
                report.skipped
            );
        }
        report
    }

    /// Refresh light matrices and render every shadow map. Returns the
    /// number of maps rendered; zero while uninitialized or disabled.
    pub fn render<R: Renderable>(&mut self, device: &mut dyn GraphicsDevice, lights: &[Light], objects: &[R]) -> usize {
        let Some(programs) = self.programs.filter(|_| self.settings.enabled) else {
            return 0;
        };
        self.registry.update_matrices(lights, &self.config);
        pass::render_shadow_maps(device, &programs, &self.registry, objects)
    }

    /// Reconcile, then render.
    pub fn frame<R: Renderable>(&mut self, device: &mut dyn GraphicsDevice, lights: &[Light], objects: &[R]) -> usize {
        self.reconcile(device, lights);
        self.render(device, lights, objects)
    }

    /// Bind shadow maps and publish shadow uniforms to the lighting
    /// program. Only `enableShadows = 0` is published while uninitialized
    /// or disabled.
    pub fn bind_and_publish(&self, device: &mut dyn GraphicsDevice, program: ProgramId) -> ShadowBindings {
        if !self.is_active() {
            publish::publish_disabled(device, program);
            return ShadowBindings::default();
        }
        publish::bind_and_publish(
            device,
            program,
            &self.registry,
            &self.settings,
            self.config.first_texture_unit,
        )
    }

    /// Draw the debug quad when the debug view is on. Returns whether
    /// anything was drawn.
    pub fn render_debug_view(&self, device: &mut dyn GraphicsDevice) -> bool {
        if !self.settings.show_debug || !self.is_active() {
            return false;
        }
        match self.programs.and_then(|programs| programs.debug) {
            Some(program) => debug::render_debug_view(device, program, &self.registry),
            None => false,
        }
    }

    fn is_active(&self) -> bool {
        self.settings.enabled && self.programs.is_some()
    }

    /// Set the quality used by resources created from now on.
    pub fn set_quality(&mut self, quality: QualityTier) {
        self.settings.quality = quality;
        tracing::info!("shadow quality set to {}", quality);
    }

    /// Set the quality by index (0 = low, 1 = medium, 2 = high).
    pub fn set_quality_index(&mut self, index: u8) -> Result<()> {
        let quality = QualityTier::try_from(index)?;
        self.set_quality(quality);
        Ok(())
    }

    /// Cycle low, medium, high.
    pub fn toggle_quality(&mut self) -> QualityTier {
        self.set_quality(self.settings.quality.next());
        self.settings.quality
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
        tracing::info!("shadows {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn toggle_enabled(&mut self) -> bool {
        self.set_enabled(!self.settings.enabled);
        self.settings.enabled
    }

    pub fn set_bias(&mut self, bias: f32) {
        self.settings.bias = bias;
    }

    pub fn toggle_debug_view(&mut self) -> bool {
        self.settings.show_debug = !self.settings.show_debug;
        self.settings.show_debug
    }

    pub fn settings(&self) -> &ShadowSettings {
        &self.settings
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    pub fn registry(&self) -> &ShadowRegistry {
        &self.registry
    }

    pub fn programs(&self) -> Option<&ShadowPrograms> {
        self.programs.as_ref()
    }
}

impl Default for ShadowSystem {
    fn default() -> Self {
        Self::new(ShadowConfig::default())
    }
}

impl Drop for ShadowSystem {
    fn drop(&mut self) {
        if self.programs.is_some() {
            tracing::warn!("shadow system dropped without shutdown, GPU handles leaked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::render_states::CullState;
    use crate::device::{
        HeadlessDevice, ProgramDesc, ProgramOutput, UniformDecl, UniformType, UniformValue,
        VertexInput, Viewport,
    };
    use crate::scene::{MeshObject, Transform};
    use glam::Vec3;

    fn setup() -> (HeadlessDevice, ShadowSystem) {
        let mut device = HeadlessDevice::new(1280, 720);
        let mut shadows = ShadowSystem::default();
        shadows.init(&mut device).unwrap();
        (device, shadows)
    }

    fn scene(device: &mut HeadlessDevice) -> Vec<MeshObject> {
        vec![
            MeshObject::plane(device, 20.0, Transform::IDENTITY).unwrap(),
            MeshObject::cube(device, Transform::from_position(Vec3::new(0.0, 1.0, 0.0))).unwrap(),
        ]
    }

    fn lighting_program(device: &mut HeadlessDevice) -> ProgramId {
        device
            .load_program(&ProgramDesc {
                label: "lighting",
                vertex: "lighting_vertex.wgsl".into(),
                fragment: "lighting_fragment.wgsl".into(),
                uniforms: vec![
                    UniformDecl::scalar("enableShadows", UniformType::Int),
                    UniformDecl::scalar("shadowBias", UniformType::Float),
                    UniformDecl::array("shadowMap", UniformType::Int, 8),
                ],
                output: ProgramOutput::Screen,
                vertex_input: VertexInput::Positions,
                sampled_unit: None,
            })
            .unwrap()
    }

    #[test]
    fn test_directional_light_end_to_end() {
        let (mut device, mut shadows) = setup();
        let objects = scene(&mut device);
        let lights = [Light::directional(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y)];
        let viewport = Viewport::new(0, 0, 1280, 720);

        let report = shadows.reconcile(&mut device, &lights);
        assert_eq!(report.created, 1);
        assert_eq!(shadows.registry().count(ShadowKind::Directional), 1);
        let map = shadows.registry().directional().get(0).unwrap();
        assert_eq!(map.light_index, 0);
        assert_eq!(map.size(), 1024);

        assert_eq!(shadows.render(&mut device, &lights, &objects), 1);
        assert_eq!(device.viewport(), viewport);
        assert_eq!(device.draws().len(), 2);
        assert!(device.draws().iter().all(|d| d.cull == CullState::Front));
        assert!(shadows.registry().directional().get(0).unwrap().light_matrix.is_finite());

        let program = lighting_program(&mut device);
        let bindings = shadows.bind_and_publish(&mut device, program);
        assert_eq!(bindings.units.len(), 1);
        assert_eq!(device.uniform(program, "shadowMap[0]"), Some(UniformValue::Int(10)));
        assert_eq!(device.uniform(program, "enableShadows"), Some(UniformValue::Int(1)));

        shadows.shutdown(&mut device);
    }

    #[test]
    fn test_quality_change_is_not_retroactive() {
        let (mut device, mut shadows) = setup();
        shadows.set_quality(QualityTier::Low);
        let directional = shadows.create_directional(&mut device, 0).unwrap();
        let point = shadows.create_point(&mut device, 1).unwrap();

        shadows.set_quality(QualityTier::High);
        assert_eq!(shadows.registry().directional().get(directional).unwrap().size(), 512);
        assert_eq!(shadows.registry().point().get(point).unwrap().size(), 256);

        let spot = shadows.create_spot(&mut device, 2).unwrap();
        let point_high = shadows.create_point(&mut device, 3).unwrap();
        assert_eq!(shadows.registry().spot().get(spot).unwrap().size(), 2048);
        assert_eq!(shadows.registry().point().get(point_high).unwrap().size(), 1024);

        // Each cube keeps rendering at its own size.
        let lights = [
            Light::directional(Vec3::Y * 10.0, Vec3::NEG_Y),
            Light::point(Vec3::new(1.0, 2.0, 0.0)),
            Light::spot(Vec3::Y * 5.0, Vec3::NEG_Y, 30.0),
            Light::point(Vec3::new(-1.0, 2.0, 0.0)),
        ];
        let objects = scene(&mut device);
        shadows.render(&mut device, &lights, &objects);
        let sizes: Vec<u32> = device.draws().iter().map(|d| d.viewport.width).collect();
        assert!(sizes.contains(&256) && sizes.contains(&1024) && sizes.contains(&2048));
        shadows.shutdown(&mut device);
    }

    #[test]
    fn test_disabled_publishes_nothing() {
        let (mut device, mut shadows) = setup();
        let objects = scene(&mut device);
        let lights = [Light::directional(Vec3::Y * 10.0, Vec3::NEG_Y)];
        shadows.frame(&mut device, &lights, &objects);
        device.reset_frame();

        shadows.set_enabled(false);
        assert_eq!(shadows.frame(&mut device, &lights, &objects), 0);
        assert!(device.draws().is_empty());

        let program = lighting_program(&mut device);
        let bindings = shadows.bind_and_publish(&mut device, program);
        assert!(bindings.units.is_empty());
        assert!(device.bound_units().is_empty());
        assert_eq!(device.uniform(program, "enableShadows"), Some(UniformValue::Int(0)));
        shadows.shutdown(&mut device);
    }

    #[test]
    fn test_create_works_while_disabled() {
        let (mut device, mut shadows) = setup();
        shadows.set_enabled(false);
        assert_eq!(shadows.create_directional(&mut device, 0).unwrap(), 0);
        assert_eq!(shadows.reconcile(&mut device, &[Light::point(Vec3::ZERO)]), ReconcileReport::default());
        shadows.shutdown(&mut device);
    }

    #[test]
    fn test_shader_load_failure_disables_shadows() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut shadows = ShadowSystem::default();
        device.mark_missing(shadows.config().shaders.depth.vertex.clone());

        let err = shadows.init(&mut device).unwrap_err();
        assert!(matches!(err, ShadowError::ShaderLoad { program: "shadow depth", .. }));
        assert!(!shadows.is_initialized());
        assert!(!shadows.settings().enabled);
        assert!(matches!(
            shadows.create_directional(&mut device, 0),
            Err(ShadowError::NotInitialized)
        ));

        let program = lighting_program(&mut device);
        shadows.bind_and_publish(&mut device, program);
        assert_eq!(device.uniform(program, "enableShadows"), Some(UniformValue::Int(0)));
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let (mut device, mut shadows) = setup();
        let lights = [
            Light::directional(Vec3::Y * 10.0, Vec3::NEG_Y),
            Light::point(Vec3::new(0.0, 3.0, 0.0)),
            Light::spot(Vec3::Y * 5.0, Vec3::NEG_Y, 30.0),
        ];
        shadows.reconcile(&mut device, &lights);
        assert_eq!(device.live_textures(), 3);

        shadows.shutdown(&mut device);
        assert!(!shadows.is_initialized());
        assert_eq!(shadows.registry().total(), 0);
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_framebuffers(), 0);
        assert_eq!(device.live_programs(), 0);

        shadows.shutdown(&mut device);
        assert!(shadows.init(&mut device).is_ok());
        shadows.shutdown(&mut device);
    }

    #[test]
    fn test_second_init_is_noop() {
        let (mut device, mut shadows) = setup();
        assert!(shadows.init(&mut device).is_ok());
        assert_eq!(device.live_programs(), 3);
        shadows.shutdown(&mut device);
    }

    #[test]
    fn test_controls() {
        let mut shadows = ShadowSystem::default();
        assert_eq!(shadows.settings().quality, QualityTier::Medium);
        assert_eq!(shadows.toggle_quality(), QualityTier::High);
        assert_eq!(shadows.toggle_quality(), QualityTier::Low);
        assert!(matches!(shadows.set_quality_index(3), Err(ShadowError::InvalidQuality(3))));
        assert!(shadows.set_quality_index(1).is_ok());
        assert_eq!(shadows.settings().quality, QualityTier::Medium);

        assert!(!shadows.toggle_enabled());
        assert!(shadows.toggle_enabled());
        assert!(shadows.toggle_debug_view());
        shadows.set_bias(0.01);
        assert_eq!(shadows.settings().bias, 0.01);
    }

    #[test]
    fn test_debug_view_draws_when_toggled() {
        let (mut device, mut shadows) = setup();
        shadows.reconcile(&mut device, &[Light::directional(Vec3::Y * 10.0, Vec3::NEG_Y)]);
        assert!(!shadows.render_debug_view(&mut device));

        shadows.toggle_debug_view();
        assert!(shadows.render_debug_view(&mut device));
        assert_eq!(device.draws().last().map(|d| d.count), Some(6));
        shadows.shutdown(&mut device);
    }

    #[test]
    fn test_frame_prunes_removed_lights() {
        let (mut device, mut shadows) = setup();
        let objects = scene(&mut device);
        let lights = vec![
            Light::directional(Vec3::Y * 10.0, Vec3::NEG_Y),
            Light::point(Vec3::new(0.0, 3.0, 0.0)),
        ];
        assert_eq!(shadows.frame(&mut device, &lights, &objects), 2);
        assert_eq!(shadows.frame(&mut device, &lights[..1], &objects), 1);
        assert_eq!(shadows.registry().count(ShadowKind::Point), 0);
        assert_eq!(device.live_textures(), 1);
        shadows.shutdown(&mut device);
    }
}
