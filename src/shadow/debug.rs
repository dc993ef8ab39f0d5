//! Shadow map debug view
//!
//! Draws the first directional shadow map (or, failing that, the first spot
//! map) as a grayscale quad in the corner of the screen viewport.

use super::pass::DEBUG_TEXTURE_UNIT;
use super::registry::ShadowRegistry;
use crate::core::render_states::CullState;
use crate::device::{GraphicsDevice, ProgramId, TextureId, UniformValue, Viewport};

/// The quad is a third of the shorter screen edge.
const QUAD_DIVISOR: u32 = 3;

/// Map shown by the debug view.
pub fn debug_texture(registry: &ShadowRegistry) -> Option<TextureId> {
    registry
        .directional()
        .iter()
        .chain(registry.spot().iter())
        .map(|(_, map)| map.target.texture)
        .next()
}

/// Draw the debug quad. Returns `false` when there is nothing to show.
pub fn render_debug_view(device: &mut dyn GraphicsDevice, program: ProgramId, registry: &ShadowRegistry) -> bool {
    let Some(texture) = debug_texture(registry) else {
        return false;
    };

    let screen = device.viewport();
    let size = screen.width.min(screen.height) / QUAD_DIVISOR;
    if size == 0 {
        return false;
    }

    device.bind_framebuffer(None);
    device.set_viewport(Viewport::new(screen.x, screen.y, size, size));
    device.set_cull(CullState::None);
    device.use_program(program);
    device.bind_texture(DEBUG_TEXTURE_UNIT, texture);
    device.set_uniform_by_name(program, "depthMap", UniformValue::Int(DEBUG_TEXTURE_UNIT as i32));
    device.draw_procedural(6);
    device.set_viewport(screen);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;
    use crate::light::Light;
    use crate::shadow::pass::ShadowPrograms;
    use crate::shadow::registry::CreateParams;
    use crate::shadow::settings::ShaderPaths;
    use glam::Vec3;

    const PARAMS: CreateParams = CreateParams {
        map_size: 512,
        cube_map_size: 256,
        point_far_plane: 25.0,
    };

    #[test]
    fn test_prefers_directional_then_spot() {
        let mut device = HeadlessDevice::new(900, 600);
        let mut registry = ShadowRegistry::new(4);
        assert_eq!(debug_texture(&registry), None);

        let lights = [
            Light::point(Vec3::ZERO),
            Light::spot(Vec3::new(0.0, 4.0, 0.0), Vec3::NEG_Y, 25.0),
        ];
        registry.reconcile(&mut device, &lights, PARAMS, true);
        let spot = registry.spot().get(0).unwrap().target.texture;
        assert_eq!(debug_texture(&registry), Some(spot));

        let lights = [lights[0], lights[1], Light::directional(Vec3::Y, Vec3::NEG_Y)];
        registry.reconcile(&mut device, &lights, PARAMS, true);
        let directional = registry.directional().get(0).unwrap().target.texture;
        assert_eq!(debug_texture(&registry), Some(directional));
    }

    #[test]
    fn test_debug_quad_draw() {
        let mut device = HeadlessDevice::new(900, 600);
        let programs = ShadowPrograms::load(&mut device, &ShaderPaths::default()).unwrap();
        let debug = programs.debug.unwrap();
        let mut registry = ShadowRegistry::new(4);
        registry.reconcile(&mut device, &[Light::directional(Vec3::Y, Vec3::NEG_Y)], PARAMS, true);

        assert!(render_debug_view(&mut device, debug, &registry));

        let draw = device.draws().last().unwrap().clone();
        assert_eq!(draw.program, Some(debug));
        assert_eq!(draw.framebuffer, None);
        assert_eq!(draw.mesh, None);
        assert_eq!(draw.count, 6);
        assert_eq!(draw.viewport, Viewport::square(200));
        assert_eq!(device.viewport(), Viewport::new(0, 0, 900, 600));
        assert_eq!(
            device.bound_units().get(&DEBUG_TEXTURE_UNIT),
            registry.directional().get(0).map(|m| &m.target.texture)
        );
    }
}
