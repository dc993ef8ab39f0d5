//! Shadow texture binding and lighting uniforms
//!
//! Binds every shadow map to consecutive texture units starting at a
//! reserved unit, directional maps first, then point cube maps, then spot
//! maps, and publishes the matching uniforms to the lighting program.

use super::registry::{ShadowMap, ShadowRegistry};
use super::settings::ShadowSettings;
use crate::device::{GraphicsDevice, ProgramId, TextureId, UniformValue};

/// What a publish bound, for callers that need to mirror the bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowBindings {
    /// `(unit, texture)` pairs in binding order.
    pub units: Vec<(u32, TextureId)>,
    /// Entries in `lightSpaceMatrix`/`shadowMap` (directional then spot).
    pub shadow_map_count: usize,
    /// Entries in the point light arrays.
    pub point_shadow_count: usize,
}

struct Publisher<'a> {
    device: &'a mut dyn GraphicsDevice,
    program: ProgramId,
    next_unit: u32,
    bindings: ShadowBindings,
    missing: usize,
}

impl Publisher<'_> {
    fn set(&mut self, name: &str, value: UniformValue) {
        if !self.device.set_uniform_by_name(self.program, name, value) {
            self.missing += 1;
        }
    }

    fn bind(&mut self, texture: TextureId) -> u32 {
        let unit = self.next_unit;
        self.device.bind_texture(unit, texture);
        self.bindings.units.push((unit, texture));
        self.next_unit += 1;
        unit
    }

    fn publish_map(&mut self, map: &ShadowMap) {
        let unit = self.bind(map.target.texture);
        let index = self.bindings.shadow_map_count;
        self.set(&format!("lightSpaceMatrix[{index}]"), UniformValue::Mat4(map.light_matrix));
        self.set(&format!("shadowMap[{index}]"), UniformValue::Int(unit as i32));
        self.bindings.shadow_map_count += 1;
    }
}

/// Publish the disabled state only. Binds nothing.
pub fn publish_disabled(device: &mut dyn GraphicsDevice, program: ProgramId) {
    device.use_program(program);
    device.set_uniform_by_name(program, "enableShadows", UniformValue::Int(0));
}

/// Bind shadow textures and publish lighting uniforms to `program`.
///
/// Uniforms the program does not declare are skipped. When shadows are
/// disabled only `enableShadows = 0` is published.
pub fn bind_and_publish(
    device: &mut dyn GraphicsDevice,
    program: ProgramId,
    registry: &ShadowRegistry,
    settings: &ShadowSettings,
    first_unit: u32,
) -> ShadowBindings {
    if !settings.enabled {
        publish_disabled(device, program);
        return ShadowBindings::default();
    }

    device.use_program(program);
    let mut publisher = Publisher {
        device,
        program,
        next_unit: first_unit,
        bindings: ShadowBindings::default(),
        missing: 0,
    };

    for (_, map) in registry.directional().iter() {
        publisher.publish_map(map);
    }

    for (index, (_, cube)) in registry.point().iter().enumerate() {
        let unit = publisher.bind(cube.target.texture);
        publisher.set(&format!("pointShadowMaps[{index}]"), UniformValue::Int(unit as i32));
        publisher.set(&format!("pointLightPositions[{index}]"), UniformValue::Vec3(cube.light_position));
        publisher.set(&format!("pointLightFarPlane[{index}]"), UniformValue::Float(cube.far_plane));
        publisher.bindings.point_shadow_count += 1;
    }

    for (_, map) in registry.spot().iter() {
        publisher.publish_map(map);
    }

    let shadow_maps = publisher.bindings.shadow_map_count as i32;
    let point_shadows = publisher.bindings.point_shadow_count as i32;
    publisher.set("shadowMapCount", UniformValue::Int(shadow_maps));
    publisher.set("pointShadowCount", UniformValue::Int(point_shadows));
    publisher.set("shadowBias", UniformValue::Float(settings.bias));
    publisher.set("enableShadows", UniformValue::Int(1));

    if publisher.missing > 0 {
        tracing::debug!("{} shadow uniforms not declared by lighting program", publisher.missing);
    }
    publisher.bindings
}
