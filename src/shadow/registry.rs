//! Shadow resource registry
//!
//! Fixed-capacity slot pools, one per light kind. A slot is either empty or
//! owns exactly one shadow resource and its GPU handles.

use super::matrix::{directional_light_matrix, point_light_matrices, spot_light_matrix};
use super::settings::ShadowConfig;
use super::target::{create_depth_target, release_depth_target, DepthTarget};
use crate::device::{GraphicsDevice, TextureKind};
use crate::error::{Result, ShadowError};
use crate::light::{Light, LightKind};
use glam::{Mat4, Vec3};
use std::fmt;

/// Kind of shadow resource, one pool each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowKind {
    Directional,
    Spot,
    Point,
}

impl ShadowKind {
    pub const ALL: [ShadowKind; 3] = [ShadowKind::Directional, ShadowKind::Spot, ShadowKind::Point];
}

impl From<LightKind> for ShadowKind {
    fn from(kind: LightKind) -> Self {
        match kind {
            LightKind::Directional => ShadowKind::Directional,
            LightKind::Spot => ShadowKind::Spot,
            LightKind::Point => ShadowKind::Point,
        }
    }
}

impl fmt::Display for ShadowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShadowKind::Directional => "directional",
            ShadowKind::Spot => "spot",
            ShadowKind::Point => "point",
        };
        f.write_str(name)
    }
}

/// 2D shadow map of a directional or spot light.
#[derive(Debug, Clone)]
pub struct ShadowMap {
    pub target: DepthTarget,
    pub kind: ShadowKind,
    /// Index of the light in the light list.
    pub light_index: usize,
    /// Light view-projection, refreshed every frame.
    pub light_matrix: Mat4,
}

impl ShadowMap {
    /// Map resolution, fixed at creation.
    pub fn size(&self) -> u32 {
        self.target.size
    }
}

/// Cube shadow map of a point light.
#[derive(Debug, Clone)]
pub struct CubeShadowMap {
    pub target: DepthTarget,
    pub light_index: usize,
    /// Light position, refreshed every frame.
    pub light_position: Vec3,
    pub far_plane: f32,
    /// Per-face view-projection, refreshed every frame.
    pub face_matrices: [Mat4; 6],
}

impl CubeShadowMap {
    /// Face resolution, fixed at creation.
    pub fn size(&self) -> u32 {
        self.target.size
    }
}

/// Fixed-capacity pool with first-fit slot allocation.
#[derive(Debug, Clone)]
pub struct SlotPool<T> {
    slots: Vec<Option<T>>,
    count: usize,
}

impl<T> SlotPool<T> {
    /// Create a pool with `capacity` empty slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            count: 0,
        }
    }

    /// Lowest empty slot.
    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Store a value in the lowest empty slot.
    pub fn insert(&mut self, value: T) -> Option<usize> {
        let slot = self.first_free()?;
        self.slots[slot] = Some(value);
        self.count += 1;
        Some(slot)
    }

    /// Empty a slot, returning its value.
    pub fn take(&mut self, slot: usize) -> Option<T> {
        let value = self.slots.get_mut(slot)?.take()?;
        self.count -= 1;
        Some(value)
    }

    pub fn get(&self, slot: usize) -> Option<&T> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Occupied slots in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, value)| value.as_ref().map(|v| (slot, v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, value)| value.as_mut().map(|v| (slot, v)))
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// Resolution and far plane for resources created now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreateParams {
    pub map_size: u32,
    pub cube_map_size: u32,
    pub point_far_plane: f32,
}

/// Outcome of a reconcile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub pruned: usize,
    /// Lights left without a shadow (pool full or creation failed).
    pub skipped: usize,
}

/// All shadow resources, grouped by kind.
#[derive(Debug)]
pub struct ShadowRegistry {
    directional: SlotPool<ShadowMap>,
    spot: SlotPool<ShadowMap>,
    point: SlotPool<CubeShadowMap>,
}

impl ShadowRegistry {
    /// Create an empty registry with `capacity` slots per kind.
    pub fn new(capacity: usize) -> Self {
        Self {
            directional: SlotPool::new(capacity),
            spot: SlotPool::new(capacity),
            point: SlotPool::new(capacity),
        }
    }

    pub fn directional(&self) -> &SlotPool<ShadowMap> {
        &self.directional
    }

    pub fn spot(&self) -> &SlotPool<ShadowMap> {
        &self.spot
    }

    pub fn point(&self) -> &SlotPool<CubeShadowMap> {
        &self.point
    }

    /// Number of resources of a kind.
    pub fn count(&self, kind: ShadowKind) -> usize {
        match kind {
            ShadowKind::Directional => self.directional.len(),
            ShadowKind::Spot => self.spot.len(),
            ShadowKind::Point => self.point.len(),
        }
    }

    /// Number of resources of all kinds.
    pub fn total(&self) -> usize {
        ShadowKind::ALL.iter().map(|&kind| self.count(kind)).sum()
    }

    /// Slot of the resource shadowing `light_index`, if any.
    pub fn find(&self, kind: ShadowKind, light_index: usize) -> Option<usize> {
        match kind {
            ShadowKind::Directional => find_light(&self.directional, |m| m.light_index, light_index),
            ShadowKind::Spot => find_light(&self.spot, |m| m.light_index, light_index),
            ShadowKind::Point => find_light(&self.point, |m| m.light_index, light_index),
        }
    }

    fn map_pool_mut(&mut self, kind: ShadowKind) -> Result<&mut SlotPool<ShadowMap>> {
        match kind {
            ShadowKind::Directional => Ok(&mut self.directional),
            ShadowKind::Spot => Ok(&mut self.spot),
            ShadowKind::Point => Err(ShadowError::NotAFlatMap(kind)),
        }
    }

    /// Create a 2D map for a directional or spot light.
    pub fn create_map(
        &mut self,
        device: &mut dyn GraphicsDevice,
        kind: ShadowKind,
        light_index: usize,
        size: u32,
    ) -> Result<usize> {
        let pool = self.map_pool_mut(kind)?;
        if pool.first_free().is_none() {
            return Err(ShadowError::NoFreeSlot {
                kind,
                capacity: pool.capacity(),
            });
        }

        let target = create_depth_target(device, TextureKind::Flat, size)?;
        let map = ShadowMap {
            target,
            kind,
            light_index,
            light_matrix: Mat4::IDENTITY,
        };
        let slot = pool.insert(map).ok_or(ShadowError::NoFreeSlot {
            kind,
            capacity: pool.capacity(),
        })?;
        tracing::info!("created {} shadow map {} for light {} ({}px)", kind, slot, light_index, size);
        Ok(slot)
    }

    /// Create a cube map for a point light.
    pub fn create_cube(
        &mut self,
        device: &mut dyn GraphicsDevice,
        light_index: usize,
        size: u32,
        far_plane: f32,
    ) -> Result<usize> {
        let capacity = self.point.capacity();
        if self.point.first_free().is_none() {
            return Err(ShadowError::NoFreeSlot {
                kind: ShadowKind::Point,
                capacity,
            });
        }

        let target = create_depth_target(device, TextureKind::Cube, size)?;
        let cube = CubeShadowMap {
            target,
            light_index,
            light_position: Vec3::ZERO,
            far_plane,
            face_matrices: [Mat4::IDENTITY; 6],
        };
        let slot = self.point.insert(cube).ok_or(ShadowError::NoFreeSlot {
            kind: ShadowKind::Point,
            capacity,
        })?;
        tracing::info!("created point shadow map {} for light {} ({}px faces)", slot, light_index, size);
        Ok(slot)
    }

    /// Release a resource and free its slot. Empty slots are ignored.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice, kind: ShadowKind, slot: usize) -> bool {
        let target = match kind {
            ShadowKind::Directional => self.directional.get(slot).map(|m| m.target),
            ShadowKind::Spot => self.spot.get(slot).map(|m| m.target),
            ShadowKind::Point => self.point.get(slot).map(|m| m.target),
        };
        let Some(target) = target else {
            return false;
        };

        // GPU handles go first, then the slot.
        release_depth_target(device, &target);
        match kind {
            ShadowKind::Directional => self.directional.take(slot).is_some(),
            ShadowKind::Spot => self.spot.take(slot).is_some(),
            ShadowKind::Point => self.point.take(slot).is_some(),
        }
    }

    /// Release every resource.
    pub fn clear(&mut self, device: &mut dyn GraphicsDevice) {
        for kind in ShadowKind::ALL {
            let slots: Vec<usize> = self.slots(kind);
            for slot in slots {
                self.destroy(device, kind, slot);
            }
        }
    }

    fn slots(&self, kind: ShadowKind) -> Vec<usize> {
        match kind {
            ShadowKind::Directional => self.directional.iter().map(|(slot, _)| slot).collect(),
            ShadowKind::Spot => self.spot.iter().map(|(slot, _)| slot).collect(),
            ShadowKind::Point => self.point.iter().map(|(slot, _)| slot).collect(),
        }
    }

    fn light_of(&self, kind: ShadowKind, slot: usize) -> Option<usize> {
        match kind {
            ShadowKind::Directional => self.directional.get(slot).map(|m| m.light_index),
            ShadowKind::Spot => self.spot.get(slot).map(|m| m.light_index),
            ShadowKind::Point => self.point.get(slot).map(|m| m.light_index),
        }
    }

    /// Destroy resources whose light no longer exists or changed kind.
    pub fn prune(&mut self, device: &mut dyn GraphicsDevice, lights: &[Light]) -> usize {
        let mut pruned = 0;
        for kind in ShadowKind::ALL {
            for slot in self.slots(kind) {
                let Some(light_index) = self.light_of(kind, slot) else {
                    continue;
                };
                let stale = lights
                    .get(light_index)
                    .is_none_or(|light| ShadowKind::from(light.kind) != kind);
                if stale {
                    tracing::warn!("dropping {} shadow {} of stale light {}", kind, slot, light_index);
                    self.destroy(device, kind, slot);
                    pruned += 1;
                }
            }
        }
        pruned
    }

    /// Give every light a resource of its kind, creating only what is
    /// missing. Stale resources are pruned first when `prune` is set.
    pub fn reconcile(
        &mut self,
        device: &mut dyn GraphicsDevice,
        lights: &[Light],
        params: CreateParams,
        prune: bool,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if prune {
            report.pruned = self.prune(device, lights);
        }

        let mut exhausted = [false; 3];
        for (light_index, light) in lights.iter().enumerate() {
            let kind = ShadowKind::from(light.kind);
            if self.find(kind, light_index).is_some() {
                continue;
            }

            let created = match kind {
                ShadowKind::Point => {
                    self.create_cube(device, light_index, params.cube_map_size, params.point_far_plane)
                }
                ShadowKind::Directional | ShadowKind::Spot => {
                    self.create_map(device, kind, light_index, params.map_size)
                }
            };
            match created {
                Ok(_) => report.created += 1,
                Err(ShadowError::NoFreeSlot { kind, capacity }) => {
                    report.skipped += 1;
                    let first = !std::mem::replace(&mut exhausted[kind as usize], true);
                    if first {
                        tracing::warn!("{} shadow pool full ({}), light {} unshadowed", kind, capacity, light_index);
                    } else {
                        tracing::debug!("light {} unshadowed, {} pool full", light_index, kind);
                    }
                }
                Err(err) => {
                    report.skipped += 1;
                    tracing::warn!("shadow for light {} not created: {}", light_index, err);
                }
            }
        }
        report
    }

    /// Recompute every resource's matrices from its light.
    pub fn update_matrices(&mut self, lights: &[Light], config: &ShadowConfig) {
        for (_, map) in self.directional.iter_mut() {
            if let Some(light) = lights.get(map.light_index) {
                map.light_matrix = directional_light_matrix(light, &config.directional);
            }
        }
        for (_, map) in self.spot.iter_mut() {
            if let Some(light) = lights.get(map.light_index) {
                map.light_matrix = spot_light_matrix(light, &config.spot);
            }
        }
        for (_, cube) in self.point.iter_mut() {
            if let Some(light) = lights.get(cube.light_index) {
                cube.light_position = light.position;
                cube.face_matrices = point_light_matrices(light.position, config.point_near, cube.far_plane);
            }
        }
    }
}

fn find_light<T>(pool: &SlotPool<T>, light_of: impl Fn(&T) -> usize, light_index: usize) -> Option<usize> {
    pool.iter()
        .find(|(_, resource)| light_of(resource) == light_index)
        .map(|(slot, _)| slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;

    const PARAMS: CreateParams = CreateParams {
        map_size: 1024,
        cube_map_size: 512,
        point_far_plane: 25.0,
    };

    fn lights() -> Vec<Light> {
        vec![
            Light::directional(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y),
            Light::point(Vec3::new(2.0, 3.0, 0.0)),
            Light::spot(Vec3::new(0.0, 5.0, 5.0), Vec3::new(0.0, -1.0, -1.0), 30.0),
            Light::point(Vec3::new(-2.0, 3.0, 0.0)),
        ]
    }

    #[test]
    fn test_slot_pool_first_fit() {
        let mut pool = SlotPool::new(3);
        assert_eq!(pool.insert('a'), Some(0));
        assert_eq!(pool.insert('b'), Some(1));
        assert_eq!(pool.insert('c'), Some(2));
        assert_eq!(pool.insert('d'), None);

        assert_eq!(pool.take(1), Some('b'));
        assert_eq!(pool.take(1), None);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.insert('e'), Some(1));
        assert_eq!(pool.take(7), None);
    }

    #[test]
    fn test_reconcile_creates_one_per_light() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut registry = ShadowRegistry::new(8);
        let lights = lights();

        let report = registry.reconcile(&mut device, &lights, PARAMS, true);
        assert_eq!(report.created, 4);
        assert_eq!(registry.count(ShadowKind::Directional), 1);
        assert_eq!(registry.count(ShadowKind::Spot), 1);
        assert_eq!(registry.count(ShadowKind::Point), 2);
        assert_eq!(registry.find(ShadowKind::Point, 3), Some(1));
        assert_eq!(registry.find(ShadowKind::Spot, 0), None);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut registry = ShadowRegistry::new(8);
        let lights = lights();

        registry.reconcile(&mut device, &lights, PARAMS, true);
        let textures = device.live_textures();
        let report = registry.reconcile(&mut device, &lights, PARAMS, true);

        assert_eq!(report, ReconcileReport::default());
        assert_eq!(registry.total(), 4);
        assert_eq!(device.live_textures(), textures);
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut registry = ShadowRegistry::new(2);
        for light in 0..2 {
            registry.create_map(&mut device, ShadowKind::Directional, light, 512).unwrap();
        }
        let textures = device.live_textures();

        let err = registry
            .create_map(&mut device, ShadowKind::Directional, 2, 512)
            .unwrap_err();
        assert!(matches!(
            err,
            ShadowError::NoFreeSlot {
                kind: ShadowKind::Directional,
                capacity: 2
            }
        ));
        assert_eq!(registry.count(ShadowKind::Directional), 2);
        assert_eq!(device.live_textures(), textures);
    }

    #[test]
    fn test_reconcile_skips_lights_beyond_capacity() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut registry = ShadowRegistry::new(1);
        let lights = lights();

        let report = registry.reconcile(&mut device, &lights, PARAMS, true);
        assert_eq!(report.created, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(registry.find(ShadowKind::Point, 3), None);
    }

    #[test]
    fn test_destroy_then_create_gets_fresh_handles() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut registry = ShadowRegistry::new(8);
        let slot = registry.create_cube(&mut device, 0, 256, 25.0).unwrap();
        let old = registry.point().get(slot).unwrap().target;
        let count = registry.count(ShadowKind::Point);

        assert!(registry.destroy(&mut device, ShadowKind::Point, slot));
        assert!(!registry.destroy(&mut device, ShadowKind::Point, slot));
        assert_eq!(registry.count(ShadowKind::Point), count - 1);
        assert!(!device.has_framebuffer(old.framebuffer));

        let again = registry.create_cube(&mut device, 0, 256, 25.0).unwrap();
        let new = registry.point().get(again).unwrap().target;
        assert_eq!(again, slot);
        assert_eq!(registry.count(ShadowKind::Point), count);
        assert_ne!(new.texture, old.texture);
        assert_ne!(new.framebuffer, old.framebuffer);
        assert!(device.framebuffer_status(new.framebuffer).is_complete());
    }

    #[test]
    fn test_prune_stale_lights() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut registry = ShadowRegistry::new(8);
        let mut lights = lights();
        registry.reconcile(&mut device, &lights, PARAMS, true);

        // Light 3 disappears, light 0 becomes a spot light.
        lights.pop();
        lights[0] = Light::spot(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y, 45.0);
        let report = registry.reconcile(&mut device, &lights, PARAMS, true);

        assert_eq!(report.pruned, 2);
        assert_eq!(report.created, 1);
        assert_eq!(registry.count(ShadowKind::Directional), 0);
        assert_eq!(registry.count(ShadowKind::Spot), 2);
        assert_eq!(registry.count(ShadowKind::Point), 1);
        assert_eq!(device.live_textures(), 3);
    }

    #[test]
    fn test_reconcile_without_prune_keeps_stale() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut registry = ShadowRegistry::new(8);
        let lights = lights();
        registry.reconcile(&mut device, &lights, PARAMS, false);

        let report = registry.reconcile(&mut device, &lights[..1], PARAMS, false);
        assert_eq!(report.pruned, 0);
        assert_eq!(registry.total(), 4);
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut registry = ShadowRegistry::new(8);
        registry.reconcile(&mut device, &lights(), PARAMS, true);

        registry.clear(&mut device);
        assert_eq!(registry.total(), 0);
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_framebuffers(), 0);
    }

    #[test]
    fn test_create_map_rejects_point() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut registry = ShadowRegistry::new(8);

        let err = registry
            .create_map(&mut device, ShadowKind::Point, 0, 512)
            .unwrap_err();
        assert!(matches!(err, ShadowError::NotAFlatMap(ShadowKind::Point)));
        assert_eq!(registry.total(), 0);
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_framebuffers(), 0);
    }

    #[test]
    fn test_reconcile_recovers_from_creation_failures() {
        let lights = [Light::directional(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y)];
        let inject: [fn(&mut HeadlessDevice); 2] = [
            |device| device.fail_next_framebuffers(1),
            |device| device.fail_next_allocations(1),
        ];

        for fail in inject {
            let mut device = HeadlessDevice::new(800, 600);
            let mut registry = ShadowRegistry::new(8);
            fail(&mut device);

            let report = registry.reconcile(&mut device, &lights, PARAMS, true);
            assert_eq!(report.created, 0);
            assert_eq!(report.skipped, 1);
            assert_eq!(registry.count(ShadowKind::Directional), 0);
            assert_eq!(registry.directional().first_free(), Some(0));
            assert_eq!(device.live_textures(), 0);
            assert_eq!(device.live_framebuffers(), 0);

            let report = registry.reconcile(&mut device, &lights, PARAMS, true);
            assert_eq!(report.created, 1);
            assert_eq!(registry.find(ShadowKind::Directional, 0), Some(0));
        }
    }
}
