//! Shared fixtures for the shadow benchmarks.

use glam::Vec3;
use rein_shadow::{HeadlessDevice, Light, MeshObject, ShadowSystem, Transform};

/// A ring of `n` lights cycling directional, point and spot.
pub fn light_ring(n: usize) -> Vec<Light> {
    (0..n)
        .map(|i| {
            let angle = i as f32 / n.max(1) as f32 * std::f32::consts::TAU;
            let position = Vec3::new(angle.cos() * 6.0, 8.0, angle.sin() * 6.0);
            match i % 3 {
                0 => Light::directional(position, -position),
                1 => Light::point(position),
                _ => Light::spot(position, -position, 35.0),
            }
        })
        .collect()
}

/// A ground plane and a grid of `n` cubes.
pub fn cube_field(device: &mut HeadlessDevice, n: usize) -> Vec<MeshObject> {
    let side = (n as f32).sqrt().ceil().max(1.0) as usize;
    let mut objects = Vec::with_capacity(n + 1);
    if let Ok(plane) = MeshObject::plane(device, 40.0, Transform::IDENTITY) {
        objects.push(plane);
    }
    for i in 0..n {
        let x = (i % side) as f32 * 2.0 - side as f32;
        let z = (i / side) as f32 * 2.0 - side as f32;
        let transform = Transform::from_position(Vec3::new(x, 0.5, z));
        if let Ok(cube) = MeshObject::cube(device, transform) {
            objects.push(cube);
        }
    }
    objects
}

/// An initialized shadow system on a headless device.
pub fn setup_shadows() -> (HeadlessDevice, ShadowSystem) {
    let mut device = HeadlessDevice::new(1920, 1080);
    let mut shadows = ShadowSystem::default();
    if let Err(err) = shadows.init(&mut device) {
        panic!("headless shadow init failed: {err}");
    }
    (device, shadows)
}
