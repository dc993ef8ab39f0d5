//! Light-space matrices
//!
//! Directional lights use a fixed orthographic volume, spot lights a
//! perspective cone matching their cutoff, point lights six 90° frusta,
//! one per cube face. All projections use wgpu's 0..1 depth range.

use super::settings::ProjectionParams;
use crate::device::CubeFace;
use crate::light::Light;
use glam::{Mat4, Vec3};

/// View direction and up vector of each cube face, in layer order. The up
/// vectors keep texel orientation consistent across faces when sampled as
/// a cube map.
pub const CUBE_FACE_TABLE: [(CubeFace, Vec3, Vec3); 6] = [
    (CubeFace::PositiveX, Vec3::X, Vec3::NEG_Y),
    (CubeFace::NegativeX, Vec3::NEG_X, Vec3::NEG_Y),
    (CubeFace::PositiveY, Vec3::Y, Vec3::Z),
    (CubeFace::NegativeY, Vec3::NEG_Y, Vec3::NEG_Z),
    (CubeFace::PositiveZ, Vec3::Z, Vec3::NEG_Y),
    (CubeFace::NegativeZ, Vec3::NEG_Z, Vec3::NEG_Y),
];

const MIN_SPOT_FOV: f32 = 1.0;
const MAX_SPOT_FOV: f32 = 179.0;

/// Look-at view from `eye` along `direction` with world-up, falling back to
/// +Z up when the direction is vertical and to straight down when it is
/// zero.
pub fn light_view(eye: Vec3, direction: Vec3) -> Mat4 {
    let forward = direction.normalize_or(Vec3::NEG_Y);
    let up = if forward.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    Mat4::look_at_rh(eye, eye + forward, up)
}

/// Orthographic light-space matrix for a directional light.
pub fn directional_light_matrix(light: &Light, params: &ProjectionParams) -> Mat4 {
    let e = params.half_extent;
    let projection = Mat4::orthographic_rh(-e, e, -e, e, params.near, params.far);
    projection * light_view(light.position, light.direction)
}

/// Full field of view (radians) of a spot light with the given cutoff
/// cosine.
pub fn spot_fov(cutoff: f32) -> f32 {
    let fov = 2.0 * cutoff.clamp(-1.0, 1.0).acos();
    fov.clamp(MIN_SPOT_FOV.to_radians(), MAX_SPOT_FOV.to_radians())
}

/// Perspective light-space matrix for a spot light.
pub fn spot_light_matrix(light: &Light, params: &ProjectionParams) -> Mat4 {
    let projection = Mat4::perspective_rh(spot_fov(light.cutoff), 1.0, params.near, params.far);
    projection * light_view(light.position, light.direction)
}

/// Projection shared by all six faces of a point shadow map.
pub fn point_projection(near: f32, far: f32) -> Mat4 {
    Mat4::perspective_rh(90f32.to_radians(), 1.0, near, far)
}

/// View matrices of the six cube faces around `position`.
pub fn point_face_views(position: Vec3) -> [Mat4; 6] {
    CUBE_FACE_TABLE.map(|(_, direction, up)| Mat4::look_at_rh(position, position + direction, up))
}

/// View-projection matrices of the six cube faces around `position`.
pub fn point_light_matrices(position: Vec3, near: f32, far: f32) -> [Mat4; 6] {
    let projection = point_projection(near, far);
    point_face_views(position).map(|view| projection * view)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_directional_view_maps_light_to_origin() {
        let position = Vec3::new(3.0, 8.0, -2.0);
        let direction = Vec3::new(-1.0, -2.0, 0.5);
        let view = light_view(position, direction);

        assert!(approx(view.transform_point3(position), Vec3::ZERO));
        let ahead = view.transform_point3(position + direction);
        assert!(approx(ahead, Vec3::new(0.0, 0.0, -direction.length())));
    }

    #[test]
    fn test_straight_down_light_is_well_formed() {
        let light = Light::directional(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y);
        let view = light_view(light.position, light.direction);
        assert!(view.is_finite());
        assert!(approx(view.transform_point3(Vec3::new(0.0, 9.0, 0.0)), Vec3::new(0.0, 0.0, -1.0)));

        let params = ProjectionParams {
            half_extent: 5.0,
            near: 1.0,
            far: 7.5,
        };
        let clip = directional_light_matrix(&light, &params).project_point3(Vec3::new(0.0, 5.0, 0.0));
        assert!(clip.x.abs() < 1e-5 && clip.y.abs() < 1e-5);
        assert!(clip.z > 0.0 && clip.z < 1.0);
    }

    #[test]
    fn test_zero_direction_falls_back() {
        assert!(light_view(Vec3::ONE, Vec3::ZERO).is_finite());
    }

    #[test]
    fn test_spot_fov_clamps_degenerate_cutoff() {
        assert!((spot_fov(0.5) - 120f32.to_radians()).abs() < 1e-5);
        assert!((spot_fov(1.5) - 1f32.to_radians()).abs() < 1e-6);
        assert!((spot_fov(-2.0) - 179f32.to_radians()).abs() < 1e-6);

        let light = Light {
            cutoff: 1.0,
            ..Light::spot(Vec3::ZERO, Vec3::NEG_Y, 30.0)
        };
        let params = ProjectionParams {
            half_extent: 0.0,
            near: 1.0,
            far: 25.0,
        };
        assert!(spot_light_matrix(&light, &params).is_finite());
    }

    #[test]
    fn test_point_faces_cover_signed_axes() {
        for position in [Vec3::ZERO, Vec3::new(-4.0, 2.5, 11.0)] {
            let views = point_face_views(position);
            assert_eq!(views.len(), 6);
            for (view, (face, direction, _)) in views.iter().zip(CUBE_FACE_TABLE) {
                let ahead = view.transform_point3(position + direction);
                assert!(approx(ahead, Vec3::new(0.0, 0.0, -1.0)), "face {:?}", face);
            }
        }
    }

    #[test]
    fn test_point_matrices_project_face_centers() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        let matrices = point_light_matrices(position, 1.0, 25.0);
        for (matrix, (_, direction, _)) in matrices.iter().zip(CUBE_FACE_TABLE) {
            let clip = matrix.project_point3(position + direction * 5.0);
            assert!(clip.x.abs() < 1e-4 && clip.y.abs() < 1e-4);
            assert!(clip.z > 0.0 && clip.z < 1.0);
        }
    }
}
