use std::f32::consts::PI;

use nalgebra::{UnitQuaternion, Vector3};

/// Bones shorter than this (in metres) carry no usable direction.
pub const MIN_BONE_LENGTH: f32 = 1e-6;

pub fn distance(a: &Vector3<f32>, b: &Vector3<f32>) -> f32 {
    (b - a).norm()
}

pub fn lerp(a: &Vector3<f32>, b: &Vector3<f32>, t: f32) -> Vector3<f32> {
    a * (1. - t) + (b * t)
}

/// The shortest rotation taking `from` onto `to`. Returns None if either
/// vector is too short to have a direction.
///
/// Opposite vectors have no unique shortest rotation; in that case a half
/// turn about any axis perpendicular to `from` is used.
pub fn rotation_between(from: &Vector3<f32>, to: &Vector3<f32>) -> Option<UnitQuaternion<f32>> {
    if from.norm() < MIN_BONE_LENGTH || to.norm() < MIN_BONE_LENGTH {
        return None;
    }
    match UnitQuaternion::rotation_between(from, to) {
        Some(q) => Some(q),
        None => {
            let perpendicular = if from.x.abs() < 0.9 {
                from.cross(&Vector3::x())
            } else {
                from.cross(&Vector3::y())
            };
            Some(UnitQuaternion::from_axis_angle(
                &nalgebra::Unit::new_normalize(perpendicular),
                PI,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: &Vector3<f32>, b: &Vector3<f32>) -> bool {
        (a - b).norm() < 1e-5
    }

    #[test]
    fn test_lerp_endpoints() {
        let a = Vector3::new(0., 0., 1.);
        let b = Vector3::new(5., 5., 1.);
        assert!(approx(&lerp(&a, &b, 0.), &a));
        assert!(approx(&lerp(&a, &b, 1.), &b));
        assert!(approx(&lerp(&a, &b, 0.5), &Vector3::new(2.5, 2.5, 1.)));
    }

    #[test]
    fn test_rotation_between_aligns() {
        let from = Vector3::y();
        for to in [
            Vector3::new(1., 0., 0.),
            Vector3::new(0., 0., -3.),
            Vector3::new(0.3, -0.2, 0.9),
        ] {
            let q = rotation_between(&from, &to).unwrap();
            assert!(approx(&(q * from), &to.normalize()));
        }
    }

    #[test]
    fn test_rotation_between_opposite() {
        let from = Vector3::y();
        let to = Vector3::new(0., -2., 0.);
        let q = rotation_between(&from, &to).unwrap();
        assert!(approx(&(q * from), &Vector3::new(0., -1., 0.)));
    }

    #[test]
    fn test_rotation_between_degenerate() {
        assert!(rotation_between(&Vector3::y(), &Vector3::zeros()).is_none());
    }
}
