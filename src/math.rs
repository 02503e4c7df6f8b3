//! Vector and rotation helpers shared by detection and movement.

use bevy::prelude::*;

/// Tolerance used when comparing scalar distances.
pub const DISTANCE_TOLERANCE: f32 = 1e-4;

/// Whether two scalars are equal within [`DISTANCE_TOLERANCE`].
#[inline]
pub fn approximately(a: f32, b: f32) -> bool {
    (a - b).abs() <= DISTANCE_TOLERANCE
}

/// Whether a vector is within `tolerance` of zero.
#[inline]
pub fn is_near_zero(v: Vec3, tolerance: f32) -> bool {
    v.length_squared() < tolerance * tolerance
}

/// Drop the vertical component.
#[inline]
pub fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Horizontal direction of `v`, or zero if it has none.
#[inline]
pub fn normalize_xz(v: Vec3) -> Vec3 {
    flatten(v).normalize_or_zero()
}

/// Remove the part of `v` along `normal`.
#[inline]
pub fn project_on_plane(v: Vec3, normal: Vec3) -> Vec3 {
    let n = normal.normalize_or_zero();
    v - n * v.dot(n)
}

/// Angle between two vectors in radians, 0 if either is degenerate.
#[inline]
pub fn angle_between(a: Vec3, b: Vec3) -> f32 {
    if a.length_squared() <= f32::EPSILON || b.length_squared() <= f32::EPSILON {
        return 0.0;
    }
    a.angle_between(b)
}

/// Rotate `v` about `axis` by `angle` radians. A degenerate axis leaves `v`
/// unchanged.
pub fn rotate_about(v: Vec3, axis: Vec3, angle: f32) -> Vec3 {
    let axis = axis.normalize_or_zero();
    if axis == Vec3::ZERO {
        return v;
    }
    Quat::from_axis_angle(axis, angle) * v
}

/// Step `current` toward `target` by at most `max_delta`.
pub fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let delta = target - current;
    let distance = delta.length();
    if distance <= max_delta || distance <= f32::EPSILON {
        return target;
    }
    current + delta / distance * max_delta
}

/// Rotate `from` toward `to` by at most `max_angle` radians.
pub fn rotate_towards(from: Quat, to: Quat, max_angle: f32) -> Quat {
    let angle = from.angle_between(to);
    if angle <= f32::EPSILON || angle <= max_angle {
        return to;
    }
    from.slerp(to, (max_angle / angle).max(0.0))
}

/// Rotation that takes `from` onto `to` through the shorter arc.
pub fn shortest_rotation(to: Quat, from: Quat) -> Quat {
    if to.dot(from) < 0.0 {
        to * (-from).inverse()
    } else {
        to * from.inverse()
    }
}

/// Orientation whose local -Z points along `forward` with local +Y as close to
/// `up` as possible. `None` when `forward` is degenerate or parallel to `up`.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Option<Quat> {
    let back = (-forward).try_normalize()?;
    let right = up.cross(back).try_normalize()?;
    let up = back.cross(right);
    Some(Quat::from_mat3(&Mat3::from_cols(right, up, back)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn move_towards_clamps_step() {
        let v = move_towards(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), 2.0);
        assert!((v - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-6);

        let v = move_towards(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 2.0);
        assert_eq!(v, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn rotate_towards_limits_angle() {
        let from = Quat::IDENTITY;
        let to = Quat::from_rotation_y(FRAC_PI_2);
        let step = rotate_towards(from, to, 0.1);
        assert!((from.angle_between(step) - 0.1).abs() < 1e-4);

        assert_eq!(rotate_towards(from, to, PI), to);
    }

    #[test]
    fn shortest_rotation_maps_from_onto_to() {
        let from = Quat::from_rotation_y(0.3);
        let to = Quat::from_rotation_y(1.1);
        let delta = shortest_rotation(to, from);
        let (axis, angle) = delta.to_axis_angle();
        assert!((angle - 0.8).abs() < 1e-4);
        assert!((axis - Vec3::Y).length() < 1e-4);

        // A negated quaternion is the same orientation; the arc stays short.
        let delta = shortest_rotation(-to, from);
        let (_, angle) = delta.to_axis_angle();
        assert!(angle <= PI);
        assert!((angle - 0.8).abs() < 1e-4);
    }

    #[test]
    fn look_rotation_points_negative_z_forward() {
        let rotation = look_rotation(Vec3::X, Vec3::Y).unwrap();
        assert!((rotation * Vec3::NEG_Z - Vec3::X).length() < 1e-5);
        assert!((rotation * Vec3::Y - Vec3::Y).length() < 1e-5);

        assert!(look_rotation(Vec3::ZERO, Vec3::Y).is_none());
        assert!(look_rotation(Vec3::Y, Vec3::Y).is_none());
    }

    #[test]
    fn rotate_about_degenerate_axis_is_identity() {
        let v = Vec3::new(0.0, -1.0, 0.0);
        assert_eq!(rotate_about(v, Vec3::ZERO, 1.0), v);
    }

    #[test]
    fn rotate_about_tilts_horizontal_direction_down() {
        // Rotating a horizontal direction about up x dir by a positive angle
        // tips it toward the ground.
        let dir = Vec3::NEG_Z;
        let tilted = rotate_about(dir, Vec3::Y.cross(dir), 0.5);
        assert!(tilted.y < 0.0);
    }

    #[test]
    fn angle_between_handles_zero() {
        assert_eq!(angle_between(Vec3::ZERO, Vec3::Y), 0.0);
        assert!((angle_between(Vec3::X, Vec3::Y) - FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn flatten_and_project() {
        assert_eq!(flatten(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, 0.0, 3.0));
        assert_eq!(normalize_xz(Vec3::Y), Vec3::ZERO);
        let p = project_on_plane(Vec3::new(1.0, 1.0, 0.0), Vec3::Y);
        assert!((p - Vec3::X).length() < 1e-6);
    }
}
