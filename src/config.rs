//! Controller configuration.
//!
//! Tuning is grouped per concern. Every struct carries the reference values in
//! its `Default` impl, deserializes with missing fields falling back to those
//! defaults, and offers `with_*` builders. Angles are in radians.

use std::f32::consts::{FRAC_PI_4, TAU};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::collision::CollisionMask;

/// Capsule collision shape of the character.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapsuleShape {
    /// Total height, end caps included.
    pub height: f32,
    pub radius: f32,
    /// Offset of the capsule centroid from the body origin, in local space.
    pub center: Vec3,
}

impl Default for CapsuleShape {
    fn default() -> Self {
        Self {
            height: 2.0,
            radius: 0.5,
            center: Vec3::ZERO,
        }
    }
}

impl CapsuleShape {
    pub fn new(height: f32, radius: f32) -> Self {
        Self {
            height,
            radius,
            center: Vec3::ZERO,
        }
    }

    /// Builder: set the centroid offset.
    pub fn with_center(mut self, center: Vec3) -> Self {
        self.center = center;
        self
    }

    #[inline]
    pub fn half_height(&self) -> f32 {
        self.height * 0.5
    }

    /// Half length of the cylindrical section, as used by capsule colliders.
    #[inline]
    pub fn segment_half_height(&self) -> f32 {
        (self.half_height() - self.radius).max(0.0)
    }

    /// World-space centroid for a body at `position` with `rotation`.
    #[inline]
    pub fn centroid(&self, position: Vec3, rotation: Quat) -> Vec3 {
        position + rotation * self.center
    }
}

/// Ground probing parameters.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundConfig {
    /// Length of the downward sphere cast.
    pub raycast_distance: f32,
    /// Radius of the downward sphere cast.
    pub raycast_radius: f32,
    /// Highest ledge below the capsule bottom still treated as ground.
    pub max_step_height: f32,
    /// Steepest surface counted as ground.
    pub max_ground_angle: f32,
    /// Clearance below the capsule bottom within which the character is grounded.
    pub grounded_distance: f32,
    pub mask: CollisionMask,
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            raycast_distance: 5.0,
            raycast_radius: 0.3,
            max_step_height: 0.3,
            max_ground_angle: FRAC_PI_4,
            grounded_distance: 0.15,
            mask: CollisionMask::ALL,
        }
    }
}

impl GroundConfig {
    /// Builder: set sphere cast length and radius.
    pub fn with_raycast(mut self, distance: f32, radius: f32) -> Self {
        self.raycast_distance = distance;
        self.raycast_radius = radius;
        self
    }

    /// Builder: set max step height.
    pub fn with_max_step_height(mut self, height: f32) -> Self {
        self.max_step_height = height;
        self
    }

    /// Builder: set max ground angle.
    pub fn with_max_ground_angle(mut self, angle: f32) -> Self {
        self.max_ground_angle = angle;
        self
    }

    /// Builder: set grounded distance.
    pub fn with_grounded_distance(mut self, distance: f32) -> Self {
        self.grounded_distance = distance;
        self
    }

    /// Builder: set collision mask.
    pub fn with_mask(mut self, mask: CollisionMask) -> Self {
        self.mask = mask;
        self
    }
}

/// Suspension spring holding the capsule above the ground.
///
/// Spring and damper act per unit mass, so the ride height does not depend on
/// the body's mass.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundOffsetConfig {
    /// Gap kept between the capsule bottom and the ground.
    pub offset: f32,
    pub spring: f32,
    pub damper: f32,
}

impl Default for GroundOffsetConfig {
    fn default() -> Self {
        Self {
            offset: 0.15,
            spring: 1000.0,
            damper: 60.0,
        }
    }
}

impl GroundOffsetConfig {
    /// Builder: set spring parameters.
    pub fn with_spring(mut self, spring: f32, damper: f32) -> Self {
        self.spring = spring;
        self.damper = damper;
        self
    }

    /// Builder: set the ride offset.
    pub fn with_offset(mut self, offset: f32) -> Self {
        self.offset = offset;
        self
    }
}

/// Facing control shared by both locomotion states.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Max turn rate in radians per second.
    pub speed: f32,
    pub spring: f32,
    pub damper: f32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            speed: TAU,
            spring: 100.0,
            damper: 10.0,
        }
    }
}

impl RotationConfig {
    /// Builder: set turn rate.
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    /// Builder: set spring parameters.
    pub fn with_spring(mut self, spring: f32, damper: f32) -> Self {
        self.spring = spring;
        self.damper = damper;
        self
    }
}

/// Movement while grounded.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundMovementConfig {
    pub speed: f32,
    pub sprint_speed: f32,
    pub acceleration: f32,
    /// Rate used when input opposes the current velocity.
    pub deceleration: f32,
    pub max_acceleration: f32,
    /// Length of the slope probe ray.
    pub slope_ray_distance: f32,
    /// Downward tilt of the slope probe ray.
    pub slope_check_angle: f32,
    /// Steepest slope movement is redirected along.
    pub max_slope_angle: f32,
    pub rotation: RotationConfig,
}

impl Default for GroundMovementConfig {
    fn default() -> Self {
        Self {
            speed: 6.0,
            sprint_speed: 9.0,
            acceleration: 20.0,
            deceleration: 10.0,
            max_acceleration: 100.0,
            slope_ray_distance: 3.0,
            slope_check_angle: 55f32.to_radians(),
            max_slope_angle: FRAC_PI_4,
            rotation: RotationConfig::default(),
        }
    }
}

impl GroundMovementConfig {
    /// Builder: set walk and sprint speed.
    pub fn with_speed(mut self, speed: f32, sprint_speed: f32) -> Self {
        self.speed = speed;
        self.sprint_speed = sprint_speed;
        self
    }

    /// Builder: set acceleration rates.
    pub fn with_acceleration(mut self, acceleration: f32, deceleration: f32) -> Self {
        self.acceleration = acceleration;
        self.deceleration = deceleration;
        self
    }

    /// Builder: set max acceleration.
    pub fn with_max_acceleration(mut self, max_acceleration: f32) -> Self {
        self.max_acceleration = max_acceleration;
        self
    }

    /// Builder: set max slope angle.
    pub fn with_max_slope_angle(mut self, angle: f32) -> Self {
        self.max_slope_angle = angle;
        self
    }

    /// Builder: set rotation control.
    pub fn with_rotation(mut self, rotation: RotationConfig) -> Self {
        self.rotation = rotation;
        self
    }
}

/// Movement while airborne.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirMovementConfig {
    pub speed: f32,
    pub acceleration: f32,
    pub max_acceleration: f32,
    /// Horizontal drag applied above `speed`.
    pub drag: f32,
    pub rotation: RotationConfig,
}

impl Default for AirMovementConfig {
    fn default() -> Self {
        Self {
            speed: 6.0,
            acceleration: 20.0,
            max_acceleration: 100.0,
            drag: 1.0,
            rotation: RotationConfig::default(),
        }
    }
}

impl AirMovementConfig {
    /// Builder: set speed.
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    /// Builder: set acceleration.
    pub fn with_acceleration(mut self, acceleration: f32) -> Self {
        self.acceleration = acceleration;
        self
    }

    /// Builder: set drag.
    pub fn with_drag(mut self, drag: f32) -> Self {
        self.drag = drag;
        self
    }

    /// Builder: set rotation control.
    pub fn with_rotation(mut self, rotation: RotationConfig) -> Self {
        self.rotation = rotation;
        self
    }
}

/// Jump tuning.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JumpConfig {
    /// Grace period after leaving the ground.
    pub coyote_time: f32,
    /// How long an early jump request is kept.
    pub buffer_time: f32,
    /// Vertical launch velocity.
    pub launch_speed: f32,
    /// Minimum `dot(contact direction, up)` for a head bump.
    pub head_bump_threshold: f32,
}

impl Default for JumpConfig {
    fn default() -> Self {
        Self {
            coyote_time: 0.1,
            buffer_time: 0.2,
            launch_speed: 16.0,
            head_bump_threshold: 0.95,
        }
    }
}

impl JumpConfig {
    /// Builder: set coyote time.
    pub fn with_coyote_time(mut self, time: f32) -> Self {
        self.coyote_time = time;
        self
    }

    /// Builder: set jump buffer time.
    pub fn with_buffer_time(mut self, time: f32) -> Self {
        self.buffer_time = time;
        self
    }

    /// Builder: set launch speed.
    pub fn with_launch_speed(mut self, speed: f32) -> Self {
        self.launch_speed = speed;
        self
    }
}

/// Dash tuning.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashConfig {
    pub ground_force: f32,
    pub air_force: f32,
    /// Cooldown, also the time the `Dashing` tag stays on.
    pub cooldown: f32,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            ground_force: 50.0,
            air_force: 20.0,
            cooldown: 0.5,
        }
    }
}

impl DashConfig {
    /// Builder: set dash forces.
    pub fn with_force(mut self, ground: f32, air: f32) -> Self {
        self.ground_force = ground;
        self.air_force = air;
        self
    }

    /// Builder: set cooldown.
    pub fn with_cooldown(mut self, cooldown: f32) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Complete configuration of a character controller.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub gravity: Vec3,
    pub capsule: CapsuleShape,
    pub ground: GroundConfig,
    pub ground_offset: GroundOffsetConfig,
    pub ground_movement: GroundMovementConfig,
    pub air_movement: AirMovementConfig,
    pub jump: JumpConfig,
    pub dash: DashConfig,
    /// Vertical speed below which an airborne character counts as falling.
    pub falling_speed: f32,
    /// Invulnerability granted by
    /// [`on_damaged`](crate::controller::CharacterController::on_damaged).
    pub invulnerability_time: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            capsule: CapsuleShape::default(),
            ground: GroundConfig::default(),
            ground_offset: GroundOffsetConfig::default(),
            ground_movement: GroundMovementConfig::default(),
            air_movement: AirMovementConfig::default(),
            jump: JumpConfig::default(),
            dash: DashConfig::default(),
            falling_speed: -0.1,
            invulnerability_time: 1.0,
        }
    }
}

impl ControllerConfig {
    /// World up, opposite to gravity. Falls back to `Vec3::Y` with no gravity.
    pub fn up(&self) -> Vec3 {
        (-self.gravity).try_normalize().unwrap_or(Vec3::Y)
    }

    /// Builder: set gravity.
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    /// Builder: set capsule shape.
    pub fn with_capsule(mut self, capsule: CapsuleShape) -> Self {
        self.capsule = capsule;
        self
    }

    /// Builder: set ground probing.
    pub fn with_ground(mut self, ground: GroundConfig) -> Self {
        self.ground = ground;
        self
    }

    /// Builder: set the suspension spring.
    pub fn with_ground_offset(mut self, ground_offset: GroundOffsetConfig) -> Self {
        self.ground_offset = ground_offset;
        self
    }

    /// Builder: set grounded movement.
    pub fn with_ground_movement(mut self, movement: GroundMovementConfig) -> Self {
        self.ground_movement = movement;
        self
    }

    /// Builder: set airborne movement.
    pub fn with_air_movement(mut self, movement: AirMovementConfig) -> Self {
        self.air_movement = movement;
        self
    }

    /// Builder: set jump tuning.
    pub fn with_jump(mut self, jump: JumpConfig) -> Self {
        self.jump = jump;
        self
    }

    /// Builder: set dash tuning.
    pub fn with_dash(mut self, dash: DashConfig) -> Self {
        self.dash = dash;
        self
    }

    /// Builder: set the invulnerability window.
    pub fn with_invulnerability_time(mut self, time: f32) -> Self {
        self.invulnerability_time = time;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capsule_dimensions() {
        let capsule = CapsuleShape::new(2.0, 0.5).with_center(Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(capsule.half_height(), 1.0);
        assert_eq!(capsule.segment_half_height(), 0.5);
        assert_eq!(
            capsule.centroid(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY),
            Vec3::new(1.0, 1.0, 0.0)
        );
    }

    #[test]
    fn ground_defaults() {
        let config = GroundConfig::default();
        assert_eq!(config.raycast_distance, 5.0);
        assert_eq!(config.raycast_radius, 0.3);
        assert_eq!(config.max_step_height, 0.3);
        assert!((config.max_ground_angle.to_degrees() - 45.0).abs() < 1e-4);
        assert_eq!(config.grounded_distance, 0.15);
    }

    #[test]
    fn movement_defaults() {
        let ground = GroundMovementConfig::default();
        assert_eq!(ground.speed, 6.0);
        assert_eq!(ground.sprint_speed, 9.0);
        assert!((ground.slope_check_angle.to_degrees() - 55.0).abs() < 1e-4);
        assert!((ground.rotation.speed.to_degrees() - 360.0).abs() < 1e-3);

        let air = AirMovementConfig::default();
        assert_eq!(air.drag, 1.0);
        assert_eq!(air.max_acceleration, 100.0);
    }

    #[test]
    fn up_is_opposite_gravity() {
        let config = ControllerConfig::default();
        assert_eq!(config.up(), Vec3::Y);

        let config = config.with_gravity(Vec3::ZERO);
        assert_eq!(config.up(), Vec3::Y);
    }

    #[test]
    fn builders_chain() {
        let config = ControllerConfig::default()
            .with_jump(JumpConfig::default().with_launch_speed(10.0).with_coyote_time(0.2))
            .with_dash(DashConfig::default().with_cooldown(1.0));
        assert_eq!(config.jump.launch_speed, 10.0);
        assert_eq!(config.jump.coyote_time, 0.2);
        assert_eq!(config.dash.cooldown, 1.0);
    }

    #[test]
    fn deserialize_partial_uses_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{ "jump": { "launch_speed": 12.0 }, "falling_speed": -0.5 }"#)
                .unwrap();
        assert_eq!(config.jump.launch_speed, 12.0);
        assert_eq!(config.jump.coyote_time, 0.1);
        assert_eq!(config.falling_speed, -0.5);
        assert_eq!(config.dash, DashConfig::default());
    }
}
