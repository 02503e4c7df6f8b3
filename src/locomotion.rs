//! Locomotion states.
//!
//! Exactly one of [`GroundedMovement`] and [`AirborneMovement`] drives the
//! body at any time. Both turn the intent into a movement vector, push the
//! body toward a target velocity with a rate-limited integrator and turn it
//! with a damped rotational spring. The controller picks the state from the
//! `Grounded` tag; the states never switch themselves.

use bevy::prelude::*;

use crate::backend::{CharacterBody, SceneQuery};
use crate::collision::CollisionMask;
use crate::config::{AirMovementConfig, GroundMovementConfig, RotationConfig};
use crate::detection::GroundSample;
use crate::intent::MovementIntent;
use crate::math::{
    angle_between, approximately, is_near_zero, look_rotation, move_towards, normalize_xz,
    project_on_plane, rotate_about, rotate_towards, shortest_rotation,
};
use crate::tags::{StatusTagSet, TagKind};

/// Movement vectors below this length count as no movement.
const MOVING_TOLERANCE: f32 = 0.001;
/// Vertical target speed below which the integrator drops its vertical part.
const VERTICAL_TARGET_TOLERANCE: f32 = 0.05;
/// Extra length of the wall check ray.
const WALL_CHECK_MARGIN: f32 = 0.01;

/// Which locomotion state is current.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LocomotionState {
    #[default]
    Grounded,
    Airborne,
}

/// Vectors derived by the current state during the last tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateVectors {
    pub movement: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Default for StateVectors {
    fn default() -> Self {
        Self {
            movement: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }
}

/// Everything a state reads or drives during one tick.
pub struct MovementContext<'a, B: ?Sized, S: ?Sized> {
    pub body: &'a mut B,
    pub scene: &'a S,
    pub tags: &'a mut StatusTagSet,
    pub ground: &'a GroundSample,
    pub intent: &'a MovementIntent,
    pub centroid: Vec3,
    pub up: Vec3,
    pub mask: CollisionMask,
    pub dt: f32,
}

/// Apply torque turning the body toward `target`.
fn apply_rotation_spring<B: CharacterBody + ?Sized>(
    body: &mut B,
    target: Quat,
    config: &RotationConfig,
) {
    let (axis, angle) = shortest_rotation(target, body.rotation()).to_axis_angle();
    let axis = axis.normalize_or_zero();
    let torque = axis * (angle * config.spring) - body.angular_velocity() * config.damper;
    body.apply_torque(torque);
}

/// Facing target for `forward`, or `fallback` when it has no horizontal part.
fn facing(forward: Vec3, up: Vec3, fallback: Quat) -> Quat {
    look_rotation(project_on_plane(forward, up), up).unwrap_or(fallback)
}

/// Movement on walkable ground.
#[derive(Debug, Clone)]
pub struct GroundedMovement {
    pub config: GroundMovementConfig,
    current_velocity: Vec3,
    current_rotation: Quat,
    vectors: StateVectors,
}

impl GroundedMovement {
    pub fn new(config: GroundMovementConfig) -> Self {
        Self {
            config,
            current_velocity: Vec3::ZERO,
            current_rotation: Quat::IDENTITY,
            vectors: StateVectors::default(),
        }
    }

    pub fn vectors(&self) -> &StateVectors {
        &self.vectors
    }

    /// Seed the integrators from the body.
    pub fn start<B: CharacterBody + ?Sized>(&mut self, body: &B) {
        self.current_velocity = body.linear_velocity();
        self.current_rotation = body.rotation();
    }

    pub fn end(&mut self) {}

    pub fn update<B, S>(&mut self, ctx: &mut MovementContext<'_, B, S>)
    where
        B: CharacterBody + ?Sized,
        S: SceneQuery + ?Sized,
    {
        let movement = self.movement_vector(ctx);
        self.vectors.movement = movement;
        self.vectors.up = ctx.up;

        let moving = !is_near_zero(movement, MOVING_TOLERANCE);
        ctx.tags.set_tag(TagKind::Moving, moving);

        let ground_velocity = ctx.ground.point_velocity();
        self.apply_movement(ctx, ground_velocity);
        self.apply_rotation(ctx, moving);
    }

    /// View-relative movement, redirected along the slope ahead when the
    /// slope is walkable and nothing blocks the way.
    fn movement_vector<B, S>(&self, ctx: &MovementContext<'_, B, S>) -> Vec3
    where
        B: CharacterBody + ?Sized,
        S: SceneQuery + ?Sized,
    {
        let movement = ctx.intent.movement_vector();
        if is_near_zero(movement, crate::math::DISTANCE_TOLERANCE) {
            return movement;
        }

        let axis = ctx.up.cross(normalize_xz(movement));
        let slope_check = rotate_about(movement, axis, self.config.slope_check_angle);
        let Some(slope_check) = slope_check.try_normalize() else {
            return movement;
        };

        let Some(slope_hit) = ctx.scene.ray_cast(
            ctx.centroid,
            slope_check,
            self.config.slope_ray_distance,
            ctx.mask,
        ) else {
            return movement;
        };

        let wall_distance = project_on_plane(slope_check, ctx.up).length() + WALL_CHECK_MARGIN;
        if ctx
            .scene
            .ray_cast(ctx.centroid, movement.normalize(), wall_distance, ctx.mask)
            .is_some()
        {
            return movement;
        }

        let Some(slope_direction) = (slope_hit.point - ctx.ground.point).try_normalize() else {
            debug!("degenerate slope direction, keeping raw movement");
            return movement;
        };

        let slope_angle =
            (angle_between(ctx.up, slope_direction) - std::f32::consts::FRAC_PI_2).abs();
        if slope_angle <= self.config.max_slope_angle || approximately(slope_angle, 0.0) {
            slope_direction * movement.length()
        } else {
            movement
        }
    }

    fn apply_movement<B, S>(&mut self, ctx: &mut MovementContext<'_, B, S>, ground_velocity: Vec3)
    where
        B: CharacterBody + ?Sized,
        S: SceneQuery + ?Sized,
    {
        let dt = ctx.dt;
        let up = ctx.up;
        let movement = self.vectors.movement;
        let velocity = ctx.body.linear_velocity();

        let target_speed = if ctx.intent.is_sprinting() {
            self.config.sprint_speed
        } else {
            self.config.speed
        };
        let target = movement * target_speed + ground_velocity;

        let mut acceleration = ground_velocity.length() / dt;
        acceleration += if velocity.normalize_or_zero().dot(movement) >= 0.0 {
            self.config.acceleration
        } else {
            self.config.deceleration
        };

        let mut current = self.current_velocity;
        if target.dot(up).abs() < VERTICAL_TARGET_TOLERANCE {
            current -= up * current.dot(up);
        }
        current = move_towards(current, target, acceleration * dt);

        // Keep the body's own vertical speed unless the movement asks to climb.
        let blend = movement.dot(up).abs().clamp(0.0, 1.0);
        let body_vertical = velocity.dot(up);
        let vertical = body_vertical + (current.dot(up) - body_vertical) * blend;
        current += up * (vertical - current.dot(up));
        self.current_velocity = current;

        let acceleration =
            ((current - velocity) / dt).clamp_length_max(self.config.max_acceleration);
        let mass = ctx.body.mass();
        ctx.body.apply_force(acceleration * mass);
    }

    fn apply_rotation<B, S>(&mut self, ctx: &mut MovementContext<'_, B, S>, moving: bool)
    where
        B: CharacterBody + ?Sized,
        S: SceneQuery + ?Sized,
    {
        let up = ctx.up;
        let forward = if moving {
            ctx.intent.view_direction()
        } else {
            ctx.body.forward()
        };
        self.vectors.forward = project_on_plane(forward, up).normalize_or_zero();

        let mut target = facing(forward, up, self.current_rotation);
        let mut speed = self.config.rotation.speed;

        if !moving {
            // Follow a spinning platform while idle.
            let spin = ctx.ground.angular_velocity().dot(up);
            target = Quat::from_axis_angle(up, spin * ctx.dt) * target;
            speed += spin.abs();
        }

        self.current_rotation = rotate_towards(self.current_rotation, target, speed * ctx.dt);
        apply_rotation_spring(ctx.body, self.current_rotation, &self.config.rotation);
    }
}

/// Movement while in the air.
#[derive(Debug, Clone)]
pub struct AirborneMovement {
    pub config: AirMovementConfig,
    current_velocity: Vec3,
    current_rotation: Quat,
    vectors: StateVectors,
}

impl AirborneMovement {
    pub fn new(config: AirMovementConfig) -> Self {
        Self {
            config,
            current_velocity: Vec3::ZERO,
            current_rotation: Quat::IDENTITY,
            vectors: StateVectors::default(),
        }
    }

    pub fn vectors(&self) -> &StateVectors {
        &self.vectors
    }

    /// Seed the integrators from the body.
    pub fn start<B: CharacterBody + ?Sized>(&mut self, body: &B) {
        self.current_velocity = body.linear_velocity();
        self.current_rotation = body.rotation();
    }

    pub fn end(&mut self) {}

    pub fn update<B, S>(&mut self, ctx: &mut MovementContext<'_, B, S>)
    where
        B: CharacterBody + ?Sized,
        S: SceneQuery + ?Sized,
    {
        let movement = ctx.intent.movement_vector();
        self.vectors.movement = movement;
        self.vectors.up = ctx.up;

        let moving = !is_near_zero(movement, MOVING_TOLERANCE);
        ctx.tags.set_tag(TagKind::Moving, moving);

        self.apply_movement(ctx, moving);
        self.apply_rotation(ctx, moving);
    }

    fn apply_movement<B, S>(&mut self, ctx: &mut MovementContext<'_, B, S>, moving: bool)
    where
        B: CharacterBody + ?Sized,
        S: SceneQuery + ?Sized,
    {
        let dt = ctx.dt;
        let up = ctx.up;
        let velocity = ctx.body.linear_velocity();
        let acceleration = if moving { self.config.acceleration } else { 0.0 };

        // Steer without braking: the target never drops below the current
        // horizontal speed.
        let mut current = project_on_plane(velocity, up);
        let mut target = self.vectors.movement * self.config.speed;
        if current.length_squared() > target.length_squared() {
            target = target.normalize_or_zero() * current.length();
        }
        current = move_towards(current, target, acceleration * dt);
        self.current_velocity = current;

        // Vertical motion is left to gravity.
        let acceleration = project_on_plane((current - velocity) / dt, up)
            .clamp_length_max(self.config.max_acceleration);
        let mass = ctx.body.mass();
        ctx.body.apply_force(acceleration * mass);

        if self.config.speed > 0.0 {
            let horizontal = project_on_plane(velocity, up);
            let overspeed = (horizontal.length() / self.config.speed - 1.0).max(0.0);
            ctx.body.apply_force(-horizontal * self.config.drag * overspeed);
        }
    }

    fn apply_rotation<B, S>(&mut self, ctx: &mut MovementContext<'_, B, S>, moving: bool)
    where
        B: CharacterBody + ?Sized,
        S: SceneQuery + ?Sized,
    {
        let up = ctx.up;
        let forward = if moving {
            self.vectors.movement
        } else {
            ctx.body.forward()
        };
        self.vectors.forward = project_on_plane(forward, up).normalize_or_zero();

        let target = facing(forward, up, self.current_rotation);
        self.current_rotation =
            rotate_towards(self.current_rotation, target, self.config.rotation.speed * ctx.dt);
        apply_rotation_spring(ctx.body, self.current_rotation, &self.config.rotation);
    }
}

/// Holds both locomotion states and tracks which one is current.
#[derive(Debug, Clone)]
pub struct LocomotionStateMachine {
    pub grounded: GroundedMovement,
    pub airborne: AirborneMovement,
    current: LocomotionState,
    started: bool,
}

impl LocomotionStateMachine {
    pub fn new(ground: GroundMovementConfig, air: AirMovementConfig) -> Self {
        Self {
            grounded: GroundedMovement::new(ground),
            airborne: AirborneMovement::new(air),
            current: LocomotionState::Grounded,
            started: false,
        }
    }

    pub fn current(&self) -> LocomotionState {
        self.current
    }

    /// Whether the current state has been started.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Vectors of the current state.
    pub fn vectors(&self) -> &StateVectors {
        match self.current {
            LocomotionState::Grounded => self.grounded.vectors(),
            LocomotionState::Airborne => self.airborne.vectors(),
        }
    }

    /// Movement vector of the current state.
    pub fn movement_vector(&self) -> Vec3 {
        self.vectors().movement
    }

    /// Switch to `next`, ending the current state and starting the new one.
    /// Returns `false` if `next` is already current and started.
    pub fn set_state<B: CharacterBody + ?Sized>(
        &mut self,
        next: LocomotionState,
        body: &B,
    ) -> bool {
        if self.started && next == self.current {
            return false;
        }

        if self.started {
            match self.current {
                LocomotionState::Grounded => self.grounded.end(),
                LocomotionState::Airborne => self.airborne.end(),
            }
        }

        debug!("locomotion state {:?} -> {:?}", self.current, next);
        self.current = next;
        self.started = true;
        match next {
            LocomotionState::Grounded => self.grounded.start(body),
            LocomotionState::Airborne => self.airborne.start(body),
        }
        true
    }

    /// Run the current state.
    pub fn update<B, S>(&mut self, ctx: &mut MovementContext<'_, B, S>)
    where
        B: CharacterBody + ?Sized,
        S: SceneQuery + ?Sized,
    {
        debug_assert!(self.started, "locomotion state machine updated before start");
        match self.current {
            LocomotionState::Grounded => self.grounded.update(ctx),
            LocomotionState::Airborne => self.airborne.update(ctx),
        }
    }
}
