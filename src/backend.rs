//! Physics backend abstraction.
//!
//! The locomotion core never talks to a physics engine directly. It reads and
//! drives the character's rigid body through [`CharacterBody`] and probes the
//! world through [`SceneQuery`]; both are handed to
//! [`CharacterController::fixed_update`](crate::controller::CharacterController::fixed_update)
//! every tick. A [`CharacterPhysicsBackend`] bundles the Bevy plugin that
//! builds those adapters from a concrete engine (Rapier3D included).

use bevy::prelude::*;

use crate::collision::{CollisionMask, RayHit, ShapeHit};

/// Handle to the character's rigid body.
///
/// Forces and torques accumulate for the current physics step; impulses and
/// velocity changes are instantaneous.
pub trait CharacterBody {
    /// Current world position of the body origin.
    fn position(&self) -> Vec3;

    /// Current world rotation.
    fn rotation(&self) -> Quat;

    fn linear_velocity(&self) -> Vec3;

    fn angular_velocity(&self) -> Vec3;

    fn mass(&self) -> f32;

    /// Add a force for the current physics step.
    fn apply_force(&mut self, force: Vec3);

    /// Add a torque for the current physics step.
    fn apply_torque(&mut self, torque: Vec3);

    /// Apply an instantaneous change in momentum.
    fn apply_impulse(&mut self, impulse: Vec3);

    /// Kinematically move the body to a new position.
    fn move_position(&mut self, position: Vec3);

    /// Force accumulated so far in the current physics step.
    fn accumulated_force(&self) -> Vec3;

    /// Add an acceleration for the current step, independent of mass.
    fn apply_acceleration(&mut self, acceleration: Vec3) {
        let mass = self.mass();
        self.apply_force(acceleration * mass);
    }

    /// Apply an instantaneous velocity change, independent of mass.
    fn apply_velocity_change(&mut self, delta_velocity: Vec3) {
        let mass = self.mass();
        self.apply_impulse(delta_velocity * mass);
    }

    /// Facing direction (local -Z) in world space.
    fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::NEG_Z
    }
}

/// Scene query service.
///
/// Implementations are expected to ignore the character's own rigid body.
pub trait SceneQuery {
    /// Sweep a sphere and write every surface it touches into `hits`.
    ///
    /// `hits` is cleared first. Order is unspecified; callers sort as needed.
    /// Trigger volumes and unwalkable geometry are reported with their flags
    /// set rather than filtered out.
    fn sphere_cast(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
        mask: CollisionMask,
        hits: &mut Vec<ShapeHit>,
    );

    /// Cast a ray against solid, non-trigger geometry.
    fn ray_cast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: CollisionMask,
    ) -> Option<RayHit>;

    /// Cast a ray against a single collider only.
    fn ray_cast_against(
        &self,
        shape: Entity,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<RayHit>;
}

/// A physics engine integration.
///
/// The backend plugin is responsible for running the controller's fixed
/// update once per physics tick with adapters for the body and the scene.
pub trait CharacterPhysicsBackend: 'static + Send + Sync {
    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;
}

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}
