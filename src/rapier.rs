//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature (on by default).
//!
//! The controller reads and drives the body through [`RapierBody`] and probes
//! the world through [`RapierScene`]. Forces written by the controller are kept
//! in a [`ControllerForces`] ledger so they can be taken back out of
//! [`ExternalForce`] at the start of the next tick, leaving user forces alone.

use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::backend::{CharacterBody, CharacterPhysicsBackend, SceneQuery};
use crate::collision::{
    CollisionMask, CollisionPhase, ContactPoint, RayHit, ShapeHit, SurfaceMotion,
};
use crate::controller::CharacterController;
use crate::detection::GROUND_HIT_COUNT;
use crate::intent::MovementIntent;
use crate::CharacterControllerSet;

/// Collider mass of [`Rapier3dCharacterBundle`].
pub const DEFAULT_CHARACTER_MASS: f32 = 10.0;

/// Rapier3D physics backend for the character controller.
pub struct Rapier3dBackend;

impl CharacterPhysicsBackend for Rapier3dBackend {
    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }
}

/// Plugin that sets up Rapier3D-specific systems for the character controller.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<Unwalkable>();

        // Take last tick's controller forces back out of ExternalForce.
        app.add_systems(
            FixedUpdate,
            clear_controller_forces.in_set(CharacterControllerSet::Preparation),
        );

        app.add_systems(
            FixedUpdate,
            (rapier_collision_events, rapier_controller_update)
                .chain()
                .in_set(CharacterControllerSet::Update),
        );

        app.add_systems(
            FixedUpdate,
            apply_controller_forces.in_set(CharacterControllerSet::FinalApplication),
        );
    }
}

/// Marks a collider the character can never stand on.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Unwalkable;

/// Forces the controller applied, kept apart from user forces.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct ControllerForces {
    force: Vec3,
    torque: Vec3,
    applied_force: Vec3,
    applied_torque: Vec3,
}

impl ControllerForces {
    /// Force accumulated in the current tick.
    pub fn force(&self) -> Vec3 {
        self.force
    }

    /// Torque accumulated in the current tick.
    pub fn torque(&self) -> Vec3 {
        self.torque
    }

    /// Clear the accumulators. Returns what was applied last tick.
    fn prepare_new_frame(&mut self) -> (Vec3, Vec3) {
        let applied = (self.applied_force, self.applied_torque);
        *self = Self::default();
        applied
    }

    /// Record the accumulated forces as applied and return them.
    fn finalize_frame(&mut self) -> (Vec3, Vec3) {
        self.applied_force = self.force;
        self.applied_torque = self.torque;
        (self.force, self.torque)
    }
}

/// Colliders the character touched during the previous tick.
#[derive(Component, Debug, Clone, Default)]
pub struct ContactTracker {
    touching: Vec<Entity>,
}

impl ContactTracker {
    pub fn touching(&self) -> &[Entity] {
        &self.touching
    }
}

/// Subtract the forces we applied last tick from ExternalForce and clear the
/// ledger.
pub fn clear_controller_forces(mut q: Query<(&mut ExternalForce, &mut ControllerForces)>) {
    for (mut ext_force, mut forces) in &mut q {
        let (force, torque) = forces.prepare_new_frame();
        ext_force.force -= force;
        ext_force.torque -= torque;
    }
}

/// Add the forces accumulated this tick to ExternalForce.
pub fn apply_controller_forces(mut q: Query<(&mut ExternalForce, &mut ControllerForces)>) {
    for (mut ext_force, mut forces) in &mut q {
        let (force, torque) = forces.finalize_frame();
        ext_force.force += force;
        ext_force.torque += torque;
    }
}

/// [`CharacterBody`] over the Rapier components of one entity.
pub struct RapierBody<'a> {
    transform: Mut<'a, Transform>,
    velocity: Velocity,
    mass: f32,
    forces: Mut<'a, ControllerForces>,
    impulse: Mut<'a, ExternalImpulse>,
}

impl CharacterBody for RapierBody<'_> {
    fn position(&self) -> Vec3 {
        self.transform.translation
    }

    fn rotation(&self) -> Quat {
        self.transform.rotation
    }

    fn linear_velocity(&self) -> Vec3 {
        self.velocity.linvel
    }

    fn angular_velocity(&self) -> Vec3 {
        self.velocity.angvel
    }

    fn mass(&self) -> f32 {
        self.mass
    }

    fn apply_force(&mut self, force: Vec3) {
        self.forces.force += force;
    }

    fn apply_torque(&mut self, torque: Vec3) {
        self.forces.torque += torque;
    }

    fn apply_impulse(&mut self, impulse: Vec3) {
        self.impulse.impulse += impulse;
    }

    fn move_position(&mut self, position: Vec3) {
        self.transform.translation = position;
    }

    fn accumulated_force(&self) -> Vec3 {
        self.forces.force
    }
}

/// Per-collider lookups the scene adapter needs besides the Rapier context.
#[derive(SystemParam)]
pub struct SurfaceLookup<'w, 's> {
    sensors: Query<'w, 's, (), With<Sensor>>,
    unwalkable: Query<'w, 's, (), With<Unwalkable>>,
    bodies: Query<'w, 's, (&'static Velocity, &'static GlobalTransform)>,
    parents: Query<'w, 's, &'static ChildOf>,
}

impl SurfaceLookup<'_, '_> {
    /// Rigid body carrying `collider` and its motion, if it has a velocity.
    fn motion(&self, collider: Entity) -> Option<(Entity, SurfaceMotion)> {
        let body = if self.bodies.contains(collider) {
            collider
        } else {
            self.parents
                .get(collider)
                .ok()
                .map(|child_of| child_of.parent())
                .filter(|parent| self.bodies.contains(*parent))?
        };
        let (velocity, transform) = self.bodies.get(body).ok()?;
        Some((
            body,
            SurfaceMotion {
                linear_velocity: velocity.linvel,
                angular_velocity: velocity.angvel,
                pivot: transform.translation(),
            },
        ))
    }
}

/// [`SceneQuery`] over the Rapier query pipeline, ignoring one character.
pub struct RapierScene<'a, 'w, 's> {
    context: &'a RapierContext<'a>,
    surfaces: &'a SurfaceLookup<'w, 's>,
    character: Entity,
}

impl<'a, 'w, 's> RapierScene<'a, 'w, 's> {
    pub fn new(
        context: &'a RapierContext<'a>,
        surfaces: &'a SurfaceLookup<'w, 's>,
        character: Entity,
    ) -> Self {
        Self {
            context,
            surfaces,
            character,
        }
    }

    fn filter<'f>(&self, mask: CollisionMask) -> QueryFilter<'f> {
        QueryFilter::default()
            .exclude_rigid_body(self.character)
            .groups(CollisionGroups::new(
                Group::ALL,
                Group::from_bits_truncate(mask.0),
            ))
    }
}

impl SceneQuery for RapierScene<'_, '_, '_> {
    fn sphere_cast(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
        mask: CollisionMask,
        hits: &mut Vec<ShapeHit>,
    ) {
        hits.clear();
        let Some(direction) = direction.try_normalize() else {
            return;
        };

        // Rapier reports the first hit only; cast again without it until the
        // buffer is full or nothing is left.
        let sphere = Collider::ball(radius);
        let mut seen: Vec<Entity> = Vec::new();
        while hits.len() < GROUND_HIT_COUNT {
            let unseen = |entity: Entity| !seen.contains(&entity);
            let filter = self.filter(mask).predicate(&unseen);
            let Some((entity, hit)) = self.context.cast_shape(
                origin,
                Quat::IDENTITY,
                direction,
                &sphere,
                ShapeCastOptions {
                    max_time_of_impact: max_distance,
                    stop_at_penetration: false,
                    ..default()
                },
                filter,
            ) else {
                break;
            };
            seen.push(entity);

            // Initially penetrating: no usable geometry.
            let Some(details) = hit.details else {
                continue;
            };

            let normal = details.normal1.normalize_or(-direction);
            let center = origin + direction * hit.time_of_impact;
            let mut shape_hit =
                ShapeHit::new(center - normal * radius, normal, hit.time_of_impact, entity);
            if let Some((body, motion)) = self.surfaces.motion(entity) {
                shape_hit = shape_hit.with_body(body, motion);
            }
            shape_hit.is_trigger = self.surfaces.sensors.contains(entity);
            shape_hit.walkable = !self.surfaces.unwalkable.contains(entity);
            hits.push(shape_hit);
        }
    }

    fn ray_cast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: CollisionMask,
    ) -> Option<RayHit> {
        let direction = direction.try_normalize()?;
        let filter = self.filter(mask).exclude_sensors();
        self.context
            .cast_ray_and_get_normal(origin, direction, max_distance, true, filter)
            .map(|(entity, hit)| RayHit::new(hit.point, hit.normal, hit.time_of_impact, entity))
    }

    fn ray_cast_against(
        &self,
        shape: Entity,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<RayHit> {
        let direction = direction.try_normalize()?;
        let only = |entity: Entity| entity == shape;
        let filter = QueryFilter::default().predicate(&only);
        self.context
            .cast_ray_and_get_normal(origin, direction, max_distance, true, filter)
            .map(|(entity, hit)| RayHit::new(hit.point, hit.normal, hit.time_of_impact, entity))
    }
}

/// Fixed timestep, with fallback for testing scenarios.
fn fixed_dt(time: Option<Res<Time<Fixed>>>) -> f32 {
    time.map(|t| t.delta_secs())
        .filter(|&d| d > 0.0)
        .unwrap_or(1.0 / 60.0)
}

/// Deliver contacts of the character's collider as enter/stay/exit phases.
pub fn rapier_collision_events(
    rapier_context: ReadRapierContext,
    mut q: Query<(
        Entity,
        &Transform,
        &mut CharacterController,
        &mut ContactTracker,
    )>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    let mut current: Vec<(Entity, Vec<ContactPoint>)> = Vec::new();
    for (entity, transform, mut controller, mut tracker) in &mut q {
        current.clear();
        for pair in context.contact_pairs_with(entity) {
            let (other, sign): (Entity, f32) = if pair.collider1() == entity {
                (pair.collider2(), -1.0)
            } else {
                (pair.collider1(), 1.0)
            };

            // Normals point from the other collider toward the character.
            let mut contacts = Vec::new();
            for manifold in pair.manifolds() {
                let normal = manifold.normal() * sign;
                for contact in manifold.solver_contacts() {
                    contacts.push(ContactPoint::new(contact.point(), normal));
                }
            }
            if !contacts.is_empty() {
                current.push((other, contacts));
            }
        }

        let position = transform.translation;
        let mut previous = std::mem::take(&mut tracker.touching);
        for (other, contacts) in &current {
            let phase = match previous.iter().position(|e| e == other) {
                Some(index) => {
                    previous.swap_remove(index);
                    CollisionPhase::Stay
                }
                None => CollisionPhase::Enter,
            };
            controller.handle_collision(phase, contacts, position);
            tracker.touching.push(*other);
        }
        for _ in previous {
            controller.handle_collision(CollisionPhase::Exit, &[], position);
        }
    }
}

/// Run the controller's fixed update for every Rapier-driven character.
#[allow(clippy::type_complexity)]
pub fn rapier_controller_update(
    rapier_context: ReadRapierContext,
    time: Option<Res<Time<Fixed>>>,
    surfaces: SurfaceLookup,
    mut q_controllers: Query<(
        Entity,
        &mut CharacterController,
        &mut MovementIntent,
        &mut Transform,
        &Velocity,
        &ReadMassProperties,
        &mut ControllerForces,
        &mut ExternalImpulse,
    )>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };
    let dt = fixed_dt(time);

    for (entity, mut controller, mut intent, transform, velocity, mass, forces, impulse) in
        &mut q_controllers
    {
        // Mass properties arrive after the first physics step.
        let mass = mass.mass;
        if !(mass > 0.0 && mass.is_finite()) {
            continue;
        }

        let scene = RapierScene::new(&context, &surfaces, entity);
        let mut body = RapierBody {
            transform,
            velocity: *velocity,
            mass,
            forces,
            impulse,
        };
        controller.fixed_update(&mut body, &scene, &mut intent, dt);
    }
}

/// Bundle for creating a character with Rapier3D physics.
///
/// Provides the rigid body, velocity tracking, external forces/impulses, axis
/// locking, damping, mass properties and the controller's force ledger. Rapier
/// gravity is disabled: the controller applies its own.
///
/// # Example
///
/// ```ignore
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use msg_locomotion::prelude::*;
/// use msg_locomotion::rapier::Rapier3dCharacterBundle;
///
/// fn spawn_player(mut commands: Commands) {
///     commands.spawn((
///         Transform::from_xyz(0.0, 1.2, 0.0),
///         CharacterController::default(),
///         MovementIntent::default(),
///         Rapier3dCharacterBundle::new(),
///         Collider::capsule_y(0.5, 0.5),
///     ));
/// }
/// ```
///
/// # Rotation Modes
///
/// - [`Rapier3dCharacterBundle::new()`]: pitch and roll locked, yaw driven by
///   the controller's rotation spring.
/// - [`Rapier3dCharacterBundle::rotation_locked()`]: no rotation at all.
#[derive(Bundle)]
pub struct Rapier3dCharacterBundle {
    pub rigid_body: RigidBody,
    pub velocity: Velocity,
    /// Controller forces are added here each tick, next to any user forces.
    pub external_force: ExternalForce,
    /// Jump and dash impulses.
    pub external_impulse: ExternalImpulse,
    pub locked_axes: LockedAxes,
    pub damping: Damping,
    pub gravity_scale: GravityScale,
    pub mass: ColliderMassProperties,
    /// Computed mass properties. Rapier updates this after the first step.
    pub mass_properties: ReadMassProperties,
    pub forces: ControllerForces,
    pub contacts: ContactTracker,
}

impl Default for Rapier3dCharacterBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl Rapier3dCharacterBundle {
    /// Dynamic body that can only turn about the vertical axis.
    pub fn new() -> Self {
        Self {
            rigid_body: RigidBody::Dynamic,
            velocity: Velocity::default(),
            external_force: ExternalForce::default(),
            external_impulse: ExternalImpulse::default(),
            locked_axes: LockedAxes::ROTATION_LOCKED_X | LockedAxes::ROTATION_LOCKED_Z,
            damping: Damping {
                linear_damping: 0.0,
                angular_damping: 0.05,
            },
            gravity_scale: GravityScale(0.0),
            mass: ColliderMassProperties::Mass(DEFAULT_CHARACTER_MASS),
            mass_properties: ReadMassProperties::default(),
            forces: ControllerForces::default(),
            contacts: ContactTracker::default(),
        }
    }

    /// Dynamic body with every rotation axis locked.
    pub fn rotation_locked() -> Self {
        Self {
            locked_axes: LockedAxes::ROTATION_LOCKED,
            ..Self::new()
        }
    }

    /// Set the rigid body type.
    pub fn with_body(mut self, body: RigidBody) -> Self {
        self.rigid_body = body;
        self
    }

    /// Set the damping coefficients for velocity reduction.
    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.damping = Damping {
            linear_damping: linear,
            angular_damping: angular,
        };
        self
    }

    /// Set which axes should be locked for the rigid body.
    pub fn with_locked_axes(mut self, axes: LockedAxes) -> Self {
        self.locked_axes = axes;
        self
    }

    /// Set the collider mass.
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = ColliderMassProperties::Mass(mass);
        self
    }
}
