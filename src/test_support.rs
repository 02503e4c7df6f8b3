//! In-memory body and scene doubles for unit tests.

use bevy::prelude::*;

use crate::backend::{CharacterBody, SceneQuery};
use crate::collision::{CollisionMask, RayHit, ShapeHit, SurfaceMotion};

/// Rigid body that records what was applied to it.
#[derive(Debug, Clone)]
pub struct TestBody {
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f32,
    pub force: Vec3,
    pub torque: Vec3,
    pub impulses: Vec<Vec3>,
    pub moves: Vec<Vec3>,
}

impl Default for TestBody {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            mass: 1.0,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            impulses: Vec::new(),
            moves: Vec::new(),
        }
    }
}

impl TestBody {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..default()
        }
    }

    /// Explicit Euler step, then clear per-step accumulators.
    pub fn integrate(&mut self, dt: f32) {
        let impulse: Vec3 = self.impulses.drain(..).sum();
        self.linear_velocity += impulse / self.mass + self.force / self.mass * dt;
        self.position += self.linear_velocity * dt;
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
        self.moves.clear();
    }
}

impl CharacterBody for TestBody {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn rotation(&self) -> Quat {
        self.rotation
    }

    fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    fn mass(&self) -> f32 {
        self.mass
    }

    fn apply_force(&mut self, force: Vec3) {
        self.force += force;
    }

    fn apply_torque(&mut self, torque: Vec3) {
        self.torque += torque;
    }

    fn apply_impulse(&mut self, impulse: Vec3) {
        self.impulses.push(impulse);
    }

    fn move_position(&mut self, position: Vec3) {
        self.moves.push(position);
        self.position = position;
    }

    fn accumulated_force(&self) -> Vec3 {
        self.force
    }
}

/// Infinite plane collider.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    pub normal: Vec3,
    pub point: Vec3,
    pub shape: Entity,
    pub trigger: bool,
    pub walkable: bool,
    pub motion: SurfaceMotion,
}

impl Plane {
    pub fn new(normal: Vec3, point: Vec3) -> Self {
        Self {
            normal: normal.normalize(),
            point,
            shape: Entity::from_raw(100),
            trigger: false,
            walkable: true,
            motion: SurfaceMotion::STATIC,
        }
    }

    pub fn horizontal(height: f32) -> Self {
        Self::new(Vec3::Y, Vec3::new(0.0, height, 0.0))
    }

    pub fn with_shape(mut self, shape: Entity) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_motion(mut self, motion: SurfaceMotion) -> Self {
        self.motion = motion;
        self
    }

    pub fn trigger(mut self) -> Self {
        self.trigger = true;
        self
    }

    pub fn unwalkable(mut self) -> Self {
        self.walkable = false;
        self
    }

    fn ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit> {
        let dir = direction.try_normalize()?;
        let denom = dir.dot(self.normal);
        if denom >= 0.0 {
            return None;
        }
        let t = (self.point - origin).dot(self.normal) / denom;
        if !(0.0..=max_distance).contains(&t) {
            return None;
        }
        Some(RayHit::new(origin + dir * t, self.normal, t, self.shape))
    }

    fn sweep(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<ShapeHit> {
        let dir = direction.try_normalize()?;
        let rate = dir.dot(self.normal);
        let gap = (origin - self.point).dot(self.normal) - radius;
        if rate >= 0.0 || gap < 0.0 {
            return None;
        }
        let t = gap / -rate;
        if t > max_distance {
            return None;
        }
        let point = origin + dir * t - self.normal * radius;
        let mut hit = ShapeHit::new(point, self.normal, t, self.shape)
            .with_body(self.shape, self.motion);
        hit.is_trigger = self.trigger;
        hit.walkable = self.walkable;
        Some(hit)
    }
}

/// Scene made of planes.
#[derive(Debug, Clone, Default)]
pub struct StaticScene {
    pub planes: Vec<Plane>,
}

impl StaticScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plane(mut self, plane: Plane) -> Self {
        self.planes.push(plane);
        self
    }
}

impl SceneQuery for StaticScene {
    fn sphere_cast(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
        _mask: CollisionMask,
        hits: &mut Vec<ShapeHit>,
    ) {
        hits.clear();
        hits.extend(
            self.planes
                .iter()
                .filter_map(|p| p.sweep(origin, radius, direction, max_distance)),
        );
    }

    fn ray_cast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        _mask: CollisionMask,
    ) -> Option<RayHit> {
        self.planes
            .iter()
            .filter(|p| !p.trigger)
            .filter_map(|p| p.ray(origin, direction, max_distance))
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn ray_cast_against(
        &self,
        shape: Entity,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<RayHit> {
        self.planes
            .iter()
            .filter(|p| p.shape == shape)
            .find_map(|p| p.ray(origin, direction, max_distance))
    }
}
