//! Scene query results and contact data.
//!
//! These are the plain values that cross the physics boundary: sphere-cast
//! and ray hits coming out of a [`SceneQuery`](crate::backend::SceneQuery),
//! and contact points delivered with collision events.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Layer mask used to filter scene queries.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollisionMask(pub u32);

impl Default for CollisionMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl CollisionMask {
    pub const ALL: Self = Self(u32::MAX);
    pub const NONE: Self = Self(0);

    /// Whether any of the given layer bits are in this mask.
    #[inline]
    pub fn contains(self, layers: u32) -> bool {
        self.0 & layers != 0
    }
}

/// Motion of the body a surface belongs to, sampled when the query ran.
///
/// Static geometry reports zero motion.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SurfaceMotion {
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    /// Point the body rotates about (its center of mass).
    pub pivot: Vec3,
}

impl SurfaceMotion {
    /// Motion of a body that is not moving.
    pub const STATIC: Self = Self {
        linear_velocity: Vec3::ZERO,
        angular_velocity: Vec3::ZERO,
        pivot: Vec3::ZERO,
    };

    /// Velocity of a point rigidly attached to the body, including the
    /// rotational contribution.
    #[inline]
    pub fn point_velocity(&self, point: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(point - self.pivot)
    }
}

/// One hit of a swept sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeHit {
    /// World position of the contact on the hit surface.
    pub point: Vec3,
    /// Surface normal at the hit point.
    pub normal: Vec3,
    /// Distance travelled by the sphere before touching the surface.
    pub distance: f32,
    /// The collider that was hit.
    pub shape: Entity,
    /// The rigid body the collider is attached to, if any.
    pub body: Option<Entity>,
    /// Whether the collider is a trigger volume.
    pub is_trigger: bool,
    /// `false` for geometry marked as unwalkable.
    pub walkable: bool,
    pub motion: SurfaceMotion,
}

impl ShapeHit {
    /// A walkable, static, non-trigger hit.
    pub fn new(point: Vec3, normal: Vec3, distance: f32, shape: Entity) -> Self {
        Self {
            point,
            normal,
            distance,
            shape,
            body: None,
            is_trigger: false,
            walkable: true,
            motion: SurfaceMotion::STATIC,
        }
    }

    /// Builder: attach the supporting body and its motion.
    pub fn with_body(mut self, body: Entity, motion: SurfaceMotion) -> Self {
        self.body = Some(body);
        self.motion = motion;
        self
    }

    /// Builder: mark as trigger volume.
    pub fn as_trigger(mut self) -> Self {
        self.is_trigger = true;
        self
    }

    /// Builder: mark as unwalkable.
    pub fn unwalkable(mut self) -> Self {
        self.walkable = false;
        self
    }
}

/// Result of a single ray cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    pub shape: Entity,
}

impl RayHit {
    pub fn new(point: Vec3, normal: Vec3, distance: f32, shape: Entity) -> Self {
        Self {
            point,
            normal,
            distance,
            shape,
        }
    }
}

/// Which part of a collision's lifetime an event reports.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionPhase {
    Enter,
    Stay,
    Exit,
}

/// A contact point of a collision involving the character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub point: Vec3,
    pub normal: Vec3,
}

impl ContactPoint {
    pub fn new(point: Vec3, normal: Vec3) -> Self {
        Self { point, normal }
    }
}
