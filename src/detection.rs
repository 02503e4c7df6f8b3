//! Ground detection.
//!
//! [`GroundEvaluator`] sweeps a sphere down from the capsule centroid and
//! re-probes every surface it touches with up to three rays aimed at that
//! surface alone. The closest probe point that is flat enough and low enough
//! to stand on becomes the tick's [`GroundSample`].

use std::f32::consts::PI;

use bevy::prelude::*;

use crate::backend::SceneQuery;
use crate::collision::{RayHit, ShapeHit, SurfaceMotion};
use crate::config::GroundConfig;
use crate::math::{angle_between, approximately, rotate_about};

/// Max number of sphere-cast hits considered per evaluation.
pub const GROUND_HIT_COUNT: usize = 12;

/// Tilt applied to the second and third probe rays (3 degrees).
const PROBE_TILT: f32 = PI / 60.0;
/// Length multiplier of the tilted probes.
const PROBE_SCALE: f32 = 1.5;
/// Extra length added to every probe ray.
const PROBE_MARGIN: f32 = 0.01;

/// The best supporting surface found beneath the character, or the "no
/// ground" sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundSample {
    /// Ground point on the surface the character stands on.
    pub point: Vec3,
    /// Normal of the probe ray hit. Up when there is no ground.
    pub normal: Vec3,
    /// Normal reported by the sphere cast. Up when there is no ground.
    pub interpolated_normal: Vec3,
    /// Normalized sum of the normals of every usable sphere-cast hit.
    pub aggregate_normal: Vec3,
    /// Vertical distance from the capsule centroid to `point`.
    /// `f32::INFINITY` when there is no ground.
    pub distance: f32,
    /// Angle between the ground normal and up, in radians.
    pub angle: f32,
    /// Collider the sample belongs to.
    pub shape: Option<Entity>,
    /// Rigid body carrying that collider.
    pub body: Option<Entity>,
    pub motion: SurfaceMotion,
}

impl Default for GroundSample {
    fn default() -> Self {
        Self::NONE
    }
}

impl GroundSample {
    /// No ground.
    pub const NONE: Self = Self {
        point: Vec3::ZERO,
        normal: Vec3::Y,
        interpolated_normal: Vec3::Y,
        aggregate_normal: Vec3::Y,
        distance: f32::INFINITY,
        angle: 0.0,
        shape: None,
        body: None,
        motion: SurfaceMotion::STATIC,
    };

    /// Whether any surface was recorded, grounded or not.
    #[inline]
    pub fn has_ground(&self) -> bool {
        self.shape.is_some()
    }

    /// Gap between the capsule bottom and the ground.
    #[inline]
    pub fn clearance(&self, half_height: f32) -> f32 {
        self.distance - half_height
    }

    /// Whether `shape` is the ground collider.
    #[inline]
    pub fn is_support(&self, shape: Entity) -> bool {
        self.shape == Some(shape)
    }

    /// Linear velocity of the supporting body.
    #[inline]
    pub fn velocity(&self) -> Vec3 {
        self.motion.linear_velocity
    }

    /// Angular velocity of the supporting body.
    #[inline]
    pub fn angular_velocity(&self) -> Vec3 {
        self.motion.angular_velocity
    }

    /// Velocity of the ground at the contact point.
    #[inline]
    pub fn point_velocity(&self) -> Vec3 {
        if self.has_ground() {
            self.motion.point_velocity(self.point)
        } else {
            Vec3::ZERO
        }
    }

    fn record(&mut self, hit: &ShapeHit, normal: Vec3, distance: f32, angle: f32) {
        self.point = hit.point;
        self.normal = normal;
        self.interpolated_normal = hit.normal;
        self.distance = distance;
        self.angle = angle;
        self.shape = Some(hit.shape);
        self.body = hit.body;
        self.motion = hit.motion;
    }
}

#[derive(Debug, Clone, Copy)]
struct Selection {
    grounded: bool,
    smallest_distance: f32,
    smallest_angle: f32,
}

#[derive(Debug, Clone, Copy)]
struct Probe {
    hit: RayHit,
    angle: f32,
    height: f32,
}

/// Per-tick ground probing.
#[derive(Debug, Clone)]
pub struct GroundEvaluator {
    pub config: GroundConfig,
    hits: Vec<ShapeHit>,
    sample: GroundSample,
}

impl Default for GroundEvaluator {
    fn default() -> Self {
        Self::new(GroundConfig::default())
    }
}

impl GroundEvaluator {
    pub fn new(config: GroundConfig) -> Self {
        Self {
            config,
            hits: Vec::with_capacity(GROUND_HIT_COUNT),
            sample: GroundSample::NONE,
        }
    }

    /// The sample produced by the last evaluation.
    pub fn sample(&self) -> &GroundSample {
        &self.sample
    }

    /// Probe for ground below `centroid`.
    ///
    /// Returns `true` if a grounded candidate was found. When it returns
    /// `false` the sample may still describe the closest surface below, so the
    /// distance to ground stays meaningful while airborne.
    pub fn evaluate<S: SceneQuery + ?Sized>(
        &mut self,
        scene: &S,
        centroid: Vec3,
        half_height: f32,
        up: Vec3,
        own_shape: Option<Entity>,
    ) -> bool {
        self.sample = GroundSample::NONE;

        let mut selection = Selection {
            grounded: false,
            smallest_distance: f32::MAX,
            smallest_angle: f32::MAX,
        };
        let mut normal_sum = Vec3::ZERO;

        let radius = self.config.raycast_radius;
        let mut hits = std::mem::take(&mut self.hits);
        scene.sphere_cast(
            centroid + up * radius,
            radius,
            -up,
            self.config.raycast_distance,
            self.config.mask,
            &mut hits,
        );
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(GROUND_HIT_COUNT);

        for hit in &hits {
            if hit.is_trigger || !hit.walkable || Some(hit.shape) == own_shape {
                continue;
            }

            normal_sum += hit.normal;

            let direction = hit.point - centroid;
            let axis = up.cross(direction);
            let tilted = rotate_about(direction, axis, PROBE_TILT) * PROBE_SCALE;
            let mirrored = rotate_about(tilted, axis, -2.0 * PROBE_TILT);

            let mut last_angle = PI / 2.0;
            let mut accepted = false;
            for probe_direction in [direction, tilted, mirrored] {
                let probe = self.probe(scene, hit.shape, centroid, probe_direction, up);
                last_angle = probe.map_or(PI / 2.0, |p| p.angle);
                let Some(probe) = probe else {
                    continue;
                };
                if !self.is_grounded_height(probe.height, half_height) {
                    continue;
                }
                if self.select(&mut selection, hit, &probe) {
                    accepted = true;
                    break;
                }
            }

            if !accepted && !selection.grounded && !self.sample.has_ground() {
                let height = (centroid - hit.point).dot(up);
                self.sample.record(hit, hit.normal, height, last_angle);
            }
        }

        self.hits = hits;
        self.sample.aggregate_normal = normal_sum.try_normalize().unwrap_or(up);
        selection.grounded
    }

    /// Ray probe against a single collider. `None` if it misses or lands on a
    /// surface steeper than the max ground angle.
    fn probe<S: SceneQuery + ?Sized>(
        &self,
        scene: &S,
        shape: Entity,
        origin: Vec3,
        direction: Vec3,
        up: Vec3,
    ) -> Option<Probe> {
        let length = direction.length();
        let dir = direction.try_normalize()?;
        let hit = scene.ray_cast_against(shape, origin, dir, length + PROBE_MARGIN)?;
        let angle = angle_between(hit.normal, up);
        if angle > self.config.max_ground_angle {
            return None;
        }
        Some(Probe {
            hit,
            angle,
            height: (origin - hit.point).dot(up),
        })
    }

    /// Height checks applied to a landed probe: not above the centroid, no
    /// higher above the capsule bottom than a step, and within grounded
    /// distance of the capsule bottom.
    fn is_grounded_height(&self, height: f32, half_height: f32) -> bool {
        if height < 0.0 {
            return false;
        }
        if height - half_height < -self.config.max_step_height {
            return false;
        }
        height < self.config.grounded_distance + half_height
    }

    /// Keep the closest candidate. On a distance tie the steeper one loses.
    fn select(&mut self, selection: &mut Selection, hit: &ShapeHit, probe: &Probe) -> bool {
        if probe.height >= selection.smallest_distance {
            return false;
        }
        if approximately(probe.height, selection.smallest_distance)
            && probe.angle > selection.smallest_angle
        {
            return false;
        }

        selection.smallest_distance = probe.height;
        selection.smallest_angle = probe.angle;
        selection.grounded = true;
        self.sample.record(hit, probe.hit.normal, probe.height, probe.angle);
        true
    }
}
