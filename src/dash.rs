//! Dash action.

use bevy::prelude::*;

use crate::actions::ActionContext;
use crate::backend::CharacterBody;
use crate::config::DashConfig;
use crate::math::is_near_zero;
use crate::tags::{StatusTagSet, TagKind};
use crate::timer::CountdownTimer;

/// Movement vectors shorter than this fall back to dashing backwards.
const DIRECTION_TOLERANCE: f32 = 0.01;

/// Instant burst of velocity gated by a cooldown.
///
/// The cooldown doubles as the dash duration: `Dashing` stays on until it
/// runs out.
#[derive(Debug)]
pub struct DashAction {
    pub config: DashConfig,
    cooldown: CountdownTimer,
}

impl Default for DashAction {
    fn default() -> Self {
        Self::new(DashConfig::default())
    }
}

impl DashAction {
    pub fn new(config: DashConfig) -> Self {
        Self {
            cooldown: CountdownTimer::new(config.cooldown),
            config,
        }
    }

    pub fn can_perform(&self) -> bool {
        !self.cooldown.is_running()
    }

    /// Seconds left on the cooldown.
    pub fn cooldown_remaining(&self) -> f32 {
        if self.cooldown.is_running() {
            self.cooldown.remaining()
        } else {
            0.0
        }
    }

    /// Dash along the current movement vector, or backwards when standing
    /// still. Does nothing while cooling down.
    pub fn perform<B: CharacterBody + ?Sized>(&mut self, ctx: &mut ActionContext<'_, B>) -> bool {
        if !self.can_perform() {
            return false;
        }

        let force = if ctx.tags.is_active(TagKind::Grounded) {
            self.config.ground_force
        } else {
            self.config.air_force
        };

        let direction = if is_near_zero(ctx.movement, DIRECTION_TOLERANCE) {
            -ctx.body.forward()
        } else {
            ctx.movement
        };

        let velocity = ctx.body.linear_velocity();
        ctx.body.apply_velocity_change(direction * force - velocity);
        ctx.tags.set_tag(TagKind::Dashing, true);

        self.cooldown.set_duration(self.config.cooldown);
        self.cooldown.restart();
        debug!("dash {direction:?} x {force}");
        true
    }

    pub fn cancel(&mut self) {}

    pub fn update(&mut self, tags: &mut StatusTagSet, dt: f32) {
        if !tags.is_active(TagKind::Dashing) {
            return;
        }

        self.cooldown.tick(dt);
        if !self.cooldown.is_running() {
            tags.set_tag(TagKind::Dashing, false);
        }
    }

    pub fn reset(&mut self) {
        self.cooldown.reset();
    }
}
