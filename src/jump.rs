//! Jump action.
//!
//! A jump is allowed while grounded or within the coyote window after leaving
//! the ground. Requests that arrive too early are buffered and retried every
//! tick until the buffer runs out. Once airborne the jump lasts until the
//! ascent timer (time to apex) runs out, the character starts falling, lands,
//! or bumps its head.

use bevy::prelude::*;

use crate::actions::ActionContext;
use crate::backend::CharacterBody;
use crate::collision::{CollisionPhase, ContactPoint};
use crate::config::JumpConfig;
use crate::math::{flatten, normalize_xz};
use crate::tags::{StatusTagSet, TagKind};
use crate::timer::CountdownTimer;

#[derive(Debug)]
pub struct JumpAction {
    pub config: JumpConfig,
    buffer: CountdownTimer,
    ascent: CountdownTimer,
    jumps: u32,
}

impl Default for JumpAction {
    fn default() -> Self {
        Self::new(JumpConfig::default())
    }
}

impl JumpAction {
    pub fn new(config: JumpConfig) -> Self {
        Self {
            buffer: CountdownTimer::new(config.buffer_time),
            ascent: CountdownTimer::new(0.0),
            config,
            jumps: 0,
        }
    }

    /// Number of jumps executed so far.
    pub fn jump_count(&self) -> u32 {
        self.jumps
    }

    /// Whether an early request is waiting to be retried.
    pub fn is_buffered(&self) -> bool {
        self.buffer.is_running()
    }

    /// Seconds until the ascent ends.
    pub fn ascent_remaining(&self) -> f32 {
        self.ascent.remaining()
    }

    /// Not already jumping, and grounded or inside the coyote window.
    pub fn can_perform(&self, tags: &StatusTagSet) -> bool {
        if tags.is_active(TagKind::Jumping) {
            return false;
        }
        let grounded = tags.get_tag(TagKind::Grounded);
        grounded.active || grounded.elapsed < self.config.coyote_time
    }

    /// Jump now if allowed, otherwise buffer the request. Returns `true` if
    /// the jump was executed.
    pub fn perform<B: CharacterBody + ?Sized>(&mut self, ctx: &mut ActionContext<'_, B>) -> bool {
        if self.can_perform(ctx.tags) {
            self.jump(ctx);
            return true;
        }

        self.buffer.set_duration(self.config.buffer_time);
        self.buffer.restart();
        debug!("jump buffered for {}s", self.config.buffer_time);
        false
    }

    /// Releasing the button does not cut the jump short.
    pub fn cancel(&mut self) {}

    pub fn update<B: CharacterBody + ?Sized>(&mut self, ctx: &mut ActionContext<'_, B>) {
        if !ctx.tags.is_active(TagKind::Jumping) {
            if !self.buffer.is_running() {
                return;
            }
            if self.can_perform(ctx.tags) {
                self.jump(ctx);
            } else if self.buffer.tick(ctx.dt) {
                debug!("buffered jump expired");
            }
            return;
        }

        self.ascent.tick(ctx.dt);

        // Ride a rising platform without adding momentum.
        let rise = ctx.ground.velocity().dot(ctx.up).max(0.0);
        if rise > 0.0 {
            let position = ctx.body.position();
            ctx.body.move_position(position + ctx.up * rise * ctx.dt);
        }

        let jumping = !ctx.tags.is_active(TagKind::Grounded)
            && !ctx.tags.is_active(TagKind::Falling)
            && self.ascent.is_running();
        ctx.tags.set_tag(TagKind::Jumping, jumping);
    }

    /// End the jump on a contact roughly straight above the character.
    pub fn on_collision(
        &mut self,
        tags: &mut StatusTagSet,
        phase: CollisionPhase,
        contacts: &[ContactPoint],
        position: Vec3,
        up: Vec3,
    ) {
        if phase == CollisionPhase::Exit || !tags.is_active(TagKind::Jumping) {
            return;
        }

        let threshold = self.config.head_bump_threshold;
        let bumped = contacts.iter().any(|contact| {
            (contact.point - position).normalize_or_zero().dot(up) >= threshold
        });
        if bumped {
            debug!("head bump, ending jump");
            tags.set_tag(TagKind::Jumping, false);
        }
    }

    /// Drop any buffered request and stop the ascent.
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.ascent.reset();
    }

    fn jump<B: CharacterBody + ?Sized>(&mut self, ctx: &mut ActionContext<'_, B>) {
        let up = ctx.up;
        let velocity = ctx.body.linear_velocity();
        let ground_velocity = ctx.ground.point_velocity();

        let mut jump_velocity = velocity - up * velocity.dot(up) + up * self.config.launch_speed;

        // Leaving a moving platform against its motion: shed its drift.
        let opposing = ctx.movement.dot(normalize_xz(ground_velocity));
        if opposing < 0.0 {
            jump_velocity += flatten(ground_velocity) * opposing;
        }

        let queued = ctx.body.accumulated_force().dot(up);
        ctx.body.apply_force(-queued * up);
        ctx.body.apply_velocity_change(jump_velocity - velocity);

        let gravity = ctx.gravity.length();
        let ascent = if gravity > 0.0 {
            self.config.launch_speed / gravity
        } else {
            0.0
        };
        self.ascent.set_duration(ascent);
        self.ascent.restart();
        self.buffer.reset();
        self.jumps += 1;

        ctx.tags.set_tag(TagKind::Jumping, true);
        debug!("jump, ascent {ascent:.3}s");
    }
}
