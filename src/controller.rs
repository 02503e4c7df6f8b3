//! Character controller orchestration.
//!
//! [`CharacterController`] owns the status tags, the ground evaluator, the
//! locomotion state machine and the actions, and drives them in a fixed
//! order once per physics tick:
//!
//! 1. button edges routed to the actions
//! 2. ground evaluation, `Grounded`/`Falling`/`Sprinting` tags and state
//!    selection, then every action's update
//! 3. ground-offset spring
//! 4. gravity
//! 5. the current locomotion state
//!
//! The body and the scene are borrowed for the duration of the tick only.

use bevy::prelude::*;

use crate::actions::{ActionContext, ActionKind, ActionSet};
use crate::backend::{CharacterBody, SceneQuery};
use crate::collision::{CollisionPhase, ContactPoint};
use crate::config::ControllerConfig;
use crate::dash::DashAction;
use crate::detection::{GroundEvaluator, GroundSample};
use crate::intent::MovementIntent;
use crate::jump::JumpAction;
use crate::locomotion::{LocomotionState, LocomotionStateMachine, MovementContext};
use crate::tags::{StatusTagSet, TagKind};
use crate::timer::CountdownTimer;

/// Rigidbody character controller.
///
/// Add it next to a [`MovementIntent`] on an entity driven by a physics
/// backend; the backend plugin calls [`Self::fixed_update`] every physics tick.
#[derive(Component, Debug)]
#[require(MovementIntent)]
pub struct CharacterController {
    config: ControllerConfig,
    tags: StatusTagSet,
    ground: GroundEvaluator,
    states: LocomotionStateMachine,
    actions: ActionSet,
    invulnerability: CountdownTimer,
    own_shape: Option<Entity>,
}

impl Default for CharacterController {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

impl CharacterController {
    /// Controller with jump and dash tuned from `config`.
    pub fn new(config: ControllerConfig) -> Self {
        let mut actions = ActionSet::new();
        actions.add(JumpAction::new(config.jump));
        actions.add(DashAction::new(config.dash));
        Self::with_actions(config, actions)
    }

    /// Controller with a custom action set.
    pub fn with_actions(config: ControllerConfig, actions: ActionSet) -> Self {
        Self {
            tags: StatusTagSet::new(),
            ground: GroundEvaluator::new(config.ground),
            states: LocomotionStateMachine::new(config.ground_movement, config.air_movement),
            actions,
            invulnerability: CountdownTimer::new(config.invulnerability_time),
            own_shape: None,
            config,
        }
    }

    /// Builder: collider the ground probe must ignore.
    pub fn with_own_shape(mut self, shape: Entity) -> Self {
        self.own_shape = Some(shape);
        self
    }

    pub fn set_own_shape(&mut self, shape: Option<Entity>) {
        self.own_shape = shape;
    }

    pub fn own_shape(&self) -> Option<Entity> {
        self.own_shape
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn tags(&self) -> &StatusTagSet {
        &self.tags
    }

    /// Mutable tag access, for subscribing handlers.
    pub fn tags_mut(&mut self) -> &mut StatusTagSet {
        &mut self.tags
    }

    /// Ground sample of the last tick.
    pub fn ground(&self) -> &GroundSample {
        self.ground.sample()
    }

    /// Gap between the capsule bottom and the ground of the last tick.
    pub fn ground_clearance(&self) -> f32 {
        self.ground.sample().clearance(self.config.capsule.half_height())
    }

    pub fn current_state(&self) -> LocomotionState {
        self.states.current()
    }

    pub fn state_machine(&self) -> &LocomotionStateMachine {
        &self.states
    }

    pub fn actions(&self) -> &ActionSet {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut ActionSet {
        &mut self.actions
    }

    pub fn is_grounded(&self) -> bool {
        self.tags.is_active(TagKind::Grounded)
    }

    pub fn is_falling(&self) -> bool {
        self.tags.is_active(TagKind::Falling)
    }

    pub fn is_jumping(&self) -> bool {
        self.tags.is_active(TagKind::Jumping)
    }

    pub fn is_invulnerable(&self) -> bool {
        self.tags.is_active(TagKind::Invulnerable)
    }

    /// Run one physics tick.
    pub fn fixed_update<B, S>(
        &mut self,
        body: &mut B,
        scene: &S,
        intent: &mut MovementIntent,
        dt: f32,
    ) where
        B: CharacterBody + ?Sized,
        S: SceneQuery + ?Sized,
    {
        let up = self.config.up();
        let half_height = self.config.capsule.half_height();
        let centroid = self.config.capsule.centroid(body.position(), body.rotation());

        self.tags.advance(dt);

        // Button edges arrive between ticks, so they see last tick's ground.
        self.route_buttons(&mut *body, intent, up, dt);

        // Ground
        let found = self
            .ground
            .evaluate(scene, centroid, half_height, up, self.own_shape);
        let grounded = found && !self.tags.is_active(TagKind::Jumping);
        self.tags.set_tag(TagKind::Grounded, grounded);
        // The tag can change outside this tick (reset), so follow it every tick.
        let next = if self.tags.is_active(TagKind::Grounded) {
            LocomotionState::Grounded
        } else {
            LocomotionState::Airborne
        };
        self.states.set_state(next, body);

        let sample = *self.ground.sample();
        let falling = !grounded
            && body.linear_velocity().dot(up) < self.config.falling_speed
            && sample.clearance(half_height) > self.config.ground.grounded_distance;
        self.tags.set_tag(TagKind::Falling, falling);
        self.tags.set_tag(TagKind::Sprinting, intent.is_sprinting());

        // Actions
        let mut ctx = ActionContext {
            body: &mut *body,
            tags: &mut self.tags,
            ground: &sample,
            movement: self.states.movement_vector(),
            gravity: self.config.gravity,
            up,
            dt,
        };
        self.actions.update(&mut ctx);

        if grounded {
            self.apply_ground_offset(body, &sample, half_height, up);
        }

        body.apply_acceleration(self.config.gravity);

        let mut ctx = MovementContext {
            body,
            scene,
            tags: &mut self.tags,
            ground: &sample,
            intent: &*intent,
            centroid,
            up,
            mask: self.config.ground.mask,
            dt,
        };
        self.states.update(&mut ctx);
    }

    /// Advance non-physical timers. Never touches the body.
    pub fn frame_update(&mut self, dt: f32) {
        if self.invulnerability.tick(dt) {
            self.tags.set_tag(TagKind::Invulnerable, false);
        }
    }

    /// Forward a collision of the character's body to the actions.
    ///
    /// `position` is the body position the contacts are measured from.
    pub fn handle_collision(
        &mut self,
        phase: CollisionPhase,
        contacts: &[ContactPoint],
        position: Vec3,
    ) {
        let up = self.config.up();
        self.actions
            .on_collision(&mut self.tags, phase, contacts, position, up);
    }

    /// Turn on `Invulnerable` for `duration` seconds of frame time.
    pub fn make_invulnerable(&mut self, duration: f32) {
        if duration <= 0.0 {
            self.invulnerability.reset();
            self.tags.set_tag(TagKind::Invulnerable, false);
            return;
        }

        self.invulnerability.set_duration(duration);
        self.invulnerability.restart();
        self.tags.set_tag(TagKind::Invulnerable, true);
    }

    /// Start the configured invulnerability window after taking damage.
    /// Returns `false` if the character was already invulnerable.
    pub fn on_damaged(&mut self) -> bool {
        if self.is_invulnerable() {
            return false;
        }
        self.make_invulnerable(self.config.invulnerability_time);
        true
    }

    /// Clear tags, timers and pending actions, keeping subscriptions.
    pub fn reset(&mut self) {
        self.tags.reset();
        self.actions.reset();
        self.invulnerability.reset();
    }

    /// Tear down: reset and drop every tag subscription.
    pub fn dispose(&mut self) {
        self.actions.reset();
        self.invulnerability.reset();
        self.tags.dispose();
    }

    /// Route "performed" edges to `perform` and "cancelled" edges to
    /// `cancel`.
    fn route_buttons<B: CharacterBody + ?Sized>(
        &mut self,
        body: &mut B,
        intent: &mut MovementIntent,
        up: Vec3,
        dt: f32,
    ) {
        let sample = *self.ground.sample();
        let mut ctx = ActionContext {
            body,
            tags: &mut self.tags,
            ground: &sample,
            movement: self.states.movement_vector(),
            gravity: self.config.gravity,
            up,
            dt,
        };
        for (kind, button) in [
            (ActionKind::Jump, &mut intent.jump),
            (ActionKind::Dash, &mut intent.dash),
        ] {
            if button.take_performed() {
                if let Err(err) = self.actions.perform(kind, &mut ctx) {
                    debug!("{err}");
                }
            }
            if button.take_cancelled() {
                if let Err(err) = self.actions.cancel(kind) {
                    debug!("{err}");
                }
            }
        }
    }

    fn apply_ground_offset<B: CharacterBody + ?Sized>(
        &self,
        body: &mut B,
        sample: &GroundSample,
        half_height: f32,
        up: Vec3,
    ) {
        let offset = &self.config.ground_offset;
        let delta = sample.distance - (half_height + offset.offset);
        let relative = body.linear_velocity().dot(up) - sample.point_velocity().dot(up);
        let acceleration = -delta * offset.spring - relative * offset.damper;
        body.apply_acceleration(up * acceleration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JumpConfig;
    use crate::test_support::{Plane, StaticScene, TestBody};

    const DT: f32 = 1.0 / 60.0;

    struct Sim {
        controller: CharacterController,
        body: TestBody,
        scene: StaticScene,
        intent: MovementIntent,
    }

    impl Sim {
        fn new(config: ControllerConfig, height: f32) -> Self {
            let mut body = TestBody::at(Vec3::new(0.0, height, 0.0));
            body.mass = 10.0;
            Self {
                controller: CharacterController::new(config),
                body,
                scene: StaticScene::new().with_plane(Plane::horizontal(0.0)),
                intent: MovementIntent::new(),
            }
        }

        fn tick(&mut self) {
            self.controller
                .fixed_update(&mut self.body, &self.scene, &mut self.intent, DT);
        }

        fn step(&mut self) {
            self.tick();
            self.body.integrate(DT);
        }

        fn assert_state_matches_tag(&self) {
            let grounded_state = self.controller.current_state() == LocomotionState::Grounded;
            assert_eq!(grounded_state, self.controller.is_grounded());
        }
    }

    #[test]
    fn grounded_within_distance() {
        let mut sim = Sim::new(ControllerConfig::default(), 1.14);
        sim.tick();

        assert!(sim.controller.is_grounded());
        assert_eq!(sim.controller.current_state(), LocomotionState::Grounded);
        assert!((sim.controller.ground_clearance() - 0.14).abs() < 1e-3);
    }

    #[test]
    fn too_high_is_airborne() {
        let mut sim = Sim::new(ControllerConfig::default(), 1.5);
        sim.tick();

        assert!(!sim.controller.is_grounded());
        assert_eq!(sim.controller.current_state(), LocomotionState::Airborne);
        // Still knows how far the ground is.
        assert!((sim.controller.ground_clearance() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn free_fall_sets_falling() {
        let mut sim = Sim::new(ControllerConfig::default(), 10.0);
        sim.scene = StaticScene::new();

        sim.step();
        assert!(!sim.controller.is_falling());
        sim.step();
        assert!(sim.controller.is_falling());
        assert_eq!(sim.controller.ground().distance, f32::INFINITY);
    }

    #[test]
    fn spring_settles_near_offset() {
        let mut sim = Sim::new(ControllerConfig::default(), 1.14);
        for _ in 0..300 {
            sim.step();
            sim.assert_state_matches_tag();
        }

        // Offset 0.15 minus the gravity sag g / spring.
        assert!(sim.controller.is_grounded());
        assert!((sim.controller.ground_clearance() - 0.1402).abs() < 0.01);
        let grounded_distance = sim.controller.config().ground.grounded_distance;
        assert!((sim.controller.ground_clearance() - grounded_distance).abs() < 0.02);
        assert!(sim.body.linear_velocity.length() < 0.05);
    }

    #[test]
    fn jump_leaves_and_lands() {
        let config =
            ControllerConfig::default().with_jump(JumpConfig::default().with_launch_speed(2.0));
        let mut sim = Sim::new(config, 1.06);
        for _ in 0..120 {
            sim.step();
        }
        assert!(sim.controller.is_grounded());

        sim.intent.jump.set_pressed(true);
        sim.step();
        assert!(sim.controller.is_jumping());
        sim.intent.jump.set_pressed(false);
        sim.step();
        assert_eq!(sim.controller.current_state(), LocomotionState::Airborne);

        for _ in 0..120 {
            sim.step();
            sim.assert_state_matches_tag();
        }
        assert!(sim.controller.is_grounded());
        assert!(!sim.controller.is_jumping());
        assert_eq!(sim.controller.actions().jump().map(|j| j.jump_count()), Some(1));
    }

    #[test]
    fn reset_while_airborne_reselects_state() {
        let mut sim = Sim::new(ControllerConfig::default(), 1.1);
        sim.tick();
        assert_eq!(sim.controller.current_state(), LocomotionState::Grounded);

        sim.scene = StaticScene::new();
        sim.controller.reset();
        sim.tick();
        sim.assert_state_matches_tag();
        assert_eq!(sim.controller.current_state(), LocomotionState::Airborne);
    }

    #[test]
    fn dispose_while_airborne_reselects_state() {
        let mut sim = Sim::new(ControllerConfig::default(), 1.1);
        sim.tick();

        sim.scene = StaticScene::new();
        sim.controller.dispose();
        sim.tick();
        sim.assert_state_matches_tag();
        assert_eq!(sim.controller.current_state(), LocomotionState::Airborne);
    }

    #[test]
    fn grounded_tag_forced_off_while_jumping() {
        let mut sim = Sim::new(ControllerConfig::default(), 1.1);
        sim.tick();
        assert!(sim.controller.is_grounded());

        sim.controller.tags_mut().set_tag(TagKind::Jumping, true);
        sim.tick();
        assert!(!sim.controller.is_grounded());
        assert_eq!(sim.controller.current_state(), LocomotionState::Airborne);
    }

    #[test]
    fn dash_button_applies_one_impulse_per_cooldown() {
        let mut sim = Sim::new(ControllerConfig::default(), 1.1);
        sim.intent.dash.set_pressed(true);
        sim.tick();
        assert_eq!(sim.body.impulses.len(), 1);
        assert!(sim.controller.tags().is_active(TagKind::Dashing));

        sim.intent.dash.set_pressed(false);
        sim.intent.dash.set_pressed(true);
        sim.tick();
        assert_eq!(sim.body.impulses.len(), 1);
    }

    #[test]
    fn missing_action_is_ignored() {
        let mut sim = Sim::new(ControllerConfig::default(), 1.1);
        sim.controller.actions_mut().remove(ActionKind::Dash);
        sim.intent.dash.set_pressed(true);
        sim.tick();

        assert!(sim.body.impulses.is_empty());
        assert!(!sim.intent.dash.performed);
    }

    #[test]
    fn sprint_button_mirrors_tag() {
        let mut sim = Sim::new(ControllerConfig::default(), 1.1);
        sim.intent.sprint.set_pressed(true);
        sim.tick();
        assert!(sim.controller.tags().is_active(TagKind::Sprinting));

        sim.intent.sprint.set_pressed(false);
        sim.tick();
        assert!(!sim.controller.tags().is_active(TagKind::Sprinting));
    }

    #[test]
    fn ground_offset_spring_pushes_up_when_low() {
        let mut sim = Sim::new(ControllerConfig::default(), 1.05);
        sim.tick();

        // delta = 1.05 - 1.15 = -0.1 -> 100 m/s^2 up on 10 kg, minus gravity.
        assert!((sim.body.force.y - (1000.0 - 98.1)).abs() < 1e-2);
    }

    #[test]
    fn invulnerability_counts_down_in_frame_time() {
        let mut controller = CharacterController::default();
        controller.make_invulnerable(0.5);
        assert!(controller.is_invulnerable());

        controller.frame_update(0.3);
        assert!(controller.is_invulnerable());
        controller.frame_update(0.3);
        assert!(!controller.is_invulnerable());
    }

    #[test]
    fn on_damaged_uses_configured_window() {
        let mut controller =
            CharacterController::new(ControllerConfig::default().with_invulnerability_time(2.0));
        assert!(controller.on_damaged());
        assert!(!controller.on_damaged());

        controller.frame_update(1.5);
        assert!(controller.is_invulnerable());
        controller.frame_update(0.6);
        assert!(!controller.is_invulnerable());
    }

    #[test]
    fn head_bump_through_handle_collision() {
        let mut controller = CharacterController::default();
        controller.tags_mut().set_tag(TagKind::Jumping, true);

        let position = Vec3::new(0.0, 2.0, 0.0);
        let contacts = [ContactPoint::new(position + Vec3::Y * 0.9, Vec3::NEG_Y)];
        controller.handle_collision(CollisionPhase::Enter, &contacts, position);

        assert!(!controller.is_jumping());
    }

    #[test]
    fn dispose_drops_subscriptions() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut controller = CharacterController::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        controller.tags_mut().subscribe_any(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        controller.make_invulnerable(1.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Dispose ends the active tag first, then forgets the handler.
        controller.dispose();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        controller.make_invulnerable(1.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
