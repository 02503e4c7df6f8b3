//! Movement intent component.
//!
//! Intents carry already-decoded input from the player or AI: a 2D movement
//! axis, the camera frame it is relative to, and button phases. The controller
//! reads them every fixed tick.

use bevy::prelude::*;

/// Phase of a single button.
///
/// `performed` and `cancelled` are edges: they latch until the controller
/// consumes them, so a press between two fixed ticks is never lost.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonState {
    /// Whether the button is currently down.
    pub held: bool,
    /// Pressed since the last tick.
    pub performed: bool,
    /// Released since the last tick.
    pub cancelled: bool,
}

impl ButtonState {
    /// Set the held state, recording a performed or cancelled edge when it
    /// changes.
    pub fn set_pressed(&mut self, pressed: bool) {
        if pressed && !self.held {
            self.performed = true;
        } else if !pressed && self.held {
            self.cancelled = true;
        }
        self.held = pressed;
    }

    /// Take the performed edge.
    pub fn take_performed(&mut self) -> bool {
        std::mem::take(&mut self.performed)
    }

    /// Take the cancelled edge.
    pub fn take_cancelled(&mut self) -> bool {
        std::mem::take(&mut self.cancelled)
    }
}

/// Desired movement for a character.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use msg_locomotion::prelude::*;
///
/// let mut intent = MovementIntent::new();
/// intent.set_axis(Vec2::new(0.0, 1.0));
/// assert!(intent.is_moving());
///
/// intent.jump.set_pressed(true);
/// assert!(intent.jump.take_performed());
/// assert!(!intent.jump.take_performed());
/// ```
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct MovementIntent {
    /// Movement axis. `y` is forward, `x` is right. Length at most 1.
    pub axis: Vec2,
    /// Orientation of the camera (or AI view) the axis is relative to.
    pub view_rotation: Quat,
    pub jump: ButtonState,
    pub dash: ButtonState,
    pub sprint: ButtonState,
    /// Passed through for game logic; locomotion does not use it.
    pub interact: ButtonState,
}

impl MovementIntent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the movement axis, clamping its length to 1.
    pub fn set_axis(&mut self, axis: Vec2) {
        self.axis = axis.clamp_length_max(1.0);
    }

    /// Clear the movement axis.
    pub fn clear_axis(&mut self) {
        self.axis = Vec2::ZERO;
    }

    /// Set the view frame the axis is relative to.
    pub fn set_view_rotation(&mut self, rotation: Quat) {
        self.view_rotation = rotation;
    }

    /// Check if there is active movement input.
    pub fn is_moving(&self) -> bool {
        self.axis.length_squared() > 0.001 * 0.001
    }

    /// Whether sprint is held.
    pub fn is_sprinting(&self) -> bool {
        self.sprint.held
    }

    /// Horizontal world direction of the axis in the view frame, unit length
    /// or zero.
    pub fn view_direction(&self) -> Vec3 {
        let local = Vec3::new(self.axis.x, 0.0, -self.axis.y);
        let world = self.view_rotation * local;
        Vec3::new(world.x, 0.0, world.z).normalize_or_zero()
    }

    /// View-relative movement vector on the horizontal plane, scaled by the
    /// axis magnitude.
    pub fn movement_vector(&self) -> Vec3 {
        self.view_direction() * self.axis.length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn intent_new() {
        let intent = MovementIntent::new();
        assert_eq!(intent.axis, Vec2::ZERO);
        assert_eq!(intent.view_rotation, Quat::IDENTITY);
        assert!(!intent.is_moving());
        assert_eq!(intent.movement_vector(), Vec3::ZERO);
    }

    #[test]
    fn axis_is_clamped() {
        let mut intent = MovementIntent::new();
        intent.set_axis(Vec2::new(3.0, 4.0));
        assert!((intent.axis.length() - 1.0).abs() < 1e-6);

        intent.set_axis(Vec2::new(0.0001, 0.0));
        assert!(!intent.is_moving());
    }

    #[test]
    fn forward_axis_follows_view() {
        let mut intent = MovementIntent::new();
        intent.set_axis(Vec2::new(0.0, 0.5));
        assert!((intent.movement_vector() - Vec3::new(0.0, 0.0, -0.5)).length() < 1e-6);

        // A quarter turn about +Y takes -Z to -X.
        intent.set_view_rotation(Quat::from_rotation_y(FRAC_PI_2));
        assert!((intent.movement_vector() - Vec3::new(-0.5, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn pitched_view_stays_horizontal() {
        let mut intent = MovementIntent::new();
        intent.set_axis(Vec2::new(0.0, 1.0));
        intent.set_view_rotation(Quat::from_rotation_x(-0.6));

        let movement = intent.movement_vector();
        assert_eq!(movement.y, 0.0);
        assert!((movement.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn button_edges_latch_until_taken() {
        let mut button = ButtonState::default();
        button.set_pressed(true);
        button.set_pressed(true);
        assert!(button.held);
        assert!(button.take_performed());
        assert!(!button.take_performed());

        button.set_pressed(false);
        assert!(!button.held);
        assert!(button.take_cancelled());
        assert!(!button.take_cancelled());
    }

    #[test]
    fn tap_between_ticks_keeps_both_edges() {
        let mut button = ButtonState::default();
        button.set_pressed(true);
        button.set_pressed(false);
        assert!(button.take_performed());
        assert!(button.take_cancelled());
    }
}
