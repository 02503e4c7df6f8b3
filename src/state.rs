//! State marker components.
//!
//! These components mirror the current locomotion state of a
//! [`CharacterController`](crate::controller::CharacterController). They are
//! added and removed by [`sync_state_markers`](crate::systems::sync_state_markers)
//! after every physics tick.

use bevy::prelude::*;

/// Marker component indicating the character is in the grounded state.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use msg_locomotion::prelude::*;
///
/// // Grounded is a marker component - just use it in queries
/// fn check_grounded(grounded: Option<&Grounded>) -> bool {
///     grounded.is_some()
/// }
/// ```
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Grounded;

/// Marker component indicating the character is in the airborne state.
///
/// Mutually exclusive with [`Grounded`].
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Airborne;
