//! # `msg_locomotion`
//!
//! A third-person rigidbody locomotion core with physics backend abstraction.
//!
//! This crate provides a character controller that:
//! - Probes the ground with a sphere cast refined by rays, including steps
//!   and moving platforms
//! - Floats the body a small distance above the ground with a spring-damper
//! - Follows a target velocity relative to the camera with bounded
//!   acceleration, on the ground and in the air
//! - Tracks status tags (`Grounded`, `Jumping`, `Dashing`, ...) with timing
//!   and change notifications
//! - Supports jump and dash actions with buffering, coyote time and cooldowns
//! - Abstracts the physics backend (Rapier3D included)
//!
//! ## Architecture
//!
//! Every physics tick the backend hands the [`CharacterController`] adapters
//! for its rigid body and for the scene:
//! 1. Button edges from the [`MovementIntent`] are routed to the actions
//! 2. The ground evaluator samples the ground and sets the `Grounded` tag
//! 3. The locomotion state machine switches between grounded and airborne
//! 4. Actions update, the spring holds the ride height, gravity is applied
//! 5. The current state steers the body toward its target velocity
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use msg_locomotion::prelude::*;
//!
//! let config = ControllerConfig::default()
//!     .with_ground_offset(GroundOffsetConfig::default().with_offset(0.1));
//! let controller = CharacterController::new(config);
//! let intent = MovementIntent::default();
//!
//! assert!(!controller.is_grounded());
//! assert!(!intent.is_moving());
//! ```
//!
//! [`CharacterController`]: controller::CharacterController
//! [`MovementIntent`]: intent::MovementIntent

use bevy::prelude::*;

pub mod actions;
pub mod backend;
pub mod collision;
pub mod config;
pub mod controller;
pub mod dash;
pub mod detection;
pub mod error;
pub mod intent;
pub mod jump;
pub mod locomotion;
pub mod math;
pub mod state;
pub mod systems;
pub mod tags;
pub mod timer;

#[cfg(feature = "rapier3d")]
pub mod rapier;

#[cfg(test)]
mod test_support;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::actions::{ActionKind, ActionSet};
    pub use crate::backend::{CharacterBody, CharacterPhysicsBackend, SceneQuery};
    pub use crate::collision::{CollisionMask, CollisionPhase, ContactPoint};
    pub use crate::config::{
        AirMovementConfig, CapsuleShape, ControllerConfig, DashConfig, GroundConfig,
        GroundMovementConfig, GroundOffsetConfig, JumpConfig, RotationConfig,
    };
    pub use crate::controller::CharacterController;
    pub use crate::dash::DashAction;
    pub use crate::detection::GroundSample;
    pub use crate::error::LocomotionError;
    pub use crate::intent::{ButtonState, MovementIntent};
    pub use crate::jump::JumpAction;
    pub use crate::locomotion::LocomotionState;
    pub use crate::state::{Airborne, Grounded};
    pub use crate::systems::TagChanged;
    pub use crate::tags::{StatusTagSet, TagKind};
    pub use crate::{CharacterControllerSet, LocomotionPlugin};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{Rapier3dBackend, Rapier3dCharacterBundle, Unwalkable};
}

/// Phases of the controller's fixed tick, chained in this order.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterControllerSet {
    /// Clear per-tick state left over from the previous tick.
    Preparation,
    /// Run the controller against the physics backend.
    Update,
    /// Hand accumulated forces to the physics engine and publish state.
    FinalApplication,
}

/// Main plugin for the locomotion system.
///
/// This plugin is generic over a physics backend `B` which runs the
/// controller's fixed update with adapters for its rigid bodies and scene
/// queries.
///
/// # Type Parameters
/// - `B`: The physics backend implementation (e.g., `Rapier3dBackend`)
///
/// # Examples
///
/// With Rapier3D backend:
/// ```rust,no_run
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use msg_locomotion::prelude::*;
///
/// App::new()
///     .add_plugins(DefaultPlugins)
///     .add_plugins(RapierPhysicsPlugin::<NoUserData>::default())
///     .add_plugins(LocomotionPlugin::<Rapier3dBackend>::default())
///     .run();
/// ```
pub struct LocomotionPlugin<B: backend::CharacterPhysicsBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::CharacterPhysicsBackend> Default for LocomotionPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::CharacterPhysicsBackend> Plugin for LocomotionPlugin<B> {
    fn build(&self, app: &mut App) {
        // Register core types
        app.register_type::<config::ControllerConfig>();
        app.register_type::<intent::MovementIntent>();
        app.register_type::<intent::ButtonState>();
        app.register_type::<state::Grounded>();
        app.register_type::<state::Airborne>();
        app.register_type::<tags::TagKind>();
        app.register_type::<actions::ActionKind>();
        app.register_type::<collision::CollisionMask>();

        app.add_event::<systems::TagChanged>();

        app.configure_sets(
            FixedUpdate,
            (
                CharacterControllerSet::Preparation,
                CharacterControllerSet::Update,
                CharacterControllerSet::FinalApplication,
            )
                .chain(),
        );

        // Add the physics backend plugin
        app.add_plugins(B::plugin());

        app.add_systems(
            FixedUpdate,
            systems::enable_tag_journal.in_set(CharacterControllerSet::Preparation),
        );
        app.add_systems(
            FixedUpdate,
            (systems::forward_tag_transitions, systems::sync_state_markers)
                .in_set(CharacterControllerSet::FinalApplication),
        );

        // Invulnerability runs on the frame clock, not the physics clock.
        app.add_systems(Update, systems::tick_frame_timers);
    }
}
