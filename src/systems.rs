//! Backend-independent controller systems.
//!
//! The physics tick itself is driven by the backend plugin, which owns the
//! body and scene adapters. The systems here only mirror controller state into
//! the ECS and advance the frame-rate timers.

use bevy::prelude::*;

use crate::controller::CharacterController;
use crate::locomotion::LocomotionState;
use crate::state::{Airborne, Grounded};
use crate::tags::{TagEvent, TagKind};

/// A status tag of a character changed value.
///
/// Mirrors the `Changed` notifications of the controller's tag set for ECS
/// consumers such as animation and UI.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct TagChanged {
    pub entity: Entity,
    pub kind: TagKind,
    pub active: bool,
    /// Seconds the tag spent in its previous state.
    pub elapsed: f32,
}

impl TagChanged {
    fn new(entity: Entity, event: &TagEvent) -> Self {
        Self {
            entity,
            kind: event.kind,
            active: event.active,
            elapsed: event.elapsed,
        }
    }
}

/// Start recording tag transitions on newly added controllers.
pub fn enable_tag_journal(mut q: Query<&mut CharacterController, Added<CharacterController>>) {
    for mut controller in &mut q {
        controller.tags_mut().record_transitions(true);
    }
}

/// Send the tag transitions recorded during the tick as [`TagChanged`] events.
pub fn forward_tag_transitions(
    mut q: Query<(Entity, &mut CharacterController)>,
    mut events: EventWriter<TagChanged>,
) {
    for (entity, mut controller) in &mut q {
        let transitions = controller.tags_mut().drain_transitions();
        events.write_batch(transitions.iter().map(|t| TagChanged::new(entity, t)));
    }
}

/// Add or remove [`Grounded`]/[`Airborne`] to match the current locomotion
/// state.
pub fn sync_state_markers(
    mut commands: Commands,
    q: Query<(Entity, &CharacterController, Has<Grounded>, Has<Airborne>)>,
) {
    for (entity, controller, has_grounded, has_airborne) in &q {
        if !controller.state_machine().is_started() {
            continue;
        }

        let grounded = controller.current_state() == LocomotionState::Grounded;
        if grounded && !has_grounded {
            commands.entity(entity).insert(Grounded).remove::<Airborne>();
        } else if !grounded && !has_airborne {
            commands.entity(entity).insert(Airborne).remove::<Grounded>();
        }
    }
}

/// Advance frame-rate timers (invulnerability).
pub fn tick_frame_timers(time: Res<Time>, mut q: Query<&mut CharacterController>) {
    let dt = time.delta_secs();
    if dt <= 0.0 {
        return;
    }
    for mut controller in &mut q {
        controller.frame_update(dt);
    }
}
