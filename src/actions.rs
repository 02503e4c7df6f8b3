//! Character actions.
//!
//! Actions are a closed set dispatched through [`Action`]. They coordinate
//! with movement and with each other only through the status tags.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backend::CharacterBody;
use crate::collision::{CollisionPhase, ContactPoint};
use crate::dash::DashAction;
use crate::detection::GroundSample;
use crate::error::LocomotionError;
use crate::jump::JumpAction;
use crate::tags::StatusTagSet;

/// Identifies an action in an [`ActionSet`].
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Jump,
    Dash,
}

/// What an action may read and drive during a tick.
pub struct ActionContext<'a, B: ?Sized> {
    pub body: &'a mut B,
    pub tags: &'a mut StatusTagSet,
    pub ground: &'a GroundSample,
    /// Movement vector of the current locomotion state.
    pub movement: Vec3,
    pub gravity: Vec3,
    pub up: Vec3,
    pub dt: f32,
}

#[derive(Debug)]
pub enum Action {
    Jump(JumpAction),
    Dash(DashAction),
}

impl From<JumpAction> for Action {
    fn from(action: JumpAction) -> Self {
        Action::Jump(action)
    }
}

impl From<DashAction> for Action {
    fn from(action: DashAction) -> Self {
        Action::Dash(action)
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Jump(_) => ActionKind::Jump,
            Action::Dash(_) => ActionKind::Dash,
        }
    }

    pub fn can_perform(&self, tags: &StatusTagSet) -> bool {
        match self {
            Action::Jump(jump) => jump.can_perform(tags),
            Action::Dash(dash) => dash.can_perform(),
        }
    }

    /// Returns `true` if the action ran right away.
    pub fn perform<B: CharacterBody + ?Sized>(&mut self, ctx: &mut ActionContext<'_, B>) -> bool {
        match self {
            Action::Jump(jump) => jump.perform(ctx),
            Action::Dash(dash) => dash.perform(ctx),
        }
    }

    pub fn cancel(&mut self) {
        match self {
            Action::Jump(jump) => jump.cancel(),
            Action::Dash(dash) => dash.cancel(),
        }
    }

    pub fn update<B: CharacterBody + ?Sized>(&mut self, ctx: &mut ActionContext<'_, B>) {
        match self {
            Action::Jump(jump) => jump.update(ctx),
            Action::Dash(dash) => dash.update(ctx.tags, ctx.dt),
        }
    }

    pub fn on_collision(
        &mut self,
        tags: &mut StatusTagSet,
        phase: CollisionPhase,
        contacts: &[ContactPoint],
        position: Vec3,
        up: Vec3,
    ) {
        if let Action::Jump(jump) = self {
            jump.on_collision(tags, phase, contacts, position, up);
        }
    }

    pub fn reset(&mut self) {
        match self {
            Action::Jump(jump) => jump.reset(),
            Action::Dash(dash) => dash.reset(),
        }
    }
}

/// Ordered actions of a character, at most one per kind.
#[derive(Debug, Default)]
pub struct ActionSet {
    actions: Vec<Action>,
}

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump and dash with default tuning.
    pub fn standard() -> Self {
        let mut set = Self::new();
        set.add(JumpAction::default());
        set.add(DashAction::default());
        set
    }

    /// Add an action, replacing one of the same kind. Returns the replaced
    /// action.
    pub fn add(&mut self, action: impl Into<Action>) -> Option<Action> {
        let action = action.into();
        match self.actions.iter().position(|a| a.kind() == action.kind()) {
            Some(index) => {
                warn!("replacing existing {:?} action", action.kind());
                Some(std::mem::replace(&mut self.actions[index], action))
            }
            None => {
                self.actions.push(action);
                None
            }
        }
    }

    /// Remove an action, resetting it.
    pub fn remove(&mut self, kind: ActionKind) -> Option<Action> {
        let index = self.actions.iter().position(|a| a.kind() == kind)?;
        let mut action = self.actions.remove(index);
        action.reset();
        Some(action)
    }

    pub fn get(&self, kind: ActionKind) -> Option<&Action> {
        self.actions.iter().find(|a| a.kind() == kind)
    }

    pub fn get_mut(&mut self, kind: ActionKind) -> Option<&mut Action> {
        self.actions.iter_mut().find(|a| a.kind() == kind)
    }

    pub fn jump(&self) -> Option<&JumpAction> {
        self.actions.iter().find_map(|a| match a {
            Action::Jump(jump) => Some(jump),
            _ => None,
        })
    }

    pub fn dash(&self) -> Option<&DashAction> {
        self.actions.iter().find_map(|a| match a {
            Action::Dash(dash) => Some(dash),
            _ => None,
        })
    }

    pub fn contains(&self, kind: ActionKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    /// Perform the action of `kind`. `Ok(false)` means it was refused or
    /// buffered.
    pub fn perform<B: CharacterBody + ?Sized>(
        &mut self,
        kind: ActionKind,
        ctx: &mut ActionContext<'_, B>,
    ) -> Result<bool, LocomotionError> {
        let action = self
            .get_mut(kind)
            .ok_or(LocomotionError::MissingAction(kind))?;
        Ok(action.perform(ctx))
    }

    pub fn cancel(&mut self, kind: ActionKind) -> Result<(), LocomotionError> {
        let action = self
            .get_mut(kind)
            .ok_or(LocomotionError::MissingAction(kind))?;
        action.cancel();
        Ok(())
    }

    /// Update every action in insertion order.
    pub fn update<B: CharacterBody + ?Sized>(&mut self, ctx: &mut ActionContext<'_, B>) {
        for action in &mut self.actions {
            action.update(ctx);
        }
    }

    /// Forward a collision to every action.
    pub fn on_collision(
        &mut self,
        tags: &mut StatusTagSet,
        phase: CollisionPhase,
        contacts: &[ContactPoint],
        position: Vec3,
        up: Vec3,
    ) {
        for action in &mut self.actions {
            action.on_collision(tags, phase, contacts, position, up);
        }
    }

    pub fn reset(&mut self) {
        for action in &mut self.actions {
            action.reset();
        }
    }
}
