//! Status tags.
//!
//! A [`StatusTagSet`] is a table of named boolean conditions (grounded,
//! jumping, dashing, ...) that movement, actions and read-only consumers such
//! as animation use to coordinate. Each tag remembers when it last changed so
//! callers can ask "how long since we left the ground?" while the tag is off.
//!
//! Transitions are published to subscribers keyed by tag kind and event type.
//! Handlers run in subscription order and a failing or panicking handler does
//! not stop the ones after it.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{HandlerError, LocomotionError};

/// The conditions a character can be in.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagKind {
    Moving,
    Grounded,
    Falling,
    Jumping,
    Sprinting,
    Aiming,
    Dashing,
    Gliding,
    Invulnerable,
}

impl TagKind {
    /// Every tag kind, in declaration order.
    pub const ALL: [TagKind; 9] = [
        TagKind::Moving,
        TagKind::Grounded,
        TagKind::Falling,
        TagKind::Jumping,
        TagKind::Sprinting,
        TagKind::Aiming,
        TagKind::Dashing,
        TagKind::Gliding,
        TagKind::Invulnerable,
    ];

    /// Bit used for this kind in [`StatusTagSet::as_flags`].
    #[inline]
    pub fn bit(self) -> u32 {
        1 << self as u32
    }
}

/// Which side of a transition a handler listens to.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagEventKind {
    /// The tag went from inactive to active.
    Began,
    /// The tag went from active to inactive.
    Ended,
    /// The tag changed value in either direction. Fires after `Began`/`Ended`.
    Changed,
}

/// Payload handed to tag handlers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagEvent {
    pub kind: TagKind,
    pub event: TagEventKind,
    /// The new value of the tag.
    pub active: bool,
    /// Seconds the tag spent in its previous state.
    pub elapsed: f32,
}

/// A single tag record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusTag {
    pub kind: TagKind,
    pub active: bool,
    /// Clock time of the last transition. `-inf` if it never changed.
    pub last_transition_time: f32,
}

/// Read-only view of a tag returned by [`StatusTagSet::get_tag`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagSnapshot {
    pub active: bool,
    /// Seconds since the last transition, `f32::INFINITY` if it never changed.
    pub elapsed: f32,
}

/// Handle returned by the subscribe methods, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Boxed tag handler.
pub type TagHandler = Box<dyn FnMut(&TagEvent) -> Result<(), HandlerError> + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    event: TagEventKind,
    handler: TagHandler,
}

struct TagEntry {
    tag: StatusTag,
    subscribers: Vec<Subscription>,
}

impl TagEntry {
    fn new(kind: TagKind) -> Self {
        Self {
            tag: StatusTag {
                kind,
                active: false,
                last_transition_time: f32::NEG_INFINITY,
            },
            subscribers: Vec::new(),
        }
    }
}

/// Table of status tags with transition tracking and notifications.
#[derive(Default)]
pub struct StatusTagSet {
    clock: f32,
    tags: HashMap<TagKind, TagEntry>,
    any_subscribers: Vec<(SubscriptionId, TagHandler)>,
    next_id: u64,
    journal: Option<Vec<TagEvent>>,
}

impl std::fmt::Debug for StatusTagSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut active: Vec<TagKind> = self
            .tags
            .values()
            .filter(|e| e.tag.active)
            .map(|e| e.tag.kind)
            .collect();
        active.sort_by_key(|k| *k as u32);
        f.debug_struct("StatusTagSet")
            .field("clock", &self.clock)
            .field("active", &active)
            .finish()
    }
}

impl StatusTagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current clock time in seconds.
    pub fn clock(&self) -> f32 {
        self.clock
    }

    /// Advance the clock used for elapsed-time tracking.
    pub fn advance(&mut self, dt: f32) {
        self.clock += dt.max(0.0);
    }

    /// Whether the tag is currently active. Unknown tags are inactive.
    pub fn is_active(&self, kind: TagKind) -> bool {
        self.tags.get(&kind).is_some_and(|e| e.tag.active)
    }

    /// Raw tag record, if the tag has been referenced.
    pub fn tag(&self, kind: TagKind) -> Option<&StatusTag> {
        self.tags.get(&kind).map(|e| &e.tag)
    }

    /// Current value and time since the last transition.
    pub fn get_tag(&self, kind: TagKind) -> TagSnapshot {
        match self.tags.get(&kind) {
            Some(entry) => TagSnapshot {
                active: entry.tag.active,
                elapsed: self.clock - entry.tag.last_transition_time,
            },
            None => TagSnapshot {
                active: false,
                elapsed: f32::INFINITY,
            },
        }
    }

    /// Set a tag. Returns `true` if the value changed.
    ///
    /// Setting a tag to its current value is a no-op: no events fire and the
    /// elapsed-time clock is not reset.
    pub fn set_tag(&mut self, kind: TagKind, active: bool) -> bool {
        let now = self.clock;
        let entry = self.tags.entry(kind).or_insert_with(|| TagEntry::new(kind));
        if entry.tag.active == active {
            return false;
        }

        let elapsed = now - entry.tag.last_transition_time;
        entry.tag.active = active;
        entry.tag.last_transition_time = now;
        debug!("status tag {:?} -> {}", kind, active);

        let edge = if active {
            TagEventKind::Began
        } else {
            TagEventKind::Ended
        };
        for event in [edge, TagEventKind::Changed] {
            let payload = TagEvent {
                kind,
                event,
                active,
                elapsed,
            };
            dispatch(&mut entry.subscribers, &payload);
            if event == TagEventKind::Changed {
                dispatch_any(&mut self.any_subscribers, &payload);
                if let Some(journal) = self.journal.as_mut() {
                    journal.push(payload);
                }
            }
        }
        true
    }

    /// Subscribe to one transition type of one tag.
    pub fn subscribe(
        &mut self,
        kind: TagKind,
        event: TagEventKind,
        handler: impl FnMut(&TagEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_subscription_id();
        self.tags
            .entry(kind)
            .or_insert_with(|| TagEntry::new(kind))
            .subscribers
            .push(Subscription {
                id,
                event,
                handler: Box::new(handler),
            });
        id
    }

    /// Subscribe to the `Changed` event of every tag.
    pub fn subscribe_any(
        &mut self,
        handler: impl FnMut(&TagEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_subscription_id();
        self.any_subscribers.push((id, Box::new(handler)));
        id
    }

    /// Remove a subscription. Returns `false` if it was not found.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        if let Some(index) = self.any_subscribers.iter().position(|(sub, _)| *sub == id) {
            self.any_subscribers.remove(index);
            return true;
        }
        for entry in self.tags.values_mut() {
            if let Some(index) = entry.subscribers.iter().position(|s| s.id == id) {
                entry.subscribers.remove(index);
                return true;
            }
        }
        false
    }

    /// Deactivate every tag. Active tags fire `Ended` and `Changed`; inactive
    /// ones only restart their elapsed-time clock.
    pub fn reset(&mut self) {
        let mut kinds: Vec<TagKind> = self.tags.keys().copied().collect();
        kinds.sort_by_key(|k| *k as u32);
        for kind in kinds {
            if !self.set_tag(kind, false) {
                if let Some(entry) = self.tags.get_mut(&kind) {
                    entry.tag.last_transition_time = self.clock;
                }
            }
        }
    }

    /// Deactivate every tag, then drop all tags and handlers.
    ///
    /// The set stays usable afterwards; tags referenced again start fresh.
    pub fn dispose(&mut self) {
        self.reset();
        self.tags.clear();
        self.any_subscribers.clear();
        if let Some(journal) = self.journal.as_mut() {
            journal.clear();
        }
    }

    /// Bitmask of active tags, see [`TagKind::bit`].
    pub fn as_flags(&self) -> u32 {
        self.tags
            .values()
            .filter(|e| e.tag.active)
            .fold(0, |flags, e| flags | e.tag.kind.bit())
    }

    /// Start or stop recording `Changed` events for [`Self::drain_transitions`].
    pub fn record_transitions(&mut self, enabled: bool) {
        match (enabled, self.journal.is_some()) {
            (true, false) => self.journal = Some(Vec::new()),
            (false, true) => self.journal = None,
            _ => {}
        }
    }

    /// Take the `Changed` events recorded since the last drain.
    pub fn drain_transitions(&mut self) -> Vec<TagEvent> {
        self.journal.as_mut().map(std::mem::take).unwrap_or_default()
    }

    fn next_subscription_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }
}

fn dispatch(subscribers: &mut [Subscription], payload: &TagEvent) {
    for sub in subscribers.iter_mut().filter(|s| s.event == payload.event) {
        invoke(&mut sub.handler, payload);
    }
}

fn dispatch_any(subscribers: &mut [(SubscriptionId, TagHandler)], payload: &TagEvent) {
    for (_, handler) in subscribers.iter_mut() {
        invoke(handler, payload);
    }
}

fn invoke(handler: &mut TagHandler, payload: &TagEvent) {
    match catch_unwind(AssertUnwindSafe(|| (*handler)(payload))) {
        Ok(Ok(())) => {}
        Ok(Err(source)) => {
            let err = LocomotionError::HandlerFailed {
                kind: payload.kind,
                event: payload.event,
                source,
            };
            warn!("{err}");
        }
        Err(_) => {
            let err = LocomotionError::HandlerPanicked {
                kind: payload.kind,
                event: payload.event,
            };
            error!("{err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type EventLog = Arc<Mutex<Vec<TagEvent>>>;

    fn recorder() -> (
        EventLog,
        impl FnMut(&TagEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        (log, move |e: &TagEvent| {
            sink.lock().unwrap().push(*e);
            Ok(())
        })
    }

    fn subscribe_all(tags: &mut StatusTagSet, kind: TagKind) -> Arc<Mutex<Vec<TagEvent>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        for event in [TagEventKind::Began, TagEventKind::Ended, TagEventKind::Changed] {
            let sink = log.clone();
            tags.subscribe(kind, event, move |e| {
                sink.lock().unwrap().push(*e);
                Ok(())
            });
        }
        log
    }

    #[test]
    fn unknown_tag_is_inactive_with_infinite_elapsed() {
        let tags = StatusTagSet::new();
        assert!(!tags.is_active(TagKind::Grounded));
        let snapshot = tags.get_tag(TagKind::Grounded);
        assert!(!snapshot.active);
        assert!(snapshot.elapsed.is_infinite());
        assert!(tags.tag(TagKind::Grounded).is_none());
    }

    #[test]
    fn activation_fires_began_then_changed() {
        let mut tags = StatusTagSet::new();
        let log = subscribe_all(&mut tags, TagKind::Jumping);

        assert!(tags.set_tag(TagKind::Jumping, true));

        let events: Vec<TagEventKind> = log.lock().unwrap().iter().map(|e| e.event).collect();
        assert_eq!(events, vec![TagEventKind::Began, TagEventKind::Changed]);
    }

    #[test]
    fn deactivation_fires_ended_then_changed() {
        let mut tags = StatusTagSet::new();
        tags.set_tag(TagKind::Jumping, true);
        let log = subscribe_all(&mut tags, TagKind::Jumping);

        assert!(tags.set_tag(TagKind::Jumping, false));

        let events: Vec<TagEventKind> = log.lock().unwrap().iter().map(|e| e.event).collect();
        assert_eq!(events, vec![TagEventKind::Ended, TagEventKind::Changed]);
    }

    #[test]
    fn same_value_is_silent_and_keeps_clock() {
        let mut tags = StatusTagSet::new();
        tags.set_tag(TagKind::Grounded, true);
        tags.advance(0.5);
        let log = subscribe_all(&mut tags, TagKind::Grounded);

        assert!(!tags.set_tag(TagKind::Grounded, true));
        assert!(!tags.set_tag(TagKind::Grounded, true));

        assert!(log.lock().unwrap().is_empty());
        assert!((tags.get_tag(TagKind::Grounded).elapsed - 0.5).abs() < 1e-6);
    }

    #[test]
    fn elapsed_tracks_time_since_transition_while_inactive() {
        let mut tags = StatusTagSet::new();
        tags.set_tag(TagKind::Grounded, true);
        tags.advance(1.0);
        tags.set_tag(TagKind::Grounded, false);
        tags.advance(0.25);

        let snapshot = tags.get_tag(TagKind::Grounded);
        assert!(!snapshot.active);
        assert!((snapshot.elapsed - 0.25).abs() < 1e-6);
    }

    #[test]
    fn event_payload_carries_previous_duration() {
        let mut tags = StatusTagSet::new();
        tags.set_tag(TagKind::Dashing, true);
        tags.advance(0.4);
        let (log, handler) = recorder();
        tags.subscribe(TagKind::Dashing, TagEventKind::Ended, handler);

        tags.set_tag(TagKind::Dashing, false);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(!log[0].active);
        assert!((log[0].elapsed - 0.4).abs() < 1e-6);
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let mut tags = StatusTagSet::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let sink = order.clone();
            tags.subscribe(TagKind::Moving, TagEventKind::Changed, move |_| {
                sink.lock().unwrap().push(i);
                Ok(())
            });
        }

        tags.set_tag(TagKind::Moving, true);

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn failing_handler_does_not_stop_others() {
        let mut tags = StatusTagSet::new();
        tags.subscribe(TagKind::Moving, TagEventKind::Began, |_| Err("nope".into()));
        tags.subscribe(TagKind::Moving, TagEventKind::Began, |_| panic!("handler exploded"));
        let (log, handler) = recorder();
        tags.subscribe(TagKind::Moving, TagEventKind::Began, handler);

        tags.set_tag(TagKind::Moving, true);

        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(tags.is_active(TagKind::Moving));
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut tags = StatusTagSet::new();
        let (log, handler) = recorder();
        let id = tags.subscribe(TagKind::Falling, TagEventKind::Changed, handler);

        assert!(tags.unsubscribe(id));
        assert!(!tags.unsubscribe(id));
        tags.set_tag(TagKind::Falling, true);

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn any_subscription_sees_every_kind() {
        let mut tags = StatusTagSet::new();
        let (log, handler) = recorder();
        tags.subscribe_any(handler);

        tags.set_tag(TagKind::Moving, true);
        tags.set_tag(TagKind::Sprinting, true);

        let kinds: Vec<TagKind> = log.lock().unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![TagKind::Moving, TagKind::Sprinting]);
    }

    #[test]
    fn reset_ends_active_tags_and_restarts_inactive_clocks() {
        let mut tags = StatusTagSet::new();
        tags.set_tag(TagKind::Jumping, true);
        tags.set_tag(TagKind::Grounded, false);
        tags.advance(1.0);
        let log = subscribe_all(&mut tags, TagKind::Jumping);

        tags.reset();

        assert!(!tags.is_active(TagKind::Jumping));
        let events: Vec<TagEventKind> = log.lock().unwrap().iter().map(|e| e.event).collect();
        assert_eq!(events, vec![TagEventKind::Ended, TagEventKind::Changed]);
        assert_eq!(tags.get_tag(TagKind::Grounded).elapsed, 0.0);
    }

    #[test]
    fn dispose_then_resubscribe_behaves_fresh() {
        let mut tags = StatusTagSet::new();
        tags.set_tag(TagKind::Dashing, true);
        let (old_log, handler) = recorder();
        tags.subscribe(TagKind::Dashing, TagEventKind::Began, handler);

        tags.dispose();
        assert!(!tags.is_active(TagKind::Dashing));
        assert!(tags.tag(TagKind::Dashing).is_none());

        let (new_log, handler) = recorder();
        tags.subscribe(TagKind::Dashing, TagEventKind::Began, handler);
        assert!(tags.set_tag(TagKind::Dashing, true));

        assert!(old_log.lock().unwrap().is_empty());
        assert_eq!(new_log.lock().unwrap().len(), 1);
    }

    #[test]
    fn flags_reflect_active_tags() {
        let mut tags = StatusTagSet::new();
        tags.set_tag(TagKind::Grounded, true);
        tags.set_tag(TagKind::Moving, true);
        tags.set_tag(TagKind::Falling, false);

        assert_eq!(tags.as_flags(), TagKind::Grounded.bit() | TagKind::Moving.bit());
    }

    #[test]
    fn journal_records_only_when_enabled() {
        let mut tags = StatusTagSet::new();
        tags.set_tag(TagKind::Moving, true);
        assert!(tags.drain_transitions().is_empty());

        tags.record_transitions(true);
        tags.set_tag(TagKind::Moving, false);
        tags.set_tag(TagKind::Moving, false);
        let drained = tags.drain_transitions();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].event, TagEventKind::Changed);
        assert!(tags.drain_transitions().is_empty());
    }
}
