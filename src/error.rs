//! Error types.
//!
//! Almost nothing in the locomotion core can fail: missing ground is a normal
//! state and ineligible actions are silent no-ops. The errors here only cover
//! API misuse that a caller may want to react to.

use thiserror::Error;

use crate::actions::ActionKind;
use crate::tags::{TagEventKind, TagKind};

/// Boxed error returned by a status tag handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the locomotion core.
#[derive(Debug, Error)]
pub enum LocomotionError {
    /// An action was addressed that is not registered on the controller.
    #[error("no {0:?} action is registered on this controller")]
    MissingAction(ActionKind),

    /// A tag handler returned an error. Dispatch continued with the
    /// remaining handlers.
    #[error("{event:?} handler for tag {kind:?} failed: {source}")]
    HandlerFailed {
        kind: TagKind,
        event: TagEventKind,
        #[source]
        source: HandlerError,
    },

    /// A tag handler panicked. Dispatch continued with the remaining handlers.
    #[error("{event:?} handler for tag {kind:?} panicked")]
    HandlerPanicked { kind: TagKind, event: TagEventKind },
}
