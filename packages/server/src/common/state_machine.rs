//! Transition validation for entity lifecycles.
//!
//! Each lifecycle declares a fixed adjacency table. A state that is not a key
//! of its table has no outgoing transitions. Callers go through
//! [`ensure_transition`] so an undeclared move is an error, never a no-op.

use std::fmt::{Debug, Display};
use thiserror::Error;

/// A lifecycle whose legal moves are a fixed adjacency table.
pub trait Lifecycle: Copy + Eq + Debug + Display + Send + Sync + 'static {
    /// Entity name used in rejection messages ("order", "drone").
    const ENTITY: &'static str;

    /// Outgoing edges of `self`. Empty for terminal states.
    fn next_states(self) -> &'static [Self];

    fn can_transition(self, to: Self) -> bool {
        self.next_states().contains(&to)
    }

    fn is_terminal(self) -> bool {
        self.next_states().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {entity} transition: cannot move from {from} to {to}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: String,
    pub to: String,
}

/// Validates `from -> to` against the lifecycle table.
pub fn ensure_transition<S: Lifecycle>(from: S, to: S) -> Result<(), TransitionError> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(TransitionError {
            entity: S::ENTITY,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
