//! Server lifecycle state machine.
//!
//! # State Transitions
//! ```text
//! Created → Loading → Listening → Stopped
//!    └──────────┴──────────┴────────→ Stopped
//! ```
//!
//! # Design Decisions
//! - Transitions only move forward; a stopped server cannot be restarted
//! - Leaving Created locks modules and options
//! - Current state is published on a watch channel for observers

use tokio::sync::watch;

/// Lifecycle state of a [`WebServer`](crate::http::WebServer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServerState {
    /// Configuration may still change.
    Created,
    /// Configuration locked, modules starting.
    Loading,
    /// Accept loop active.
    Listening,
    /// Terminal.
    Stopped,
}

impl ServerState {
    /// Returns true if configuration can no longer change.
    pub fn is_locked(self) -> bool {
        self != ServerState::Created
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServerState::Created => "created",
            ServerState::Loading => "loading",
            ServerState::Listening => "listening",
            ServerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Owner of the current [`ServerState`].
#[derive(Debug)]
pub struct StateMachine {
    tx: watch::Sender<ServerState>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ServerState::Created);
        Self { tx }
    }

    /// Current state.
    pub fn current(&self) -> ServerState {
        *self.tx.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.tx.subscribe()
    }

    /// Move to `next`. Returns false (and changes nothing) for backward or
    /// repeated transitions.
    pub fn advance(&self, next: ServerState) -> bool {
        let advanced = self.tx.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        });
        if advanced {
            tracing::info!(state = %next, "Server state changed");
        }
        advanced
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_monotonic() {
        let machine = StateMachine::new();
        assert!(machine.advance(ServerState::Loading));
        assert!(machine.advance(ServerState::Listening));
        assert!(!machine.advance(ServerState::Loading));
        assert!(!machine.advance(ServerState::Listening));
        assert_eq!(machine.current(), ServerState::Listening);
        assert!(machine.advance(ServerState::Stopped));
        assert!(!machine.advance(ServerState::Created));
    }

    #[test]
    fn can_skip_straight_to_stopped() {
        let machine = StateMachine::new();
        assert!(machine.advance(ServerState::Stopped));
        assert!(machine.current().is_locked());
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let machine = StateMachine::new();
        let mut rx = machine.subscribe();
        machine.advance(ServerState::Loading);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ServerState::Loading);
    }
}
