//! Interface lifecycle state machine.
//!
//! `transition` is a pure function from (state, event) to (state, actions);
//! nothing here touches the engine or the bus.

use std::fmt;

use crate::types::{Command, Topic};

// ============================================================================
// LifecycleEvent
// ============================================================================

/// Lifecycle signal reported by an interface instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Created or brought back, but not yet interactive
    Started,
    /// Visible and interactive
    Resumed,
    /// Lost focus (user left the interface)
    Paused,
    /// Fully hidden
    Stopped,
    /// Torn down
    Destroyed,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleEvent::Started => "started",
            LifecycleEvent::Resumed => "resumed",
            LifecycleEvent::Paused => "paused",
            LifecycleEvent::Stopped => "stopped",
            LifecycleEvent::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// InterfaceState
// ============================================================================

/// How the interface perceives itself. Not owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterfaceState {
    /// No lifecycle signal seen yet
    #[default]
    Unknown,
    /// Rendering the stopwatch
    Visible,
    /// Alive but not rendering
    Hidden,
    /// Terminal; all subscriptions released
    Destroyed,
}

// ============================================================================
// BridgeAction
// ============================================================================

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeAction {
    /// Send a command to the engine
    Send(Command),
    /// Attach a listener on a topic
    Subscribe(Topic),
    /// Set or clear the "paused by user" flag
    SetUserPaused(bool),
    /// Detach every listener this interface holds
    UnsubscribeAll,
}

/// Computes the next state and the actions to run.
///
/// Every event after `Destroyed` is ignored.
pub fn transition(
    state: InterfaceState,
    event: LifecycleEvent,
) -> (InterfaceState, Vec<BridgeAction>) {
    use BridgeAction::{Send, SetUserPaused, Subscribe, UnsubscribeAll};

    if state == InterfaceState::Destroyed {
        return (state, Vec::new());
    }

    match event {
        // Listeners attach before the status query so its answer cannot be missed.
        LifecycleEvent::Resumed => (
            InterfaceState::Visible,
            vec![
                SetUserPaused(false),
                Subscribe(Topic::Tick),
                Subscribe(Topic::Status),
                Send(Command::MoveToBackground),
                Send(Command::GetStatus),
            ],
        ),
        LifecycleEvent::Started => (
            InterfaceState::Hidden,
            vec![Send(Command::MoveToBackground)],
        ),
        LifecycleEvent::Stopped => (
            InterfaceState::Hidden,
            vec![Send(Command::MoveToForeground)],
        ),
        LifecycleEvent::Paused => (
            InterfaceState::Hidden,
            vec![SetUserPaused(true), Send(Command::MoveToForeground)],
        ),
        LifecycleEvent::Destroyed => (InterfaceState::Destroyed, vec![UnsubscribeAll]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_unknown() {
        assert_eq!(InterfaceState::default(), InterfaceState::Unknown);
    }

    #[test]
    fn test_resumed() {
        let (state, actions) = transition(InterfaceState::Unknown, LifecycleEvent::Resumed);

        assert_eq!(state, InterfaceState::Visible);
        assert_eq!(
            actions,
            vec![
                BridgeAction::SetUserPaused(false),
                BridgeAction::Subscribe(Topic::Tick),
                BridgeAction::Subscribe(Topic::Status),
                BridgeAction::Send(Command::MoveToBackground),
                BridgeAction::Send(Command::GetStatus),
            ]
        );
    }

    #[test]
    fn test_subscribes_precede_sends() {
        let events = [
            LifecycleEvent::Started,
            LifecycleEvent::Resumed,
            LifecycleEvent::Paused,
            LifecycleEvent::Stopped,
            LifecycleEvent::Destroyed,
        ];
        for event in events {
            let (_, actions) = transition(InterfaceState::Unknown, event);
            let last_subscribe = actions
                .iter()
                .rposition(|a| matches!(a, BridgeAction::Subscribe(_)));
            let first_send = actions
                .iter()
                .position(|a| matches!(a, BridgeAction::Send(_)));
            if let (Some(subscribe), Some(send)) = (last_subscribe, first_send) {
                assert!(subscribe < send, "{:?}: {:?}", event, actions);
            }
        }
    }

    #[test]
    fn test_started() {
        let (state, actions) = transition(InterfaceState::Unknown, LifecycleEvent::Started);

        assert_eq!(state, InterfaceState::Hidden);
        assert_eq!(actions, vec![BridgeAction::Send(Command::MoveToBackground)]);
    }

    #[test]
    fn test_stopped() {
        let (state, actions) = transition(InterfaceState::Visible, LifecycleEvent::Stopped);

        assert_eq!(state, InterfaceState::Hidden);
        assert_eq!(actions, vec![BridgeAction::Send(Command::MoveToForeground)]);
    }

    #[test]
    fn test_paused() {
        let (state, actions) = transition(InterfaceState::Visible, LifecycleEvent::Paused);

        assert_eq!(state, InterfaceState::Hidden);
        assert_eq!(
            actions,
            vec![
                BridgeAction::SetUserPaused(true),
                BridgeAction::Send(Command::MoveToForeground),
            ]
        );
    }

    #[test]
    fn test_destroyed_is_terminal() {
        let (state, actions) = transition(InterfaceState::Hidden, LifecycleEvent::Destroyed);
        assert_eq!(state, InterfaceState::Destroyed);
        assert_eq!(actions, vec![BridgeAction::UnsubscribeAll]);

        for event in [
            LifecycleEvent::Started,
            LifecycleEvent::Resumed,
            LifecycleEvent::Paused,
            LifecycleEvent::Stopped,
            LifecycleEvent::Destroyed,
        ] {
            let (next, actions) = transition(state, event);
            assert_eq!(next, InterfaceState::Destroyed, "after {}", event);
            assert!(actions.is_empty(), "after {}", event);
        }
    }

    #[test]
    fn test_typical_sequence() {
        let events = [
            LifecycleEvent::Started,
            LifecycleEvent::Resumed,
            LifecycleEvent::Paused,
            LifecycleEvent::Stopped,
            LifecycleEvent::Started,
            LifecycleEvent::Resumed,
        ];
        let states: Vec<InterfaceState> = events
            .iter()
            .scan(InterfaceState::Unknown, |state, event| {
                *state = transition(*state, *event).0;
                Some(*state)
            })
            .collect();

        assert_eq!(
            states,
            vec![
                InterfaceState::Hidden,
                InterfaceState::Visible,
                InterfaceState::Hidden,
                InterfaceState::Hidden,
                InterfaceState::Hidden,
                InterfaceState::Visible,
            ]
        );
    }
}
