//! Viewer session state machine
//!
//! Extracted from the viewer controller so the transitions are testable
//! without any rendering surface or network.
//!
//! ```text
//!   Connecting ──join, producers live──► Connected
//!       │                                   ▲
//!       └──join, room empty──► Waiting ─────┘ first producer
//!
//!   any ──disconnect──► Reconnecting{attempt} ──cap hit──► Failed
//!                              │ success                      │ manual retry
//!                              ▼                              ▼
//!                       Connected | Waiting              Connecting
//! ```

/// Viewer lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerPhase {
    /// Negotiating the initial connection
    Connecting,
    /// In the room, no producer live yet
    Waiting,
    /// Consuming at least one producer
    Connected,
    /// Connection lost; `attempt` reconnections started so far
    Reconnecting { attempt: u32 },
    /// Retries exhausted; only a manual retry leaves this state
    Failed,
}

/// Transition rules for a viewer session
#[derive(Debug)]
pub struct ViewerStateMachine {
    phase: ViewerPhase,
    max_attempts: u32,
}

impl ViewerStateMachine {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            phase: ViewerPhase::Connecting,
            max_attempts,
        }
    }

    pub fn phase(&self) -> ViewerPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == ViewerPhase::Failed
    }

    /// A join (or rejoin) completed. With producers live the viewer is
    /// connected; an empty room means waiting for the first push.
    pub fn on_connected(&mut self, has_producers: bool) {
        self.phase = if has_producers {
            ViewerPhase::Connected
        } else {
            ViewerPhase::Waiting
        };
    }

    /// The connection dropped. Terminal failure is sticky.
    pub fn on_disconnect(&mut self) {
        if self.phase != ViewerPhase::Failed {
            self.phase = ViewerPhase::Reconnecting { attempt: 0 };
        }
    }

    /// Start the next reconnection attempt.
    ///
    /// Returns the attempt number, or `None` once the cap is hit, at
    /// which point the phase is terminal.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        match self.phase {
            ViewerPhase::Reconnecting { attempt } if attempt < self.max_attempts => {
                let next = attempt + 1;
                self.phase = ViewerPhase::Reconnecting { attempt: next };
                Some(next)
            }
            ViewerPhase::Reconnecting { .. } => {
                self.phase = ViewerPhase::Failed;
                None
            }
            _ => None,
        }
    }

    /// Give up immediately (unrecoverable local error)
    pub fn fail(&mut self) {
        self.phase = ViewerPhase::Failed;
    }

    /// Leave the terminal state on user action
    pub fn manual_retry(&mut self) -> bool {
        if self.phase == ViewerPhase::Failed {
            self.phase = ViewerPhase::Connecting;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_room_waits_then_connects() {
        let mut sm = ViewerStateMachine::new(3);
        assert_eq!(sm.phase(), ViewerPhase::Connecting);

        sm.on_connected(false);
        assert_eq!(sm.phase(), ViewerPhase::Waiting);

        // First producer announced; no manual reconnect involved
        sm.on_connected(true);
        assert_eq!(sm.phase(), ViewerPhase::Connected);
    }

    #[test]
    fn test_disconnect_enters_reconnecting() {
        let mut sm = ViewerStateMachine::new(3);
        sm.on_connected(true);

        sm.on_disconnect();
        assert_eq!(sm.phase(), ViewerPhase::Reconnecting { attempt: 0 });

        assert_eq!(sm.begin_attempt(), Some(1));
        sm.on_connected(true);
        assert_eq!(sm.phase(), ViewerPhase::Connected);
    }

    #[test]
    fn test_retry_cap_is_terminal_not_infinite() {
        let mut sm = ViewerStateMachine::new(3);
        sm.on_connected(true);
        sm.on_disconnect();

        assert_eq!(sm.begin_attempt(), Some(1));
        assert_eq!(sm.begin_attempt(), Some(2));
        assert_eq!(sm.begin_attempt(), Some(3));
        assert_eq!(sm.begin_attempt(), None);
        assert_eq!(sm.phase(), ViewerPhase::Failed);

        // Sticky: further disconnects and attempts change nothing
        sm.on_disconnect();
        assert_eq!(sm.phase(), ViewerPhase::Failed);
        assert_eq!(sm.begin_attempt(), None);
    }

    #[test]
    fn test_manual_retry_leaves_failed() {
        let mut sm = ViewerStateMachine::new(0);
        sm.on_disconnect();
        assert_eq!(sm.begin_attempt(), None);
        assert!(sm.is_terminal());

        assert!(sm.manual_retry());
        assert_eq!(sm.phase(), ViewerPhase::Connecting);

        // Retry is only meaningful from the terminal state
        assert!(!sm.manual_retry());
    }
}
