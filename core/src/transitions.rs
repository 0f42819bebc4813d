//! Declarative transition table for ticket actions.

use crate::ticket::TicketStatus;

/// A mutating action against a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketAction {
    CallNext,
    StartServing,
    Complete,
    Cancel,
    Hold,
    Unhold,
    Recall,
    Transfer,
    NoShow,
}

impl TicketAction {
    /// Ledger/wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CallNext => "call_next",
            Self::StartServing => "start_serving",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
            Self::Hold => "hold",
            Self::Unhold => "unhold",
            Self::Recall => "recall",
            Self::Transfer => "transfer",
            Self::NoShow => "no_show",
        }
    }

    /// Statuses the action is allowed to start from.
    ///
    /// `Recall` is listed even though it changes no columns; it still
    /// requires the ticket to be in `called`.
    #[must_use]
    pub const fn allowed_from(self) -> &'static [TicketStatus] {
        match self {
            Self::CallNext | Self::Cancel | Self::Hold => &[TicketStatus::Waiting],
            Self::StartServing | Self::Recall | Self::NoShow => &[TicketStatus::Called],
            Self::Complete => &[TicketStatus::Serving],
            Self::Unhold => &[TicketStatus::Held],
            Self::Transfer => &[
                TicketStatus::Waiting,
                TicketStatus::Called,
                TicketStatus::Serving,
            ],
        }
    }
}

/// Whether `action` may be applied to a ticket currently in `from`.
#[must_use]
pub fn valid_transition(action: TicketAction, from: TicketStatus) -> bool {
    action.allowed_from().contains(&from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::TicketStatus::*;

    #[test]
    fn call_next_only_from_waiting() {
        assert!(valid_transition(TicketAction::CallNext, Waiting));
        for from in [Called, Serving, Done, NoShow, Cancelled, Held] {
            assert!(!valid_transition(TicketAction::CallNext, from));
        }
    }

    #[test]
    fn serving_chain() {
        assert!(valid_transition(TicketAction::StartServing, Called));
        assert!(!valid_transition(TicketAction::StartServing, Waiting));
        assert!(valid_transition(TicketAction::Complete, Serving));
        assert!(!valid_transition(TicketAction::Complete, Called));
    }

    #[test]
    fn hold_and_unhold() {
        assert!(valid_transition(TicketAction::Hold, Waiting));
        assert!(!valid_transition(TicketAction::Hold, Held));
        assert!(valid_transition(TicketAction::Unhold, Held));
        assert!(!valid_transition(TicketAction::Unhold, Waiting));
    }

    #[test]
    fn transfer_from_three_states() {
        for from in [Waiting, Called, Serving] {
            assert!(valid_transition(TicketAction::Transfer, from));
        }
        for from in [Done, NoShow, Cancelled, Held] {
            assert!(!valid_transition(TicketAction::Transfer, from));
        }
    }

    #[test]
    fn recall_and_no_show_require_called() {
        assert!(valid_transition(TicketAction::Recall, Called));
        assert!(!valid_transition(TicketAction::Recall, Serving));
        assert!(valid_transition(TicketAction::NoShow, Called));
        assert!(!valid_transition(TicketAction::NoShow, Waiting));
    }

    #[test]
    fn terminal_states_reject_everything() {
        for action in [
            TicketAction::CallNext,
            TicketAction::StartServing,
            TicketAction::Complete,
            TicketAction::Cancel,
            TicketAction::Hold,
            TicketAction::Unhold,
            TicketAction::Recall,
            TicketAction::Transfer,
            TicketAction::NoShow,
        ] {
            for from in [Done, NoShow, Cancelled] {
                assert!(!valid_transition(action, from), "{action:?} from {from:?}");
            }
        }
    }
}
