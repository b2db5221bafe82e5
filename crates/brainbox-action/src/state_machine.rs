//! Action state machine with validated transitions.
//!
//! pending -> approved -> executing -> executed
//! pending -> rejected
//! executing -> failed

use brainbox_core::actions::ActionStatus;

use crate::error::ActionError;

/// Validate that a status transition is allowed.
pub fn validate_transition(from: ActionStatus, to: ActionStatus) -> Result<(), ActionError> {
    let valid = matches!(
        (from, to),
        (ActionStatus::Pending, ActionStatus::Approved)
            | (ActionStatus::Pending, ActionStatus::Rejected)
            | (ActionStatus::Approved, ActionStatus::Executing)
            | (ActionStatus::Executing, ActionStatus::Executed)
            | (ActionStatus::Executing, ActionStatus::Failed)
    );

    if valid {
        Ok(())
    } else {
        Err(ActionError::InvalidTransition(from, to))
    }
}

/// The only state `to` can be entered from.
pub fn pre_state(to: ActionStatus) -> Option<ActionStatus> {
    match to {
        ActionStatus::Pending => None,
        ActionStatus::Approved | ActionStatus::Rejected => Some(ActionStatus::Pending),
        ActionStatus::Executing => Some(ActionStatus::Approved),
        ActionStatus::Executed | ActionStatus::Failed => Some(ActionStatus::Executing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Valid transitions
    // =====================================================================

    #[test]
    fn test_pending_to_approved() {
        assert!(validate_transition(ActionStatus::Pending, ActionStatus::Approved).is_ok());
    }

    #[test]
    fn test_pending_to_rejected() {
        assert!(validate_transition(ActionStatus::Pending, ActionStatus::Rejected).is_ok());
    }

    #[test]
    fn test_approved_to_executing() {
        assert!(validate_transition(ActionStatus::Approved, ActionStatus::Executing).is_ok());
    }

    #[test]
    fn test_executing_to_terminal() {
        assert!(validate_transition(ActionStatus::Executing, ActionStatus::Executed).is_ok());
        assert!(validate_transition(ActionStatus::Executing, ActionStatus::Failed).is_ok());
    }

    // =====================================================================
    // Invalid transitions
    // =====================================================================

    #[test]
    fn test_pending_cannot_skip_approval() {
        assert!(validate_transition(ActionStatus::Pending, ActionStatus::Executing).is_err());
        assert!(validate_transition(ActionStatus::Pending, ActionStatus::Executed).is_err());
    }

    #[test]
    fn test_approved_cannot_be_rejected() {
        assert!(validate_transition(ActionStatus::Approved, ActionStatus::Rejected).is_err());
    }

    #[test]
    fn test_no_self_transitions() {
        for status in ActionStatus::all() {
            assert!(validate_transition(status, status).is_err());
        }
    }

    #[test]
    fn test_terminal_states_go_nowhere() {
        for from in ActionStatus::all().into_iter().filter(|s| s.is_terminal()) {
            for to in ActionStatus::all() {
                assert!(
                    validate_transition(from, to).is_err(),
                    "{} -> {} should be rejected",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_all_valid_transitions_count() {
        let mut valid_count = 0;
        for from in ActionStatus::all() {
            for to in ActionStatus::all() {
                if validate_transition(from, to).is_ok() {
                    valid_count += 1;
                    assert_eq!(pre_state(to), Some(from));
                }
            }
        }
        assert_eq!(valid_count, 5, "Expected exactly 5 valid transitions");
    }

    #[test]
    fn test_invalid_transition_error_message() {
        let err = validate_transition(ActionStatus::Rejected, ActionStatus::Approved).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("rejected"), "Error should mention source state");
        assert!(msg.contains("approved"), "Error should mention target state");
    }
}
