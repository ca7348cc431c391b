use crate::messages::Action;
use thiserror::Error;

/// Errors raised while building or routing typed OCPP messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Property constraint violated on {field} = {value}: {reason}")]
    PropertyConstraint {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Unknown action {0:?}")]
    UnknownAction(String),

    #[error("Feature profile {profile} does not handle {action}")]
    NotSupported {
        profile: &'static str,
        action: Action,
    },
}
