// Matcher error kinds. Every user-visible variant renders as a short, stable
// English string; the API edge maps kinds to HTTP statuses.

use crate::order::OrderId;

#[derive(Debug, Clone, PartialEq)]
pub enum MatcherError {
    /// Placement rejected by the validation pipeline.
    ValidationFailure(String),

    /// Cancel request rejected.
    CancelRejected(String),

    /// An account or asset script evaluated to false.
    ScriptRejected {
        context: String,
        script_text: String,
        is_asset_script: bool,
    },

    /// An account or asset script failed to evaluate.
    ScriptExecutionError {
        context: String,
        error: String,
        script_text: String,
        is_asset_script: bool,
    },

    /// The UTX pool refused an emitted exchange transaction; the submitted
    /// order was removed and the counter order restored.
    MatchingRolledBack { order_id: String, cause: String },

    /// Validation did not complete within the configured deadline.
    Timeout,

    /// Persistence I/O failure. Fatal to the pair actor.
    Internal(String),
}

impl MatcherError {
    pub fn rolled_back(order_id: &OrderId, cause: impl Into<String>) -> Self {
        MatcherError::MatchingRolledBack {
            order_id: order_id.to_string(),
            cause: cause.into(),
        }
    }
}

impl std::fmt::Display for MatcherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatcherError::ValidationFailure(reason) => write!(f, "{}", reason),
            MatcherError::CancelRejected(reason) => write!(f, "{}", reason),
            MatcherError::ScriptRejected {
                context,
                is_asset_script,
                ..
            } => {
                let kind = if *is_asset_script { "Asset" } else { "Account" };
                write!(f, "{} script denied {}", kind, context)
            }
            MatcherError::ScriptExecutionError {
                context,
                error,
                is_asset_script,
                ..
            } => {
                let kind = if *is_asset_script { "Asset" } else { "Account" };
                write!(f, "{} script error on {}: {}", kind, context, error)
            }
            MatcherError::MatchingRolledBack { order_id, cause } => {
                write!(f, "Order {} was rolled back: {}", order_id, cause)
            }
            MatcherError::Timeout => write!(f, "Operation timed out"),
            MatcherError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for MatcherError {}

impl From<sled::Error> for MatcherError {
    fn from(err: sled::Error) -> Self {
        MatcherError::Internal(err.to_string())
    }
}

impl From<bincode::Error> for MatcherError {
    fn from(err: bincode::Error) -> Self {
        MatcherError::Internal(err.to_string())
    }
}
