use std::time::Duration;

use thiserror::Error;

/// Failure of a nutrition service operation.
///
/// `Validation` never touches the stores or the model; `Collaborator` and
/// `Timeout` mean the external model call failed and nothing was recorded.
#[derive(Debug, Error)]
pub enum NutritionError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Collaborator(String),
    #[error("model did not respond within {}s", .0.as_secs())]
    Timeout(Duration),
}

impl NutritionError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
