use thiserror::Error;

/// Outcomes surfaced by the session, stats and ranking services.
#[derive(Debug, Error)]
pub enum StudyError {
    /// The user already has a session with no end timestamp.
    #[error("an active session already exists for this user")]
    Conflict,

    /// The session does not exist, belongs to someone else, or is no longer active.
    #[error("session not found or inactive")]
    NotFound,

    #[error("session is already ended")]
    AlreadyEnded,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Durable store or cache I/O failed; the call may be retried.
    #[error("store unavailable: {0:#}")]
    TransientStore(#[from] anyhow::Error),
}

impl StudyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StudyError::TransientStore(_))
    }
}

pub type StudyResult<T> = std::result::Result<T, StudyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_failures_are_transient() {
        assert!(StudyError::from(anyhow::anyhow!("disk I/O error")).is_transient());
        assert!(!StudyError::AlreadyEnded.is_transient());
        assert!(!StudyError::Conflict.is_transient());
        assert!(!StudyError::NotFound.is_transient());
    }

    #[test]
    fn transient_message_keeps_context_chain() {
        let err = StudyError::from(
            anyhow::anyhow!("database is locked").context("failed to finalize session"),
        );
        assert_eq!(
            err.to_string(),
            "store unavailable: failed to finalize session: database is locked"
        );
    }
}
