use thiserror::Error;

/// Domain errors surfaced to callers. Validation failures are returned,
/// never panicked; `Store` wraps transient repository failures.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("match not found: {0}")]
    MatchNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("predictions are closed for match {0}")]
    PredictionsClosed(String),

    #[error("invalid score: {0}")]
    InvalidScore(String),

    #[error("bonus already used on match {held_by} in round {round}")]
    BonusAlreadyUsedThisRound { round: u32, held_by: String },

    #[error("forbidden: user {0} is not an admin")]
    Forbidden(String),

    #[error("username already taken: {0}")]
    UsernameTaken(String),

    #[error("store unavailable: {0}")]
    Store(String),
}

impl PoolError {
    /// Transient store reads are safe to retry; everything else is a
    /// terminal answer for the request that produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;
