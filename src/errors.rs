use thiserror::Error;

/// Error type for roadgraph operations.
#[derive(Debug, Error)]
pub enum RoadGraphError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("store is closed")]
    StoreClosed,
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("store error: {0}")]
    StoreError(String),
    #[error("index operation failed ({phase}) on {index}: {reason}")]
    IndexOperationFailed {
        index: String,
        phase: String,
        reason: String,
    },
}

impl RoadGraphError {
    pub fn unavailable<T: Into<String>>(msg: T) -> Self {
        RoadGraphError::StoreUnavailable(msg.into())
    }

    pub fn invalid_payload<T: Into<String>>(msg: T) -> Self {
        RoadGraphError::InvalidPayload(msg.into())
    }

    pub fn store<T: Into<String>>(msg: T) -> Self {
        RoadGraphError::StoreError(msg.into())
    }

    pub fn index_operation<I, P, R>(index: I, phase: P, reason: R) -> Self
    where
        I: Into<String>,
        P: Into<String>,
        R: Into<String>,
    {
        RoadGraphError::IndexOperationFailed {
            index: index.into(),
            phase: phase.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn sqlite(err: rusqlite::Error) -> Self {
        RoadGraphError::StoreError(err.to_string())
    }
}
