use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("invalid {kind} transition for {id}: {from} -> {to}")]
    InvalidTransition {
        kind: &'static str,
        id: Uuid,
        from: String,
        to: String,
    },

    #[error("invalid location: ({latitude}, {longitude})")]
    InvalidLocation { latitude: f64, longitude: f64 },

    #[error("concurrent update conflict on {collection}/{id}")]
    Conflict { collection: String, id: Uuid },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("telemetry error: {0}")]
    Telemetry(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("service error: {0}")]
    Service(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        Error::NotFound { kind, id }
    }

    /// Rejected status change. Carries the status the record was actually
    /// in so callers can refresh and retry instead of blindly resubmitting.
    pub fn invalid_transition(
        kind: &'static str,
        id: Uuid,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Error::InvalidTransition {
            kind,
            id,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn conflict(collection: &str, id: Uuid) -> Self {
        Error::Conflict {
            collection: collection.to_string(),
            id,
        }
    }
}

/// True when the error chain bottoms out in a lost compare-and-set race.
pub fn is_conflict(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<Error>(), Some(Error::Conflict { .. }))
}

pub fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<Error>(), Some(Error::NotFound { .. }))
}

pub fn is_invalid_transition(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<Error>(),
        Some(Error::InvalidTransition { .. })
    )
}
