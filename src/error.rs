use thiserror::Error;

pub type Result<T> = std::result::Result<T, SoportechError>;

#[derive(Debug, Error)]
pub enum SoportechError {
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Write rejected by backend: {0}")]
    WriteError(String),

    #[error("Ticket not found: {0}")]
    NotFound(String),

    #[error("Missing required fields: {}", missing.join(", "))]
    Validation { missing: Vec<String> },

    #[error("Invalid ticket ID format: {0}")]
    InvalidTicketId(String),

    #[error("A realtime subscription is already attached to this view")]
    AlreadySubscribed,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SoportechError {
    /// Whether the façade may retry this failure against the local store.
    ///
    /// Only transport-level failures qualify. `NotFound` and `Validation` are
    /// answers, not outages, and are returned to the caller as-is.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::WriteError(_))
    }
}

impl From<figment::Error> for SoportechError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}
