use std::io;
use thiserror::Error;

/// Failure of the channel itself. The call wrapper retries these.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("undecodable frame: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{service} call got an unexpected '{got}' reply")]
    UnexpectedReply {
        service: &'static str,
        got: &'static str,
    },
    #[error("no address resolved for {0}")]
    Unresolved(String),
}

/// Raised by a host rendering capability.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to reconnect to server {address} after {attempts} attempts")]
    Connectivity { address: String, attempts: u32 },

    #[error("failed to get {call} response after {retries} retries: {source}")]
    RetriesExhausted {
        call: &'static str,
        retries: u32,
        #[source]
        source: TransportError,
    },

    #[error("server replied with error '{code}': {message}")]
    Remote { code: String, message: String },

    #[error("no context found with key '{0}'")]
    UnknownContext(String),

    #[error("missing required field '{field}' in message '{message}'")]
    MissingField {
        message: &'static str,
        field: &'static str,
    },

    #[error("invalid value '{value}' for field '{field}' in message '{message}'")]
    InvalidField {
        message: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("{message} declares {slots} slot(s) but {keys} key(s)")]
    SlotMismatch {
        message: &'static str,
        slots: usize,
        keys: usize,
    },

    #[error("host rendering failed: {0}")]
    Host(#[from] HostError),

    #[error("session {0} has been terminated")]
    SessionTerminated(String),
}

impl RuntimeError {
    pub fn is_lookup(&self) -> bool {
        matches!(self, RuntimeError::UnknownContext(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RuntimeError::MissingField { .. }
                | RuntimeError::InvalidField { .. }
                | RuntimeError::SlotMismatch { .. }
        )
    }
}

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;
