use std::fmt;

/// Context attached to a terminal error: which volume/key/part the failing
/// operation was working on, plus the underlying status code if one was
/// observed on the wire.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub volume_id: Option<String>,
    pub key: Option<String>,
    pub part_number: Option<i32>,
    pub status_code: Option<u16>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volume(mut self, id: impl Into<String>) -> Self {
        self.volume_id = Some(id.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn part(mut self, part_number: i32) -> Self {
        self.part_number = Some(part_number);
        self
    }

    pub fn status(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(v) = &self.volume_id {
            parts.push(format!("volume={v}"));
        }
        if let Some(k) = &self.key {
            parts.push(format!("key={k}"));
        }
        if let Some(p) = self.part_number {
            parts.push(format!("part={p}"));
        }
        if let Some(s) = self.status_code {
            parts.push(format!("status={s}"));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// One failed (key, error) pair inside a composite directory-operation error.
#[derive(Debug)]
pub struct FailedItem {
    pub key: String,
    pub error: StorageError,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("authentication failed ({0})")]
    AuthenticationFailed(ErrorContext),

    #[error("volume not found: {0}")]
    VolumeNotFound(String),

    #[error("object not found ({0})")]
    ObjectNotFound(ErrorContext),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("insufficient storage ({0})")]
    InsufficientStorage(ErrorContext),

    #[error("transient network error ({0}): {1}")]
    TransientNetwork(ErrorContext, String),

    #[error("protocol mismatch ({0}): {1}")]
    ProtocolMismatch(ErrorContext, String),

    #[error("cancelled ({0})")]
    Cancelled(ErrorContext),

    #[error("{} of {} items failed", .0.len(), .0.len() + .1)]
    Partial(Vec<FailedItem>, usize),

    #[error("management API error ({0}): {1}")]
    Management(ErrorContext, String),

    #[error("unknown datacenter: {0}")]
    UnknownDatacenter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl StorageError {
    pub fn other(msg: impl Into<String>) -> Self {
        StorageError::Other(msg.into())
    }

    /// True if this error kind is the engine's own retry machinery's
    /// responsibility rather than a terminal condition.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::TransientNetwork(_, _))
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        let ctx = ErrorContext::new();
        let ctx = if let Some(status) = e.status() {
            ctx.status(status.as_u16())
        } else {
            ctx
        };
        if e.is_timeout() || e.is_connect() {
            StorageError::TransientNetwork(ctx, e.to_string())
        } else {
            StorageError::Management(ctx, e.to_string())
        }
    }
}
