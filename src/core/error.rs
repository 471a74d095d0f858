// Error taxonomy shared by views, tables, datasets, backends, and the CLI.
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use crate::core::record::Status;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    UnsupportedShape,
    InsufficientCapacity,
    LayoutMismatch,
    InvalidHandle,
    Backend,
    NotFound,
    AlreadyExists,
    Busy,
    Permission,
    Corrupt,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    available: Option<u64>,
    requested: Option<u64>,
    status: Option<Status>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            available: None,
            requested: None,
            status: None,
            source: None,
        }
    }

    /// Destination or source holds fewer records than the call needs.
    pub fn insufficient_capacity(available: u64, requested: u64) -> Self {
        Self::new(ErrorKind::InsufficientCapacity)
            .with_message(format!(
                "not enough capacity (cap={available}, need={requested})"
            ))
            .with_capacity(available, requested)
    }

    pub fn invalid_handle() -> Self {
        Self::new(ErrorKind::InvalidHandle).with_message("handle is closed")
    }

    /// Maps a failed backend status onto the error taxonomy.
    ///
    /// Every call site that talks to a `TransferBackend` funnels its status
    /// through here so the translation lives in one place.
    pub fn from_status(op: &str, status: Status) -> Self {
        let kind = match status {
            Status::INVALID_HANDLE => ErrorKind::InvalidHandle,
            Status::NOT_FOUND => ErrorKind::NotFound,
            Status::EXISTS => ErrorKind::AlreadyExists,
            Status::TYPE_MISMATCH => ErrorKind::LayoutMismatch,
            Status::OUT_OF_RANGE => ErrorKind::Backend,
            Status::IO => ErrorKind::Io,
            Status::CORRUPT => ErrorKind::Corrupt,
            Status::BUSY => ErrorKind::Busy,
            Status::PERMISSION => ErrorKind::Permission,
            Status::UNSUPPORTED => ErrorKind::Usage,
            _ => ErrorKind::Backend,
        };
        Self::new(kind)
            .with_message(format!("{op} failed"))
            .with_status(status)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn available(&self) -> Option<u64> {
        self.available
    }

    pub fn requested(&self) -> Option<u64> {
        self.requested
    }

    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_capacity(mut self, available: u64, requested: u64) -> Self {
        self.available = Some(available);
        self.requested = Some(requested);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(status) = self.status {
            write!(f, " (status: {})", status.code())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::AlreadyExists => 4,
        ErrorKind::Busy => 5,
        ErrorKind::Permission => 6,
        ErrorKind::Corrupt => 7,
        ErrorKind::Io => 8,
        ErrorKind::UnsupportedShape => 9,
        ErrorKind::InsufficientCapacity => 10,
        ErrorKind::LayoutMismatch => 11,
        ErrorKind::InvalidHandle => 12,
        ErrorKind::Backend => 13,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, to_exit_code};
    use crate::core::record::Status;

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Usage, 2),
            (ErrorKind::NotFound, 3),
            (ErrorKind::AlreadyExists, 4),
            (ErrorKind::Busy, 5),
            (ErrorKind::Permission, 6),
            (ErrorKind::Corrupt, 7),
            (ErrorKind::Io, 8),
            (ErrorKind::UnsupportedShape, 9),
            (ErrorKind::InsufficientCapacity, 10),
            (ErrorKind::LayoutMismatch, 11),
            (ErrorKind::InvalidHandle, 12),
            (ErrorKind::Backend, 13),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn status_mapping_keeps_raw_code() {
        let err = Error::from_status("append", Status::INVALID_HANDLE);
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
        assert_eq!(err.status(), Some(Status::INVALID_HANDLE));

        let err = Error::from_status("read", Status::new(-42));
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert_eq!(err.status().map(|s| s.code()), Some(-42));
        assert_eq!(err.to_string(), "Backend: read failed (status: -42)");
    }

    #[test]
    fn capacity_error_reports_both_counts() {
        let err = Error::insufficient_capacity(1, 3);
        assert_eq!(err.kind(), ErrorKind::InsufficientCapacity);
        assert_eq!(err.available(), Some(1));
        assert_eq!(err.requested(), Some(3));
    }
}
