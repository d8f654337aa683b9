//! Error types for Landns

use std::fmt;

use thiserror::Error;

/// Main error type for the server.
///
/// The three base variants mirror where a failure originated: a bug or
/// driver fault inside this process, a collaborator outside it, or the
/// caller's input.
#[derive(Error, Debug)]
pub enum Error {
    #[error("InternalError: {0}")]
    Internal(String),

    #[error("ExternalError: {0}")]
    External(String),

    #[error("ArgumentError: {0}")]
    Argument(String),

    #[error("no such record: {0}")]
    NoSuchRecord(i64),

    #[error(transparent)]
    Set(#[from] ErrorSet),
}

impl Error {
    /// Internal error wrapping an origin; the origin is surfaced in the message.
    pub fn internal(message: impl Into<String>, origin: impl fmt::Display) -> Self {
        Error::Internal(format!("{}: {}", message.into(), origin))
    }

    /// External error wrapping an origin.
    pub fn external(message: impl Into<String>, origin: impl fmt::Display) -> Self {
        Error::External(format!("{}: {}", message.into(), origin))
    }

    /// Argument error wrapping an origin.
    pub fn argument(message: impl Into<String>, origin: impl fmt::Display) -> Self {
        Error::Argument(format!("{}: {}", message.into(), origin))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::internal("database fault", err)
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::external("redis fault", err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::external("io fault", err)
    }
}

impl From<hickory_proto::ProtoError> for Error {
    fn from(err: hickory_proto::ProtoError) -> Self {
        Error::external("dns protocol fault", err)
    }
}

/// Result type alias for the server.
pub type Result<T> = std::result::Result<T, Error>;

/// A list of errors collected from independent operations, one line each.
#[derive(Debug, Default)]
pub struct ErrorSet(pub Vec<Error>);

impl ErrorSet {
    pub fn new() -> Self {
        ErrorSet(Vec::new())
    }

    pub fn push(&mut self, err: Error) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ok when nothing was collected, otherwise the aggregate error.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Set(self))
        }
    }
}

impl fmt::Display for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

impl std::error::Error for ErrorSet {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Internal("boom".to_string());
        assert_eq!(err.to_string(), "InternalError: boom");

        let err = Error::external("failed to get records", "connection refused");
        assert_eq!(
            err.to_string(),
            "ExternalError: failed to get records: connection refused"
        );

        let err = Error::NoSuchRecord(42);
        assert_eq!(err.to_string(), "no such record: 42");
    }

    #[test]
    fn test_error_set_display() {
        let mut set = ErrorSet::new();
        set.push(Error::Argument("line 1: invalid format: x".to_string()));
        set.push(Error::Argument("line 3: invalid format: y".to_string()));

        assert_eq!(
            set.to_string(),
            "ArgumentError: line 1: invalid format: x\nArgumentError: line 3: invalid format: y"
        );
    }

    #[test]
    fn test_error_set_into_result() {
        assert!(ErrorSet::new().into_result().is_ok());

        let mut set = ErrorSet::new();
        set.push(Error::Internal("boom".to_string()));
        assert!(set.into_result().is_err());
    }
}
