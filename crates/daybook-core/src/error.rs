use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Usage,
    Validation,
    Connection,
    Timeout,
    Remote,
    Cache,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Usage = 2,
    Validation = 3,
    Connection = 4,
    Timeout = 5,
    Remote = 6,
    Cache = 7,
    Io = 8,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Tagged failure carried through every layer. The message is the
/// human-readable cause; the kind decides how the caller reacts.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
#[error("{message}")]
pub struct DaybookError {
    pub kind: ErrorKind,
    pub message: String,
}

impl DaybookError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Usage, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Remote, message)
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cache, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn not_initialized(what: &str) -> Self {
        Self::connection(format!("{what} is not initialized; call init first"))
    }

    pub fn is_connection_failure(&self) -> bool {
        matches!(self.kind, ErrorKind::Connection | ErrorKind::Timeout)
    }

    pub fn exit_code(&self) -> ExitCode {
        match self.kind {
            ErrorKind::Usage => ExitCode::Usage,
            ErrorKind::Validation => ExitCode::Validation,
            ErrorKind::Connection => ExitCode::Connection,
            ErrorKind::Timeout => ExitCode::Timeout,
            ErrorKind::Remote => ExitCode::Remote,
            ErrorKind::Cache => ExitCode::Cache,
            ErrorKind::Io => ExitCode::Io,
        }
    }
}

impl From<std::io::Error> for DaybookError {
    fn from(value: std::io::Error) -> Self {
        Self::io(value.to_string())
    }
}

impl From<&str> for DaybookError {
    fn from(value: &str) -> Self {
        Self::usage(value)
    }
}

impl From<String> for DaybookError {
    fn from(value: String) -> Self {
        Self::usage(value)
    }
}

impl<T: Display> From<(ErrorKind, T)> for DaybookError {
    fn from((kind, value): (ErrorKind, T)) -> Self {
        Self::new(kind, value.to_string())
    }
}

pub type DaybookResult<T> = Result<T, DaybookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_and_timeout_count_as_connection_failures() {
        assert!(DaybookError::connection("refused").is_connection_failure());
        assert!(DaybookError::timeout("10s elapsed").is_connection_failure());
        assert!(!DaybookError::remote("constraint").is_connection_failure());
        assert!(!DaybookError::cache("quota").is_connection_failure());
    }

    #[test]
    fn exit_codes_follow_kind() {
        assert_eq!(DaybookError::validation("x").exit_code(), ExitCode::Validation);
        assert_eq!(DaybookError::timeout("x").exit_code().as_i32(), 5);
        assert_eq!(
            DaybookError::from((ErrorKind::Remote, "rejected")).exit_code(),
            ExitCode::Remote
        );
    }
}
