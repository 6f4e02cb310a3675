//! Error types for devices, markers, event logs and sessions.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use thermode_core::error::{ConfigError, FrameError};

// ============================================================================
// Device Errors
// ============================================================================

/// Errors raised by a stimulator connection.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Port could not be opened
    #[error("Cannot open stimulator on {port}: {reason}")]
    OpenFailed {
        /// Port name
        port: String,
        /// Underlying cause
        reason: String,
    },

    /// A command could not be written or answered
    #[error("Stimulator command {command} failed: {source}")]
    Command {
        /// Short command name
        command: &'static str,
        /// Transport error
        #[source]
        source: io::Error,
    },

    /// Connection already closed or dropped by the device
    #[error("Stimulator disconnected")]
    Disconnected,

    /// Temperature reply could not be parsed
    #[error("Malformed temperature frame: {0}")]
    MalformedFrame(#[from] FrameError),
}

/// Result type for stimulator operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

// ============================================================================
// Marker Errors
// ============================================================================

/// Errors raised by a marker channel.
#[derive(Debug, Error)]
pub enum MarkerError {
    /// Port could not be opened
    #[error("Cannot open marker device on {port}: {reason}")]
    OpenFailed {
        /// Port name
        port: String,
        /// Underlying cause
        reason: String,
    },

    /// Marker byte could not be written
    #[error("Marker write failed: {0}")]
    Write(#[from] io::Error),

    /// Channel already closed
    #[error("Marker channel closed")]
    Closed,
}

// ============================================================================
// Log Errors
// ============================================================================

/// Errors raised while creating or appending to event logs.
#[derive(Debug, Error)]
pub enum LogError {
    /// Directory could not be created
    #[error("Cannot create log directory {path}: {source}")]
    CreateDir {
        /// Directory path
        path: PathBuf,
        /// I/O error
        #[source]
        source: io::Error,
    },

    /// File could not be opened or written
    #[error("Cannot write log file {path}: {source}")]
    Write {
        /// File path
        path: PathBuf,
        /// I/O error
        #[source]
        source: io::Error,
    },
}

// ============================================================================
// Session Errors
// ============================================================================

/// Reasons a session fails to start or aborts.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Stimulator could not be opened or configured
    #[error("Device connection error: {0}")]
    DeviceConnection(#[source] DeviceError),

    /// Stimulator failed during an active trial
    #[error("Device disconnected during session: {0}")]
    DeviceDisconnected(#[source] DeviceError),

    /// Marker channel could not be opened
    #[error("Marker channel error: {0}")]
    MarkerChannel(#[from] MarkerError),

    /// Parameters rejected
    #[error("Invalid parameters: {0}")]
    ConfigValidation(#[from] ConfigError),

    /// Log directory or file unusable
    #[error("Logging path error: {0}")]
    LoggingPath(#[from] LogError),

    /// Entry point called in a phase that cannot accept it
    #[error("{action} not accepted while {phase}")]
    InvalidState {
        /// What was requested
        action: &'static str,
        /// Current phase description
        phase: String,
    },
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts() {
        let err: SessionError = ConfigError::EmptySubjectId.into();
        assert!(matches!(err, SessionError::ConfigValidation(_)));
        assert!(err.to_string().contains("Subject ID"));
    }

    #[test]
    fn test_log_error_carries_path() {
        let err = LogError::CreateDir {
            path: PathBuf::from("/nope/_HEAT_LOGS"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("_HEAT_LOGS"));
        let err: SessionError = err.into();
        assert!(matches!(err, SessionError::LoggingPath(_)));
    }

    #[test]
    fn test_invalid_state_message() {
        let err = SessionError::InvalidState {
            action: "response",
            phase: "awaiting start".to_string(),
        };
        assert_eq!(err.to_string(), "response not accepted while awaiting start");
    }
}
