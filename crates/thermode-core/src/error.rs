//! Error types for thermode core
//!
//! These errors work in `no_std` environments and carry enough context to
//! tell the operator which parameter to correct.

use core::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration Errors
// ============================================================================

/// Rejected session parameters.
///
/// A session never starts with parameters that produced one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigError {
    /// Subject identifier is empty
    EmptySubjectId,
    /// Session identifier is empty
    EmptySession,
    /// A device port name is empty
    EmptyPort {
        /// Which device the port belongs to
        role: &'static str,
    },
    /// Active temperature outside the allowed set
    TemperatureNotAllowed {
        /// Requested temperature in °C
        requested_c: u8,
        /// Lowest allowed temperature in °C
        minimum_c: u8,
        /// Highest allowed temperature in °C
        maximum_c: u8,
    },
    /// Baseline outside the range the stimulator accepts
    BaselineOutOfRange {
        /// Requested baseline in °C
        requested_c: f32,
        /// Lowest accepted baseline in °C
        minimum_c: f32,
        /// Highest accepted baseline in °C
        maximum_c: f32,
    },
    /// Active temperature below the baseline
    ActiveBelowBaseline {
        /// Active temperature in °C
        active_c: u8,
        /// Baseline in °C
        baseline_c: f32,
    },
    /// Hold duration of zero seconds
    ZeroHoldDuration,
    /// Hold duration longer than the stimulator can be told
    HoldOutOfRange {
        /// Requested hold in seconds
        requested_s: u32,
        /// Longest accepted hold in seconds
        maximum_s: u32,
    },
    /// Total cyclic duration too short for one stimulus and interval
    TotalDurationTooShort {
        /// Requested total in seconds
        requested_s: u32,
        /// Value the total must exceed, in seconds
        must_exceed_s: u32,
    },
    /// Inter-trial interval set is empty or malformed
    InvalidIntervalSet {
        /// Description of the issue
        reason: &'static str,
    },
    /// Cyclic zone order is not a permutation of the five zones
    InvalidZoneOrder,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySubjectId => write!(f, "Subject ID must not be empty"),
            Self::EmptySession => write!(f, "Session must not be empty"),
            Self::EmptyPort { role } => write!(f, "{role} port must not be empty"),
            Self::TemperatureNotAllowed { requested_c, minimum_c, maximum_c } => {
                write!(
                    f,
                    "Temperature {requested_c}°C not allowed, use integers between {minimum_c} and {maximum_c}"
                )
            }
            Self::BaselineOutOfRange { requested_c, minimum_c, maximum_c } => {
                write!(
                    f,
                    "Baseline {requested_c}°C outside accepted range {minimum_c}–{maximum_c}°C"
                )
            }
            Self::ActiveBelowBaseline { active_c, baseline_c } => {
                write!(f, "Temperature {active_c}°C is below baseline {baseline_c}°C")
            }
            Self::ZeroHoldDuration => write!(f, "Hold duration must be at least one full second"),
            Self::HoldOutOfRange { requested_s, maximum_s } => {
                write!(f, "Hold duration {requested_s}s too long, at most {maximum_s}s")
            }
            Self::TotalDurationTooShort { requested_s, must_exceed_s } => {
                write!(
                    f,
                    "Total duration {requested_s}s too short, it has to exceed {must_exceed_s}s"
                )
            }
            Self::InvalidIntervalSet { reason } => write!(f, "Invalid interval set: {reason}"),
            Self::InvalidZoneOrder => {
                write!(f, "Zone order must visit each of the five zones exactly once")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

// ============================================================================
// Frame Errors
// ============================================================================

/// Malformed reply from the stimulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameError {
    /// Reply shorter than a full temperature frame
    Incomplete {
        /// Bytes received
        received: usize,
        /// Bytes expected
        expected: usize,
    },
    /// Non-digit byte where a temperature digit was expected
    InvalidDigit {
        /// Offset of the offending byte
        offset: usize,
        /// The byte found there
        byte: u8,
    },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete { received, expected } => {
                write!(f, "Incomplete temperature frame: got {received}/{expected} bytes")
            }
            Self::InvalidDigit { offset, byte } => {
                write!(f, "Invalid digit 0x{byte:02X} at offset {offset}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::TemperatureNotAllowed {
            requested_c: 61,
            minimum_c: 32,
            maximum_c: 60,
        };
        assert!(err.to_string().contains("between 32 and 60"));

        let err = ConfigError::TotalDurationTooShort { requested_s: 10, must_exceed_s: 14 };
        assert!(err.to_string().contains("exceed 14s"));
    }

    #[test]
    fn test_frame_error_message() {
        let err = FrameError::InvalidDigit { offset: 5, byte: b'x' };
        assert_eq!(err.to_string(), "Invalid digit 0x78 at offset 5");
    }
}
