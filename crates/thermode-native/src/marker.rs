//! Marker channels to the acquisition system
//!
//! Markers are best-effort: callers log a failed write and carry on.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thermode_core::marker::Marker;

use crate::device::CloseOutcome;
use crate::error::MarkerError;

/// Marker device baud rate.
#[cfg(feature = "serial")]
pub const MARKER_BAUD_RATE: u32 = 9_600;

/// Marker write timeout.
#[cfg(feature = "serial")]
pub const MARKER_WRITE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// Sink for single-byte event markers.
pub trait MarkerChannel {
    /// Send one marker.
    fn write(&mut self, marker: Marker) -> Result<(), MarkerError>;

    /// Release the channel. Safe to call more than once.
    fn close(&mut self) -> CloseOutcome;

    /// Send a marker, logging instead of failing.
    ///
    /// Returns whether the marker was sent.
    fn write_best_effort(&mut self, marker: Marker) -> bool {
        match self.write(marker) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Marker {} not sent: {}", marker, e);
                false
            }
        }
    }
}

// ============================================================================
// Serial Marker Channel
// ============================================================================

/// Marker device on a serial port; each marker is one raw byte.
#[cfg(feature = "serial")]
pub struct SerialMarkerChannel {
    port_name: String,
    port: Option<Box<dyn serialport::SerialPort>>,
}

#[cfg(feature = "serial")]
impl SerialMarkerChannel {
    /// Open the marker device on `port_name`.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError::OpenFailed`] if the port cannot be opened.
    pub fn open(port_name: &str) -> Result<Self, MarkerError> {
        let port = serialport::new(port_name, MARKER_BAUD_RATE)
            .timeout(MARKER_WRITE_TIMEOUT)
            .open()
            .map_err(|e| MarkerError::OpenFailed {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!("Marker device connected on {}", port_name);

        Ok(Self {
            port_name: port_name.to_string(),
            port: Some(port),
        })
    }
}

#[cfg(feature = "serial")]
impl MarkerChannel for SerialMarkerChannel {
    fn write(&mut self, marker: Marker) -> Result<(), MarkerError> {
        use std::io::Write;

        let port = self.port.as_mut().ok_or(MarkerError::Closed)?;
        port.write_all(&[marker.to_byte()])?;
        port.flush()?;
        tracing::debug!("Marker {} sent", marker);
        Ok(())
    }

    fn close(&mut self) -> CloseOutcome {
        match self.port.take() {
            Some(_) => {
                tracing::info!("Marker device on {} closed", self.port_name);
                CloseOutcome::Closed
            }
            None => CloseOutcome::AlreadyClosed,
        }
    }
}

// ============================================================================
// Recording Marker Channel
// ============================================================================

#[derive(Debug, Default)]
struct RecordingState {
    sent: Vec<Marker>,
    failing: bool,
    closed: bool,
    close_calls: u32,
}

/// In-process marker channel that records every marker sent.
///
/// Clones share the record.
#[derive(Clone, Debug, Default)]
pub struct RecordingMarkerChannel {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingMarkerChannel {
    /// Create an open channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Markers sent so far.
    pub fn sent(&self) -> Vec<Marker> {
        self.lock().sent.clone()
    }

    /// How many times `marker` was sent.
    pub fn count(&self, marker: Marker) -> usize {
        self.lock().sent.iter().filter(|m| **m == marker).count()
    }

    /// Number of `close` calls, including repeated ones.
    pub fn close_calls(&self) -> u32 {
        self.lock().close_calls
    }

    /// Whether the channel is closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MarkerChannel for RecordingMarkerChannel {
    fn write(&mut self, marker: Marker) -> Result<(), MarkerError> {
        let mut state = self.lock();
        if state.closed {
            return Err(MarkerError::Closed);
        }
        if state.failing {
            return Err(MarkerError::Write(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated marker failure",
            )));
        }
        state.sent.push(marker);
        Ok(())
    }

    fn close(&mut self) -> CloseOutcome {
        let mut state = self.lock();
        state.close_calls += 1;
        if state.closed {
            CloseOutcome::AlreadyClosed
        } else {
            state.closed = true;
            CloseOutcome::Closed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermode_core::types::Zone;

    #[test]
    fn test_recording_channel() {
        let mut channel = RecordingMarkerChannel::new();
        channel.write(Marker::BEGIN).unwrap();
        channel.write(Marker::for_zone(Zone::Z1)).unwrap();
        assert_eq!(channel.sent(), vec![Marker::BEGIN, Marker::from_byte(1)]);
        assert_eq!(channel.count(Marker::BEGIN), 1);
    }

    #[test]
    fn test_best_effort_swallows_failure() {
        let mut channel = RecordingMarkerChannel::new();
        channel.set_failing(true);
        assert!(!channel.write_best_effort(Marker::END));
        assert!(channel.sent().is_empty());
        channel.set_failing(false);
        assert!(channel.write_best_effort(Marker::END));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut channel = RecordingMarkerChannel::new();
        assert_eq!(channel.close(), CloseOutcome::Closed);
        assert_eq!(channel.close(), CloseOutcome::AlreadyClosed);
        assert!(matches!(channel.write(Marker::END), Err(MarkerError::Closed)));
        assert_eq!(channel.close_calls(), 2);
    }
}
