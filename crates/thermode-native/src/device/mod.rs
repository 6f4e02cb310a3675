//! Thermal stimulator connections
//!
//! [`DeviceController`] is the command surface every session drives.
//! Implementations:
//!
//! - [`TcsDevice`]: serial connection to the stimulator (`serial` feature)
//! - [`SimulatedThermode`]: in-process stimulator that journals commands
//!
//! # Sequencing
//!
//! Baseline, durations, both ramp speeds and temperatures must all be set
//! before [`DeviceController::stimulate`]. Calling it earlier is a
//! programming error and trips a debug assertion.

mod simulated;
#[cfg(feature = "serial")]
mod tcs;

pub use simulated::SimulatedThermode;
#[cfg(feature = "serial")]
pub use tcs::{list_ports, TcsDevice};

use thermode_core::types::{StimulusProfile, StimulusSpec, ZoneVector};

use crate::error::DeviceResult;

/// Result of a `close()` call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The connection was open and is now closed
    Closed,
    /// The connection was already closed; nothing was done
    AlreadyClosed,
}

/// Command surface of a five-zone thermal stimulator.
pub trait DeviceController {
    /// Silence unsolicited device output.
    fn set_quiet_mode(&mut self) -> DeviceResult<()>;

    /// Set the resting temperature of every zone (°C).
    fn set_baseline(&mut self, baseline_c: f32) -> DeviceResult<()>;

    /// Set the hold duration per zone (s).
    fn set_durations(&mut self, durations_s: ZoneVector) -> DeviceResult<()>;

    /// Set the ramp-up speed per zone (°C/s).
    fn set_ramp_up_speeds(&mut self, speeds: ZoneVector) -> DeviceResult<()>;

    /// Set the ramp-down speed per zone (°C/s).
    fn set_ramp_down_speeds(&mut self, speeds: ZoneVector) -> DeviceResult<()>;

    /// Set the target temperature per zone (°C).
    fn set_temperatures(&mut self, temperatures_c: ZoneVector) -> DeviceResult<()>;

    /// Deliver the configured stimulus.
    fn stimulate(&mut self) -> DeviceResult<()>;

    /// Read the live temperature of every zone (°C).
    fn get_temperatures(&mut self) -> DeviceResult<ZoneVector>;

    /// Release the connection. Safe to call more than once.
    fn close(&mut self) -> CloseOutcome;

    /// Send baseline, durations and ramp speeds.
    fn apply_profile(&mut self, profile: &StimulusProfile) -> DeviceResult<()> {
        self.set_baseline(profile.baseline_c)?;
        self.set_durations(profile.durations_s)?;
        self.set_ramp_up_speeds(profile.ramp_up_c_per_s)?;
        self.set_ramp_down_speeds(profile.ramp_down_c_per_s)
    }

    /// Send the temperature vector, then stimulate.
    fn deliver(&mut self, spec: &StimulusSpec) -> DeviceResult<()> {
        self.set_temperatures(spec.temperatures_c)?;
        self.stimulate()
    }
}

/// Which configuration commands a connection has received.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ConfigTracker {
    baseline: bool,
    durations: bool,
    ramp_up: bool,
    ramp_down: bool,
    temperatures: bool,
}

impl ConfigTracker {
    pub(crate) fn baseline(&mut self) {
        self.baseline = true;
    }

    pub(crate) fn durations(&mut self) {
        self.durations = true;
    }

    pub(crate) fn ramp_up(&mut self) {
        self.ramp_up = true;
    }

    pub(crate) fn ramp_down(&mut self) {
        self.ramp_down = true;
    }

    pub(crate) fn temperatures(&mut self) {
        self.temperatures = true;
    }

    /// Every command required before `stimulate` has been sent.
    pub(crate) fn is_complete(&self) -> bool {
        self.baseline && self.durations && self.ramp_up && self.ramp_down && self.temperatures
    }
}
