//! Serial connection to the thermal stimulator
//!
//! Commands are written as ASCII frames (see [`thermode_core::command`]);
//! only the temperature read produces a reply.

use std::io::{Read, Write};
use std::time::Duration;

use thermode_core::command::{parse_temperature_frame, TcsCommand, TEMPERATURE_FRAME_LEN};
use thermode_core::types::ZoneVector;

use super::{CloseOutcome, ConfigTracker, DeviceController};
use crate::error::{DeviceError, DeviceResult};

/// Stimulator baud rate.
pub const STIMULATOR_BAUD_RATE: u32 = 115_200;

/// Read timeout for the temperature reply.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Stimulator over a serial port.
pub struct TcsDevice {
    port_name: String,
    port: Option<Box<dyn serialport::SerialPort>>,
    config: ConfigTracker,
}

impl TcsDevice {
    /// Open the stimulator on `port_name`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::OpenFailed`] if the port cannot be opened.
    pub fn open(port_name: &str) -> DeviceResult<Self> {
        let port = serialport::new(port_name, STIMULATOR_BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| DeviceError::OpenFailed {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!("Stimulator connected on {}", port_name);

        Ok(Self {
            port_name: port_name.to_string(),
            port: Some(port),
            config: ConfigTracker::default(),
        })
    }

    /// Port this connection was opened on.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn send(&mut self, command: TcsCommand) -> DeviceResult<()> {
        let port = self.port.as_mut().ok_or(DeviceError::Disconnected)?;
        let frame = command.encode();
        port.write_all(&frame)
            .and_then(|()| port.flush())
            .map_err(|source| DeviceError::Command { command: command.name(), source })?;
        tracing::trace!("-> {}", String::from_utf8_lossy(&frame));
        Ok(())
    }
}

impl DeviceController for TcsDevice {
    fn set_quiet_mode(&mut self) -> DeviceResult<()> {
        self.send(TcsCommand::QuietMode)
    }

    fn set_baseline(&mut self, baseline_c: f32) -> DeviceResult<()> {
        self.send(TcsCommand::SetBaseline(baseline_c))?;
        self.config.baseline();
        Ok(())
    }

    fn set_durations(&mut self, durations_s: ZoneVector) -> DeviceResult<()> {
        self.send(TcsCommand::SetDurations(durations_s))?;
        self.config.durations();
        Ok(())
    }

    fn set_ramp_up_speeds(&mut self, speeds: ZoneVector) -> DeviceResult<()> {
        self.send(TcsCommand::SetRampUp(speeds))?;
        self.config.ramp_up();
        Ok(())
    }

    fn set_ramp_down_speeds(&mut self, speeds: ZoneVector) -> DeviceResult<()> {
        self.send(TcsCommand::SetRampDown(speeds))?;
        self.config.ramp_down();
        Ok(())
    }

    fn set_temperatures(&mut self, temperatures_c: ZoneVector) -> DeviceResult<()> {
        self.send(TcsCommand::SetTemperatures(temperatures_c))?;
        self.config.temperatures();
        Ok(())
    }

    fn stimulate(&mut self) -> DeviceResult<()> {
        debug_assert!(self.config.is_complete(), "stimulate before configuration");
        self.send(TcsCommand::Stimulate)
    }

    fn get_temperatures(&mut self) -> DeviceResult<ZoneVector> {
        self.send(TcsCommand::ReadTemperatures)?;
        let port = self.port.as_mut().ok_or(DeviceError::Disconnected)?;
        let mut frame = [0u8; TEMPERATURE_FRAME_LEN];
        port.read_exact(&mut frame).map_err(|source| DeviceError::Command {
            command: TcsCommand::ReadTemperatures.name(),
            source,
        })?;
        Ok(parse_temperature_frame(&frame)?)
    }

    fn close(&mut self) -> CloseOutcome {
        match self.port.take() {
            Some(_) => {
                tracing::info!("Stimulator on {} closed", self.port_name);
                CloseOutcome::Closed
            }
            None => CloseOutcome::AlreadyClosed,
        }
    }
}

/// List available serial ports.
#[must_use]
pub fn list_ports() -> Vec<String> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .unwrap_or_default()
}
