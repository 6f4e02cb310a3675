//! In-process stimulator for dry runs and tests
//!
//! Clones share one state, so a test can keep a handle for inspection
//! while the session owns another.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use thermode_core::command::TcsCommand;
use thermode_core::config::DEFAULT_BASELINE_C;
use thermode_core::types::{ZoneVector, ZONE_COUNT};

use super::{CloseOutcome, ConfigTracker, DeviceController};
use crate::error::{DeviceError, DeviceResult};

#[derive(Debug)]
struct SimState {
    journal: Vec<TcsCommand>,
    close_calls: u32,
    closed: bool,
    fail_after: Option<usize>,
    config: ConfigTracker,
    baseline_c: f32,
    durations_s: ZoneVector,
    temperatures_c: ZoneVector,
    held_until: Option<Instant>,
}

/// Simulated five-zone stimulator.
///
/// Reports the commanded temperatures while a stimulus is held and the
/// baseline otherwise. Every command is journalled.
#[derive(Clone, Debug)]
pub struct SimulatedThermode {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedThermode {
    /// Create a connected simulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                journal: Vec::new(),
                close_calls: 0,
                closed: false,
                fail_after: None,
                config: ConfigTracker::default(),
                baseline_c: DEFAULT_BASELINE_C,
                durations_s: [0.0; ZONE_COUNT],
                temperatures_c: [DEFAULT_BASELINE_C; ZONE_COUNT],
                held_until: None,
            })),
        }
    }

    /// Disconnect after `commands` successful commands.
    #[must_use]
    pub fn failing_after(self, commands: usize) -> Self {
        self.lock().fail_after = Some(commands);
        self
    }

    /// Every command received, in order.
    pub fn journal(&self) -> Vec<TcsCommand> {
        self.lock().journal.clone()
    }

    /// Number of `stimulate` commands received.
    pub fn stimulus_count(&self) -> usize {
        self.lock()
            .journal
            .iter()
            .filter(|c| matches!(c, TcsCommand::Stimulate))
            .count()
    }

    /// Temperature vector in effect at each `stimulate`, in order.
    pub fn delivered(&self) -> Vec<ZoneVector> {
        let state = self.lock();
        let mut current = None;
        let mut delivered = Vec::new();
        for command in &state.journal {
            match command {
                TcsCommand::SetTemperatures(t) => current = Some(*t),
                TcsCommand::Stimulate => {
                    if let Some(t) = current {
                        delivered.push(t);
                    }
                }
                _ => {}
            }
        }
        delivered
    }

    /// Number of `close` calls, including repeated ones.
    pub fn close_calls(&self) -> u32 {
        self.lock().close_calls
    }

    /// Whether the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn execute(&self, command: TcsCommand) -> DeviceResult<MutexGuard<'_, SimState>> {
        let mut state = self.lock();
        if state.closed {
            return Err(DeviceError::Disconnected);
        }
        if state.fail_after.is_some_and(|n| state.journal.len() >= n) {
            tracing::warn!("Simulated stimulator dropped connection on {}", command.name());
            state.closed = true;
            return Err(DeviceError::Disconnected);
        }
        state.journal.push(command);
        Ok(state)
    }
}

impl Default for SimulatedThermode {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceController for SimulatedThermode {
    fn set_quiet_mode(&mut self) -> DeviceResult<()> {
        self.execute(TcsCommand::QuietMode).map(drop)
    }

    fn set_baseline(&mut self, baseline_c: f32) -> DeviceResult<()> {
        let mut state = self.execute(TcsCommand::SetBaseline(baseline_c))?;
        state.baseline_c = baseline_c;
        state.config.baseline();
        Ok(())
    }

    fn set_durations(&mut self, durations_s: ZoneVector) -> DeviceResult<()> {
        let mut state = self.execute(TcsCommand::SetDurations(durations_s))?;
        state.durations_s = durations_s;
        state.config.durations();
        Ok(())
    }

    fn set_ramp_up_speeds(&mut self, speeds: ZoneVector) -> DeviceResult<()> {
        let mut state = self.execute(TcsCommand::SetRampUp(speeds))?;
        state.config.ramp_up();
        Ok(())
    }

    fn set_ramp_down_speeds(&mut self, speeds: ZoneVector) -> DeviceResult<()> {
        let mut state = self.execute(TcsCommand::SetRampDown(speeds))?;
        state.config.ramp_down();
        Ok(())
    }

    fn set_temperatures(&mut self, temperatures_c: ZoneVector) -> DeviceResult<()> {
        let mut state = self.execute(TcsCommand::SetTemperatures(temperatures_c))?;
        state.temperatures_c = temperatures_c;
        state.config.temperatures();
        Ok(())
    }

    fn stimulate(&mut self) -> DeviceResult<()> {
        let mut state = self.execute(TcsCommand::Stimulate)?;
        debug_assert!(state.config.is_complete(), "stimulate before configuration");
        let hold_s = state.durations_s.iter().fold(0.0_f32, |acc, d| acc.max(*d));
        state.held_until = Some(Instant::now() + Duration::from_secs_f32(hold_s));
        Ok(())
    }

    fn get_temperatures(&mut self) -> DeviceResult<ZoneVector> {
        let state = self.execute(TcsCommand::ReadTemperatures)?;
        let holding = state.held_until.is_some_and(|until| Instant::now() < until);
        Ok(if holding {
            state.temperatures_c
        } else {
            [state.baseline_c; ZONE_COUNT]
        })
    }

    fn close(&mut self) -> CloseOutcome {
        let mut state = self.lock();
        state.close_calls += 1;
        if state.closed {
            CloseOutcome::AlreadyClosed
        } else {
            state.closed = true;
            tracing::info!("Simulated stimulator closed");
            CloseOutcome::Closed
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use thermode_core::types::{StimulusProfile, StimulusSpec, Zone};

    fn configured() -> SimulatedThermode {
        let mut device = SimulatedThermode::new();
        device.apply_profile(&StimulusProfile::uniform(32.0, 1)).unwrap();
        device
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut device = SimulatedThermode::new();
        assert_eq!(device.close(), CloseOutcome::Closed);
        assert_eq!(device.close(), CloseOutcome::AlreadyClosed);
        assert_eq!(device.close_calls(), 2);
        assert!(matches!(device.stimulate(), Err(DeviceError::Disconnected)));
    }

    #[test]
    fn test_deliver_journals_commands() {
        let mut device = configured();
        let spec = StimulusSpec::single_zone(StimulusProfile::uniform(32.0, 1), Zone::Z2, 48.0);
        device.deliver(&spec).unwrap();

        let journal = device.journal();
        assert_eq!(journal.len(), 6);
        assert_eq!(journal[0], TcsCommand::SetBaseline(32.0));
        assert_eq!(journal[5], TcsCommand::Stimulate);
        assert_eq!(device.stimulus_count(), 1);
        assert_eq!(device.delivered(), vec![spec.temperatures_c]);
    }

    #[test]
    fn test_fail_after_disconnects() {
        let mut device = SimulatedThermode::new().failing_after(2);
        device.set_quiet_mode().unwrap();
        device.set_baseline(32.0).unwrap();
        assert!(matches!(device.set_durations([1.0; 5]), Err(DeviceError::Disconnected)));
        assert!(device.is_closed());
        assert_eq!(device.close(), CloseOutcome::AlreadyClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_stimulus_while_held() {
        let mut device = configured();
        let spec = StimulusSpec::single_zone(StimulusProfile::uniform(32.0, 1), Zone::Z4, 50.0);
        device.deliver(&spec).unwrap();

        let during = device.get_temperatures().unwrap();
        assert_eq!(during[Zone::Z4.index()], 50.0);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let after = device.get_temperatures().unwrap();
        assert_eq!(after, [32.0; ZONE_COUNT]);
    }
}
