//! Ascending staircase threshold search
//!
//! ```text
//! AwaitingStart --ready--> Stimulating --hold + 0.5 s--> AwaitingResponse
//!                               ^                              |
//!                               +-------- not painful ---------+
//!                                                              |
//!                 Terminal(ThresholdFound | MaxExceeded) <-----+
//! ```
//!
//! Any phase can be aborted by the operator.

use std::fmt;

use thermode_core::config::{SessionParameters, THRESHOLD_RESPONSE_MARGIN};
use thermode_core::staircase::{StaircaseOutcome, StaircaseState};
use thermode_core::types::{Response, StimulusProfile, StimulusSpec, TrialRecord};

use super::wall_clock_now;
use crate::clock::Clock;
use crate::device::DeviceController;
use crate::error::{LogError, SessionError, SessionResult};
use crate::logger::ThresholdLog;
use crate::selector::SpatialSelector;

/// How a threshold search ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ThresholdEnd {
    /// Subject reported pain
    ThresholdFound {
        /// Confirmed threshold (°C)
        threshold_c: u8,
    },
    /// Ceiling passed without a painful answer
    MaxExceeded {
        /// Temperature that would have been next (°C)
        attempted_c: u8,
    },
    /// Stopped by the operator or by a failure
    Aborted,
}

/// Phase of a threshold search.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ThresholdPhase {
    /// Waiting for the operator's ready signal
    AwaitingStart,
    /// Stimulus issued, hold window open
    Stimulating,
    /// Waiting for the subject's answer
    AwaitingResponse,
    /// Search over
    Terminal(ThresholdEnd),
}

impl ThresholdPhase {
    /// Whether the search is over.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

impl fmt::Display for ThresholdPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingStart => write!(f, "awaiting start"),
            Self::Stimulating => write!(f, "stimulating"),
            Self::AwaitingResponse => write!(f, "awaiting response"),
            Self::Terminal(ThresholdEnd::ThresholdFound { threshold_c }) => {
                write!(f, "threshold found at {threshold_c}°C")
            }
            Self::Terminal(ThresholdEnd::MaxExceeded { attempted_c }) => {
                write!(f, "max temperature exceeded ({attempted_c}°C)")
            }
            Self::Terminal(ThresholdEnd::Aborted) => write!(f, "aborted"),
        }
    }
}

/// Threshold search state machine.
pub struct ThresholdProcedure<C: Clock> {
    profile: StimulusProfile,
    staircase: StaircaseState,
    selector: SpatialSelector,
    log: ThresholdLog,
    clock: C,
    phase: ThresholdPhase,
    pending: Option<StimulusSpec>,
    issued: Vec<StimulusSpec>,
    trials: Vec<TrialRecord>,
}

impl<C: Clock> ThresholdProcedure<C> {
    /// Prepare a search starting at the parameters' start temperature.
    pub fn new(
        params: &SessionParameters,
        log: ThresholdLog,
        selector: SpatialSelector,
        clock: C,
    ) -> Self {
        Self {
            profile: params.profile(),
            staircase: StaircaseState::new(params.active_temperature_c()),
            selector,
            log,
            clock,
            phase: ThresholdPhase::AwaitingStart,
            pending: None,
            issued: Vec::new(),
            trials: Vec::new(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ThresholdPhase {
        self.phase
    }

    /// Staircase state.
    pub fn staircase(&self) -> &StaircaseState {
        &self.staircase
    }

    /// Answered trials, in order.
    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    /// Every stimulus issued, in order.
    pub fn issued(&self) -> &[StimulusSpec] {
        &self.issued
    }

    /// The session log.
    pub fn log(&self) -> &ThresholdLog {
        &self.log
    }

    /// Operator ready signal: present the first stimulus.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] outside `AwaitingStart`; a device
    /// failure aborts the search and is returned.
    pub fn on_ready<D: DeviceController>(&mut self, device: &mut D) -> SessionResult<ThresholdPhase> {
        if self.phase != ThresholdPhase::AwaitingStart {
            return Err(self.invalid("ready"));
        }
        tracing::info!("Threshold search started at {}°C", self.staircase.current_c());
        self.present(device)
    }

    /// Subject answer to the stimulus just held.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] outside `AwaitingResponse`; device or
    /// log failures abort the search and are returned.
    pub fn on_response<D: DeviceController>(
        &mut self,
        painful: bool,
        device: &mut D,
    ) -> SessionResult<ThresholdPhase> {
        if self.phase != ThresholdPhase::AwaitingResponse {
            return Err(self.invalid("response"));
        }

        let response = Response::from_painful(painful);
        let temperature_c = self.staircase.current_c();
        let Some(spec) = self.pending.take() else {
            return Err(self.invalid("response"));
        };

        let logged = self.log.trial(temperature_c, response);
        self.guard(logged)?;
        self.trials.push(TrialRecord {
            elapsed_ms: self.clock.now().as_millis() as u64,
            wall_clock: wall_clock_now(),
            marker: spec.marker(),
            temperature_c: Some(f32::from(temperature_c)),
            response: Some(response),
        });
        tracing::info!("{}°C on {}: {:?}", temperature_c, spec.active_zone, response);

        match self.staircase.record(response) {
            Some(StaircaseOutcome::ThresholdFound { threshold_c }) => {
                let logged = self.log.threshold(threshold_c);
                self.guard(logged)?;
                tracing::info!("Threshold: {}°C", threshold_c);
                self.phase = ThresholdPhase::Terminal(ThresholdEnd::ThresholdFound { threshold_c });
                Ok(self.phase)
            }
            Some(StaircaseOutcome::MaxExceeded { attempted_c }) => {
                let logged = self.log.max_exceeded(attempted_c);
                self.guard(logged)?;
                tracing::warn!("Max temp exceeded: {}°C", attempted_c);
                self.phase = ThresholdPhase::Terminal(ThresholdEnd::MaxExceeded { attempted_c });
                Ok(self.phase)
            }
            None => self.present(device),
        }
    }

    /// Map a key press to the matching entry point.
    ///
    /// Space or enter is the ready signal, `y`/`n` answer. Anything else,
    /// or a key that does not fit the phase, is ignored.
    ///
    /// # Errors
    ///
    /// As [`Self::on_ready`] and [`Self::on_response`].
    pub fn on_key<D: DeviceController>(&mut self, key: char, device: &mut D) -> SessionResult<ThresholdPhase> {
        match (self.phase, key) {
            (ThresholdPhase::AwaitingStart, ' ' | '\n' | '\r') => self.on_ready(device),
            (ThresholdPhase::AwaitingResponse, key) => match Response::from_key(key) {
                Some(response) => self.on_response(response.is_painful(), device),
                None => {
                    tracing::debug!("Ignoring key {:?} while {}", key, self.phase);
                    Ok(self.phase)
                }
            },
            _ => {
                tracing::debug!("Ignoring key {:?} while {}", key, self.phase);
                Ok(self.phase)
            }
        }
    }

    /// Operator stop. Moves any live phase to `Terminal(Aborted)`.
    pub fn on_stop(&mut self) -> ThresholdPhase {
        if !self.phase.is_terminal() {
            tracing::info!("Threshold search aborted while {}", self.phase);
            self.pending = None;
            self.phase = ThresholdPhase::Terminal(ThresholdEnd::Aborted);
        }
        self.phase
    }

    /// Issue a stimulus at the current temperature and block for the hold.
    fn present<D: DeviceController>(&mut self, device: &mut D) -> SessionResult<ThresholdPhase> {
        debug_assert!(self.pending.is_none(), "trial already in flight");
        debug_assert!(self.staircase.current_c() <= self.staircase.ceiling_c());

        self.phase = ThresholdPhase::Stimulating;
        let zone = self.selector.next_zone();
        let spec = StimulusSpec::single_zone(self.profile, zone, f32::from(self.staircase.current_c()));

        let delivered = device
            .apply_profile(&self.profile)
            .and_then(|()| device.deliver(&spec));
        if let Err(e) = delivered {
            tracing::error!("Stimulus failed, aborting: {}", e);
            self.phase = ThresholdPhase::Terminal(ThresholdEnd::Aborted);
            return Err(SessionError::DeviceDisconnected(e));
        }
        tracing::debug!("Stimulus {}°C on {}", spec.active_c, zone);
        self.pending = Some(spec);
        self.issued.push(spec);

        let hold = self.profile.longest_hold_s();
        self.clock
            .sleep(std::time::Duration::from_secs_f32(hold) + THRESHOLD_RESPONSE_MARGIN);

        self.phase = ThresholdPhase::AwaitingResponse;
        Ok(self.phase)
    }

    fn guard<T>(&mut self, result: Result<T, LogError>) -> SessionResult<T> {
        result.map_err(|e| {
            tracing::error!("Threshold log failed, aborting: {}", e);
            self.pending = None;
            self.phase = ThresholdPhase::Terminal(ThresholdEnd::Aborted);
            SessionError::LoggingPath(e)
        })
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidState {
            action,
            phase: self.phase.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::device::SimulatedThermode;
    use crate::logger::LogLayout;
    use chrono::Local;
    use thermode_core::command::TcsCommand;

    fn procedure(
        dir: &std::path::Path,
        start_c: u8,
    ) -> (ThresholdProcedure<ManualClock>, ManualClock) {
        let params = SessionParameters::threshold("S01", "A", "SIM", start_c);
        let log = ThresholdLog::create(&LogLayout::new(dir), "S01", "A", &Local::now()).unwrap();
        let clock = ManualClock::new();
        let search = ThresholdProcedure::new(&params, log, SpatialSelector::uniform_seeded(3), clock.clone());
        (search, clock)
    }

    #[test]
    fn test_painful_on_third_trial() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut search, clock) = procedure(tmp.path(), 46);
        let mut device = SimulatedThermode::new();

        assert_eq!(search.on_ready(&mut device).unwrap(), ThresholdPhase::AwaitingResponse);
        search.on_response(false, &mut device).unwrap();
        search.on_response(false, &mut device).unwrap();
        let phase = search.on_response(true, &mut device).unwrap();

        assert_eq!(phase, ThresholdPhase::Terminal(ThresholdEnd::ThresholdFound { threshold_c: 48 }));
        assert_eq!(search.trials().len(), 3);
        assert_eq!(device.stimulus_count(), 3);
        // hold 1 s + 0.5 s margin per trial
        assert_eq!(clock.now(), Duration::from_millis(4_500));

        let text = std::fs::read_to_string(search.log().path()).unwrap();
        assert!(text.ends_with("Temperature: 48\nResponse: Y\n\nThreshold: 48\n"));
        assert_eq!(text.matches("Temperature:").count(), 3);
    }

    #[test]
    fn test_max_exceeded_after_fifteen_trials() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut search, _clock) = procedure(tmp.path(), 46);
        let mut device = SimulatedThermode::new();

        let mut phase = search.on_ready(&mut device).unwrap();
        while !phase.is_terminal() {
            phase = search.on_response(false, &mut device).unwrap();
        }

        assert_eq!(phase, ThresholdPhase::Terminal(ThresholdEnd::MaxExceeded { attempted_c: 61 }));
        assert_eq!(search.trials().len(), 15);
        assert_eq!(device.stimulus_count(), 15);

        let active: Vec<f32> = search.issued().iter().map(|s| s.active_c).collect();
        assert_eq!(active.first(), Some(&46.0));
        assert_eq!(active.last(), Some(&60.0));
        assert!(active.windows(2).all(|w| w[1] - w[0] == 1.0));
        assert!(device.delivered().iter().flatten().all(|t| *t <= 60.0));

        let text = std::fs::read_to_string(search.log().path()).unwrap();
        assert!(text.ends_with("\nMax temp exceeded: 61\n"));
    }

    #[test]
    fn test_one_heated_zone_matches_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut search, _clock) = procedure(tmp.path(), 50);
        let mut device = SimulatedThermode::new();

        search.on_ready(&mut device).unwrap();
        for _ in 0..5 {
            search.on_response(false, &mut device).unwrap();
        }
        search.on_stop();

        for (spec, record) in search.issued().iter().zip(search.trials()) {
            let heated: Vec<_> = spec.heated_zones().collect();
            assert_eq!(heated.len(), 1);
            assert_eq!(record.marker.zone(), Some(heated[0]));
        }
    }

    #[test]
    fn test_full_profile_before_every_stimulus() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut search, _clock) = procedure(tmp.path(), 46);
        let mut device = SimulatedThermode::new();

        search.on_ready(&mut device).unwrap();
        search.on_response(false, &mut device).unwrap();

        let journal = device.journal();
        assert_eq!(journal.len(), 12);
        assert!(matches!(journal[0], TcsCommand::SetBaseline(_)));
        assert!(matches!(journal[4], TcsCommand::SetTemperatures(_)));
        assert_eq!(journal[5], TcsCommand::Stimulate);
        assert_eq!(journal[11], TcsCommand::Stimulate);
    }

    #[test]
    fn test_keys_outside_mapping_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut search, _clock) = procedure(tmp.path(), 46);
        let mut device = SimulatedThermode::new();

        assert_eq!(search.on_key('y', &mut device).unwrap(), ThresholdPhase::AwaitingStart);
        assert_eq!(search.on_key(' ', &mut device).unwrap(), ThresholdPhase::AwaitingResponse);
        assert_eq!(search.on_key('x', &mut device).unwrap(), ThresholdPhase::AwaitingResponse);
        assert_eq!(search.on_key(' ', &mut device).unwrap(), ThresholdPhase::AwaitingResponse);
        assert_eq!(device.stimulus_count(), 1);
        assert_eq!(search.on_key('N', &mut device).unwrap(), ThresholdPhase::AwaitingResponse);
        assert_eq!(search.staircase().current_c(), 47);
        assert!(search.on_key('Y', &mut device).unwrap().is_terminal());
    }

    #[test]
    fn test_out_of_phase_calls_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut search, _clock) = procedure(tmp.path(), 46);
        let mut device = SimulatedThermode::new();

        assert!(matches!(
            search.on_response(true, &mut device),
            Err(SessionError::InvalidState { action: "response", .. })
        ));
        search.on_ready(&mut device).unwrap();
        assert!(search.on_ready(&mut device).is_err());
        assert_eq!(device.stimulus_count(), 1);
    }

    #[test]
    fn test_device_failure_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut search, _clock) = procedure(tmp.path(), 46);
        // one trial is six commands
        let mut device = SimulatedThermode::new().failing_after(8);

        search.on_ready(&mut device).unwrap();
        let err = search.on_response(false, &mut device).unwrap_err();
        assert!(matches!(err, SessionError::DeviceDisconnected(_)));
        assert_eq!(search.phase(), ThresholdPhase::Terminal(ThresholdEnd::Aborted));
        assert_eq!(search.trials().len(), 1);
    }

    #[test]
    fn test_stop_is_terminal() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut search, _clock) = procedure(tmp.path(), 46);
        let mut device = SimulatedThermode::new();

        search.on_ready(&mut device).unwrap();
        assert_eq!(search.on_stop(), ThresholdPhase::Terminal(ThresholdEnd::Aborted));
        assert!(search.on_response(true, &mut device).is_err());
        assert_eq!(search.on_key(' ', &mut device).unwrap(), ThresholdPhase::Terminal(ThresholdEnd::Aborted));
        assert_eq!(device.stimulus_count(), 1);
    }
}
