//! Cyclic fixed-temperature stimulation
//!
//! ```text
//! Idle --start--> Running --step--> Running ... --elapsed >= total--> Terminal(Completed)
//!                    |
//!                    +--stop--> Terminal(Stopped)
//! ```
//!
//! Each step stimulates the next zone of the cyclic order, samples the
//! stimulator through the hold window and returns the delay until the
//! next step. The caller owns the wait, so a stop can arrive during it; a
//! step that runs after the procedure left `Running` does nothing.

use std::fmt;
use std::time::Duration;

use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{Instant, MissedTickBehavior};

use thermode_core::config::{
    CyclicParameters, IntervalSet, SessionParameters, CYCLIC_SAMPLING_MARGIN,
};
use thermode_core::marker::Marker;
use thermode_core::types::{StimulusProfile, StimulusSpec, TrialRecord, ZoneVector};

use super::wall_clock_now;
use crate::device::DeviceController;
use crate::error::{DeviceError, DeviceResult, LogError, SessionError, SessionResult};
use crate::logger::CyclicLog;
use crate::marker::MarkerChannel;
use crate::selector::SpatialSelector;

/// Temperature sampling cadence during the hold window.
pub const SAMPLE_PERIOD: Duration = Duration::from_millis(50);

/// How a cyclic session ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CyclicEnd {
    /// Total duration elapsed
    Completed,
    /// Operator stop
    Stopped,
    /// Device or log failure
    Aborted,
}

/// Phase of a cyclic session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CyclicPhase {
    /// Not started
    Idle,
    /// Trials in progress
    Running,
    /// Session over
    Terminal(CyclicEnd),
}

impl CyclicPhase {
    /// Whether the session is over.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

impl fmt::Display for CyclicPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Terminal(end) => write!(f, "{end:?}"),
        }
    }
}

/// What the caller should do after a step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Run the next step after this delay
    Scheduled(Duration),
    /// Total duration reached; end marker sent
    Completed,
    /// Procedure not running; nothing was done
    Inactive,
}

/// Cyclic session state machine.
pub struct CyclicProcedure {
    profile: StimulusProfile,
    target_c: u8,
    hold: Duration,
    intervals: IntervalSet,
    lead_in: Duration,
    selector: SpatialSelector,
    rng: StdRng,
    log: CyclicLog,
    phase: CyclicPhase,
    begin: Option<Instant>,
    announced: bool,
    trial: u32,
    issued: Vec<StimulusSpec>,
    trials: Vec<TrialRecord>,
    captures: Vec<Vec<ZoneVector>>,
}

impl CyclicProcedure {
    /// Prepare a session from validated parameters.
    pub fn new(params: &SessionParameters, cyclic: &CyclicParameters, log: CyclicLog) -> Self {
        Self::with_rng(params, cyclic, log, StdRng::from_entropy())
    }

    /// As [`Self::new`] with a fixed seed for the interval draws.
    pub fn seeded(params: &SessionParameters, cyclic: &CyclicParameters, log: CyclicLog, seed: u64) -> Self {
        Self::with_rng(params, cyclic, log, StdRng::seed_from_u64(seed))
    }

    fn with_rng(params: &SessionParameters, cyclic: &CyclicParameters, log: CyclicLog, rng: StdRng) -> Self {
        let total = Duration::from_secs(u64::from(cyclic.total_duration_s));
        Self {
            profile: params.profile(),
            target_c: cyclic.target_temp_c,
            hold: params.hold_duration(),
            intervals: cyclic.intervals,
            lead_in: Duration::from_millis(u64::from(cyclic.lead_in_ms)),
            selector: SpatialSelector::cyclic(cyclic.zone_order, total),
            rng,
            log,
            phase: CyclicPhase::Idle,
            begin: None,
            announced: false,
            trial: 0,
            issued: Vec::new(),
            trials: Vec::new(),
            captures: Vec::new(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> CyclicPhase {
        self.phase
    }

    /// Marker events, in order (begin, zones, end).
    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    /// Every stimulus issued, in order.
    pub fn issued(&self) -> &[StimulusSpec] {
        &self.issued
    }

    /// Temperature samples of each trial, in order.
    pub fn captures(&self) -> &[Vec<ZoneVector>] {
        &self.captures
    }

    /// The session logs.
    pub fn log(&self) -> &CyclicLog {
        &self.log
    }

    /// Time since the begin marker.
    pub fn elapsed(&self) -> Duration {
        self.begin.map_or(Duration::ZERO, |b| b.elapsed())
    }

    /// Send and log the begin marker, then run or schedule the first step.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] unless `Idle`; log or device
    /// failures abort the session.
    pub async fn start<D, M>(&mut self, device: &mut D, marker: &mut M) -> SessionResult<StepOutcome>
    where
        D: DeviceController,
        M: MarkerChannel,
    {
        if self.phase != CyclicPhase::Idle {
            return Err(SessionError::InvalidState {
                action: "start",
                phase: self.phase.to_string(),
            });
        }

        self.begin = Some(Instant::now());
        self.phase = CyclicPhase::Running;
        let logged = self.record(Marker::BEGIN, None);
        self.guard(logged, marker)?;
        marker.write_best_effort(Marker::BEGIN);
        self.announced = true;
        tracing::info!("Cyclic session started: {}°C", self.target_c);

        if self.lead_in.is_zero() {
            self.step(device, marker).await
        } else {
            Ok(StepOutcome::Scheduled(self.lead_in))
        }
    }

    /// Run one trial, or finish the session once the total has elapsed.
    ///
    /// # Errors
    ///
    /// Device and log failures abort the session and are returned.
    pub async fn step<D, M>(&mut self, device: &mut D, marker: &mut M) -> SessionResult<StepOutcome>
    where
        D: DeviceController,
        M: MarkerChannel,
    {
        if self.phase != CyclicPhase::Running {
            tracing::debug!("Step skipped while {}", self.phase);
            return Ok(StepOutcome::Inactive);
        }

        let elapsed = self.elapsed();
        let remaining = self
            .selector
            .schedule()
            .is_some_and(|schedule| schedule.has_remaining(elapsed));
        if !remaining {
            tracing::info!("Total duration reached after {} trials", self.trial);
            self.finish(CyclicEnd::Completed, marker)?;
            return Ok(StepOutcome::Completed);
        }

        let zone = self.selector.next_zone();
        let spec = StimulusSpec::single_zone(self.profile, zone, f32::from(self.target_c));
        self.trial += 1;

        let logged = self.record(spec.marker(), Some(f32::from(self.target_c)));
        self.guard(logged, marker)?;
        marker.write_best_effort(spec.marker());

        if let Err(e) = device.deliver(&spec) {
            return Err(self.abort_device(e, marker));
        }
        self.issued.push(spec);
        tracing::debug!("Trial {} on {}", self.trial, zone);

        let samples = match self.sample(device).await {
            Ok(samples) => samples,
            Err(e) => return Err(self.abort_device(e, marker)),
        };
        let logged = self.log.capture(self.trial, &Local::now(), &samples);
        self.guard(logged, marker)?;
        self.captures.push(samples);

        let interval = self.draw_interval();
        Ok(StepOutcome::Scheduled(interval.saturating_sub(CYCLIC_SAMPLING_MARGIN)))
    }

    /// Operator stop. From `Running` the end marker is sent best-effort.
    ///
    /// # Errors
    ///
    /// Returns a log failure while recording the end marker; the procedure
    /// is terminal either way.
    pub fn stop<M: MarkerChannel>(&mut self, marker: &mut M) -> SessionResult<CyclicPhase> {
        match self.phase {
            CyclicPhase::Running => {
                tracing::info!("Cyclic session stopped after {} trials", self.trial);
                self.finish(CyclicEnd::Stopped, marker)?;
            }
            CyclicPhase::Idle => self.phase = CyclicPhase::Terminal(CyclicEnd::Stopped),
            CyclicPhase::Terminal(_) => {}
        }
        Ok(self.phase)
    }

    /// Sample every [`SAMPLE_PERIOD`] for the hold plus the sampling margin.
    async fn sample<D: DeviceController>(&self, device: &mut D) -> DeviceResult<Vec<ZoneVector>> {
        let window = self.hold + CYCLIC_SAMPLING_MARGIN;
        let started = Instant::now();
        let mut ticker = tokio::time::interval(SAMPLE_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let expected = (window.as_millis() / SAMPLE_PERIOD.as_millis()) as usize;
        let mut samples = Vec::with_capacity(expected);
        loop {
            ticker.tick().await;
            if started.elapsed() >= window {
                break;
            }
            samples.push(device.get_temperatures()?);
        }
        Ok(samples)
    }

    fn draw_interval(&mut self) -> Duration {
        let index = self.rng.gen_range(0..self.intervals.len());
        self.intervals.get(index).unwrap_or(CYCLIC_SAMPLING_MARGIN)
    }

    fn record(&mut self, marker: Marker, temperature_c: Option<f32>) -> Result<(), LogError> {
        let elapsed_ms = self.elapsed().as_millis() as u64;
        let wall_clock = wall_clock_now();
        self.log.event(elapsed_ms, &wall_clock, marker)?;
        self.trials.push(TrialRecord {
            elapsed_ms,
            wall_clock,
            marker,
            temperature_c,
            response: None,
        });
        Ok(())
    }

    /// Enter `end`, send the end marker and log it.
    fn finish<M: MarkerChannel>(&mut self, end: CyclicEnd, marker: &mut M) -> SessionResult<()> {
        self.phase = CyclicPhase::Terminal(end);
        self.send_end(marker);
        self.record(Marker::END, None).map_err(SessionError::LoggingPath)
    }

    fn abort_device<M: MarkerChannel>(&mut self, error: DeviceError, marker: &mut M) -> SessionError {
        tracing::error!("Stimulator failed on trial {}, aborting: {}", self.trial, error);
        if let Err(e) = self.finish(CyclicEnd::Aborted, marker) {
            tracing::warn!("End marker not logged: {}", e);
        }
        SessionError::DeviceDisconnected(error)
    }

    fn guard<T, M: MarkerChannel>(&mut self, result: Result<T, LogError>, marker: &mut M) -> SessionResult<T> {
        result.map_err(|e| {
            tracing::error!("Cyclic log failed, aborting: {}", e);
            self.phase = CyclicPhase::Terminal(CyclicEnd::Aborted);
            self.send_end(marker);
            SessionError::LoggingPath(e)
        })
    }

    /// END only pairs with a BEGIN that went out.
    fn send_end<M: MarkerChannel>(&self, marker: &mut M) {
        if self.announced {
            marker.write_best_effort(Marker::END);
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::device::SimulatedThermode;
    use crate::logger::LogLayout;
    use crate::marker::RecordingMarkerChannel;
    use thermode_core::config::ProcedureParameters;
    use thermode_core::types::Zone;

    struct Rig {
        procedure: CyclicProcedure,
        device: SimulatedThermode,
        marker: RecordingMarkerChannel,
        _tmp: tempfile::TempDir,
    }

    fn rig(total_s: u32, lead_in_ms: u32) -> Rig {
        let tmp = tempfile::tempdir().unwrap();
        let mut params = SessionParameters::cyclic("S01", "B", "SIM", "SIM", 51, total_s);
        if let ProcedureParameters::Cyclic(c) = &mut params.procedure {
            c.lead_in_ms = lead_in_ms;
        }
        let ProcedureParameters::Cyclic(cyclic) = params.procedure.clone() else {
            unreachable!()
        };
        let log = CyclicLog::create(&LogLayout::new(tmp.path()), "S01", "B", 51, &Local::now()).unwrap();

        let mut device = SimulatedThermode::new();
        device.apply_profile(&params.profile()).unwrap();

        Rig {
            procedure: CyclicProcedure::seeded(&params, &cyclic, log, 11),
            device,
            marker: RecordingMarkerChannel::new(),
            _tmp: tmp,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_step_runs_on_start() {
        let mut r = rig(60, 0);
        let outcome = r.procedure.start(&mut r.device, &mut r.marker).await.unwrap();

        let StepOutcome::Scheduled(delay) = outcome else {
            panic!("expected a scheduled step, got {outcome:?}");
        };
        assert!(delay >= Duration::from_millis(7_750) && delay <= Duration::from_millis(11_250));
        assert_eq!(r.marker.sent(), vec![Marker::BEGIN, Marker::for_zone(Zone::Z1)]);
        assert_eq!(r.device.stimulus_count(), 1);
        // 1 s hold + 0.25 s at 50 ms
        assert_eq!(r.procedure.captures()[0].len(), 25);
        assert_eq!(r.procedure.captures()[0][0][0], 51.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lead_in_defers_first_step() {
        let mut r = rig(60, 1_000);
        let outcome = r.procedure.start(&mut r.device, &mut r.marker).await.unwrap();
        assert_eq!(outcome, StepOutcome::Scheduled(Duration::from_secs(1)));
        assert_eq!(r.device.stimulus_count(), 0);
        assert_eq!(r.marker.sent(), vec![Marker::BEGIN]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zone_order_wraps_across_trials() {
        let mut r = rig(600, 0);
        let mut outcome = r.procedure.start(&mut r.device, &mut r.marker).await.unwrap();
        for _ in 0..11 {
            let StepOutcome::Scheduled(delay) = outcome else { panic!("stopped early") };
            tokio::time::sleep(delay).await;
            outcome = r.procedure.step(&mut r.device, &mut r.marker).await.unwrap();
        }

        let zones: Vec<u8> = r.procedure.issued().iter().map(|s| s.active_zone.number()).collect();
        assert_eq!(zones, [1, 4, 2, 5, 3, 1, 4, 2, 5, 3, 1, 4]);
        for (spec, record) in r.procedure.issued().iter().zip(&r.procedure.trials()[1..]) {
            let heated: Vec<Zone> = spec.heated_zones().collect();
            assert_eq!(heated, vec![spec.active_zone]);
            assert_eq!(record.marker.zone(), Some(spec.active_zone));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_step_after_stop_is_noop() {
        let mut r = rig(60, 0);
        r.procedure.start(&mut r.device, &mut r.marker).await.unwrap();
        let commands = r.device.journal().len();

        assert_eq!(
            r.procedure.stop(&mut r.marker).unwrap(),
            CyclicPhase::Terminal(CyclicEnd::Stopped)
        );
        let outcome = r.procedure.step(&mut r.device, &mut r.marker).await.unwrap();

        assert_eq!(outcome, StepOutcome::Inactive);
        assert_eq!(r.device.journal().len(), commands);
        assert_eq!(r.marker.count(Marker::END), 1);
        // second stop changes nothing
        r.procedure.stop(&mut r.marker).unwrap();
        assert_eq!(r.marker.count(Marker::END), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_failure_is_tolerated() {
        let mut r = rig(60, 0);
        r.marker.set_failing(true);
        let outcome = r.procedure.start(&mut r.device, &mut r.marker).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Scheduled(_)));
        assert_eq!(r.device.stimulus_count(), 1);
        assert!(r.marker.sent().is_empty());
        // still recorded in the log
        assert_eq!(r.procedure.trials().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_failure_aborts_with_end_marker() {
        let mut r = rig(60, 0);
        let device = SimulatedThermode::new().failing_after(0);
        r.device = device;

        let err = r.procedure.start(&mut r.device, &mut r.marker).await.unwrap_err();
        assert!(matches!(err, SessionError::DeviceDisconnected(_)));
        assert_eq!(r.procedure.phase(), CyclicPhase::Terminal(CyclicEnd::Aborted));
        assert_eq!(r.marker.count(Marker::END), 1);
    }

    fn log_failure() -> Result<(), LogError> {
        Err(LogError::Write {
            path: std::path::PathBuf::from("markers.txt"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_failure_before_begin_sends_no_end_marker() {
        let mut r = rig(60, 1_000);
        let err = r.procedure.guard(log_failure(), &mut r.marker).unwrap_err();
        assert!(matches!(err, SessionError::LoggingPath(_)));
        assert_eq!(r.procedure.phase(), CyclicPhase::Terminal(CyclicEnd::Aborted));
        assert!(r.marker.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_failure_after_begin_closes_with_end_marker() {
        let mut r = rig(60, 1_000);
        r.procedure.start(&mut r.device, &mut r.marker).await.unwrap();
        assert!(r.procedure.guard(log_failure(), &mut r.marker).is_err());
        assert_eq!(r.marker.sent(), vec![Marker::BEGIN, Marker::END]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_rejected() {
        let mut r = rig(60, 1_000);
        r.procedure.start(&mut r.device, &mut r.marker).await.unwrap();
        assert!(matches!(
            r.procedure.start(&mut r.device, &mut r.marker).await,
            Err(SessionError::InvalidState { action: "start", .. })
        ));
    }
}
