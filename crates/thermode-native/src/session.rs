//! Session controller
//!
//! Owns the stimulator and marker connections for the life of a session,
//! hands them to the selected procedure on every entry point and releases
//! them exactly once: when the procedure reaches a terminal phase, when an
//! entry point fails, or on drop.
//!
//! # Example
//!
//! ```rust,ignore
//! use thermode_native::session::{SessionController, SimulatedConnector};
//!
//! let params = SessionParameters::threshold("S01", "A", "SIM", 46);
//! let mut session = SessionController::open_threshold(
//!     params, &LogLayout::new("logs"), &mut SimulatedConnector::new(), SystemClock::new(),
//! )?;
//! session.on_key(' ')?;
//! session.on_key('n')?;
//! ```

use chrono::Local;
use tokio::sync::mpsc;

use thermode_core::config::{ProcedureParameters, SessionParameters};
use thermode_core::types::TrialRecord;

use crate::clock::{Clock, SystemClock};
use crate::device::{CloseOutcome, DeviceController, SimulatedThermode};
use crate::error::{DeviceResult, MarkerError, SessionError, SessionResult};
use crate::logger::{CyclicLog, LogLayout, ThresholdLog};
use crate::marker::{MarkerChannel, RecordingMarkerChannel};
use crate::procedure::{CyclicPhase, CyclicProcedure, StepOutcome, ThresholdPhase, ThresholdProcedure};
use crate::selector::SpatialSelector;

// ============================================================================
// Connectors
// ============================================================================

/// Opens the session's device connections.
pub trait Connector {
    /// Stimulator connection type
    type Device: DeviceController;
    /// Marker channel type
    type Marker: MarkerChannel;

    /// Open the stimulator on `port`.
    fn open_device(&mut self, port: &str) -> DeviceResult<Self::Device>;

    /// Open the marker device on `port`.
    fn open_marker(&mut self, port: &str) -> Result<Self::Marker, MarkerError>;
}

/// Opens real serial devices.
#[cfg(feature = "serial")]
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialConnector;

#[cfg(feature = "serial")]
impl Connector for SerialConnector {
    type Device = crate::device::TcsDevice;
    type Marker = crate::marker::SerialMarkerChannel;

    fn open_device(&mut self, port: &str) -> DeviceResult<Self::Device> {
        crate::device::TcsDevice::open(port)
    }

    fn open_marker(&mut self, port: &str) -> Result<Self::Marker, MarkerError> {
        crate::marker::SerialMarkerChannel::open(port)
    }
}

/// Hands out shared handles to a simulated stimulator and marker channel.
#[derive(Clone, Debug, Default)]
pub struct SimulatedConnector {
    /// Stimulator handed to the session
    pub device: SimulatedThermode,
    /// Marker channel handed to the session
    pub marker: RecordingMarkerChannel,
    /// Refuse to open the marker channel
    pub refuse_marker: bool,
    /// Refuse to open the stimulator
    pub refuse_device: bool,
}

impl SimulatedConnector {
    /// Connector whose devices always open.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connector for SimulatedConnector {
    type Device = SimulatedThermode;
    type Marker = RecordingMarkerChannel;

    fn open_device(&mut self, port: &str) -> DeviceResult<Self::Device> {
        if self.refuse_device {
            return Err(crate::error::DeviceError::OpenFailed {
                port: port.to_string(),
                reason: "simulated refusal".to_string(),
            });
        }
        Ok(self.device.clone())
    }

    fn open_marker(&mut self, port: &str) -> Result<Self::Marker, MarkerError> {
        if self.refuse_marker {
            return Err(MarkerError::OpenFailed {
                port: port.to_string(),
                reason: "simulated refusal".to_string(),
            });
        }
        Ok(self.marker.clone())
    }
}

// ============================================================================
// Session Controller
// ============================================================================

enum ActiveProcedure<C: Clock> {
    Threshold(ThresholdProcedure<C>),
    Cyclic(CyclicProcedure),
}

/// Owner of one session's resources and procedure.
pub struct SessionController<D: DeviceController, M: MarkerChannel, C: Clock = SystemClock> {
    params: SessionParameters,
    device: D,
    marker: Option<M>,
    procedure: ActiveProcedure<C>,
    released: bool,
}

impl<D: DeviceController, M: MarkerChannel> SessionController<D, M, SystemClock> {
    /// Validate, create the logs, open both devices and configure the
    /// stimulator for a cyclic session.
    ///
    /// The marker channel is opened first; nothing else is opened if it
    /// fails. Anything opened is closed again if a later step fails.
    ///
    /// # Errors
    ///
    /// [`SessionError::ConfigValidation`], [`SessionError::MarkerChannel`],
    /// [`SessionError::LoggingPath`] or [`SessionError::DeviceConnection`].
    pub fn open_cyclic<K>(params: SessionParameters, layout: &LogLayout, connector: &mut K) -> SessionResult<Self>
    where
        K: Connector<Device = D, Marker = M>,
    {
        Self::open_cyclic_with(params, layout, connector, None)
    }

    /// As [`Self::open_cyclic`] with a fixed seed for the interval draws.
    ///
    /// # Errors
    ///
    /// As [`Self::open_cyclic`].
    pub fn open_cyclic_seeded<K>(
        params: SessionParameters,
        layout: &LogLayout,
        connector: &mut K,
        seed: u64,
    ) -> SessionResult<Self>
    where
        K: Connector<Device = D, Marker = M>,
    {
        Self::open_cyclic_with(params, layout, connector, Some(seed))
    }

    fn open_cyclic_with<K>(
        params: SessionParameters,
        layout: &LogLayout,
        connector: &mut K,
        seed: Option<u64>,
    ) -> SessionResult<Self>
    where
        K: Connector<Device = D, Marker = M>,
    {
        params.validate()?;
        let ProcedureParameters::Cyclic(cyclic) = &params.procedure else {
            return Err(SessionError::InvalidState {
                action: "open cyclic session",
                phase: "threshold parameters".to_string(),
            });
        };

        let mut marker = connector.open_marker(&cyclic.marker_port)?;

        let log = match CyclicLog::create(
            layout,
            &params.subject_id,
            &params.session,
            cyclic.target_temp_c,
            &Local::now(),
        ) {
            Ok(log) => log,
            Err(e) => {
                marker.close();
                return Err(e.into());
            }
        };

        let mut device = match connector.open_device(&params.device_port) {
            Ok(device) => device,
            Err(e) => {
                marker.close();
                return Err(SessionError::DeviceConnection(e));
            }
        };

        let profile = params.profile();
        let configured = device
            .set_quiet_mode()
            .and_then(|()| device.apply_profile(&profile));
        if let Err(e) = configured {
            device.close();
            marker.close();
            return Err(SessionError::DeviceConnection(e));
        }

        let procedure = match seed {
            Some(seed) => CyclicProcedure::seeded(&params, cyclic, log, seed),
            None => CyclicProcedure::new(&params, cyclic, log),
        };
        tracing::info!("Cyclic session {} / {} ready", params.subject_id, params.session);

        Ok(Self {
            params,
            device,
            marker: Some(marker),
            procedure: ActiveProcedure::Cyclic(procedure),
            released: false,
        })
    }
}

impl<D: DeviceController, M: MarkerChannel, C: Clock> SessionController<D, M, C> {
    /// Validate, create the log, and open the stimulator for a threshold
    /// search. Threshold searches use no marker channel.
    ///
    /// # Errors
    ///
    /// [`SessionError::ConfigValidation`], [`SessionError::LoggingPath`] or
    /// [`SessionError::DeviceConnection`].
    pub fn open_threshold<K>(
        params: SessionParameters,
        layout: &LogLayout,
        connector: &mut K,
        clock: C,
    ) -> SessionResult<Self>
    where
        K: Connector<Device = D, Marker = M>,
    {
        Self::open_threshold_with(params, layout, connector, clock, SpatialSelector::uniform())
    }

    /// As [`Self::open_threshold`] with a chosen zone selector.
    ///
    /// # Errors
    ///
    /// As [`Self::open_threshold`].
    pub fn open_threshold_with<K>(
        params: SessionParameters,
        layout: &LogLayout,
        connector: &mut K,
        clock: C,
        selector: SpatialSelector,
    ) -> SessionResult<Self>
    where
        K: Connector<Device = D, Marker = M>,
    {
        params.validate()?;
        if !matches!(params.procedure, ProcedureParameters::Threshold(_)) {
            return Err(SessionError::InvalidState {
                action: "open threshold search",
                phase: "cyclic parameters".to_string(),
            });
        }

        let log = ThresholdLog::create(layout, &params.subject_id, &params.session, &Local::now())?;

        let mut device = connector
            .open_device(&params.device_port)
            .map_err(SessionError::DeviceConnection)?;
        if let Err(e) = device.set_quiet_mode() {
            device.close();
            return Err(SessionError::DeviceConnection(e));
        }

        let procedure = ThresholdProcedure::new(&params, log, selector, clock);
        tracing::info!("Threshold search {} / {} ready", params.subject_id, params.session);

        Ok(Self {
            params,
            device,
            marker: None,
            procedure: ActiveProcedure::Threshold(procedure),
            released: false,
        })
    }

    /// Session parameters.
    pub fn params(&self) -> &SessionParameters {
        &self.params
    }

    /// Threshold procedure, if this is a threshold search.
    pub fn threshold(&self) -> Option<&ThresholdProcedure<C>> {
        match &self.procedure {
            ActiveProcedure::Threshold(p) => Some(p),
            ActiveProcedure::Cyclic(_) => None,
        }
    }

    /// Cyclic procedure, if this is a cyclic session.
    pub fn cyclic(&self) -> Option<&CyclicProcedure> {
        match &self.procedure {
            ActiveProcedure::Cyclic(p) => Some(p),
            ActiveProcedure::Threshold(_) => None,
        }
    }

    /// Records kept by the active procedure.
    pub fn trials(&self) -> &[TrialRecord] {
        match &self.procedure {
            ActiveProcedure::Threshold(p) => p.trials(),
            ActiveProcedure::Cyclic(p) => p.trials(),
        }
    }

    /// Whether the connections have been released.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Operator ready signal (threshold search).
    ///
    /// # Errors
    ///
    /// See [`ThresholdProcedure::on_ready`].
    pub fn on_ready(&mut self) -> SessionResult<ThresholdPhase> {
        let ActiveProcedure::Threshold(search) = &mut self.procedure else {
            return Err(not_threshold("ready"));
        };
        let result = search.on_ready(&mut self.device);
        self.settle_threshold(result)
    }

    /// Subject answer (threshold search).
    ///
    /// # Errors
    ///
    /// See [`ThresholdProcedure::on_response`].
    pub fn on_response(&mut self, painful: bool) -> SessionResult<ThresholdPhase> {
        let ActiveProcedure::Threshold(search) = &mut self.procedure else {
            return Err(not_threshold("response"));
        };
        let result = search.on_response(painful, &mut self.device);
        self.settle_threshold(result)
    }

    /// Key press from the response-capture boundary (threshold search).
    ///
    /// # Errors
    ///
    /// See [`ThresholdProcedure::on_key`].
    pub fn on_key(&mut self, key: char) -> SessionResult<ThresholdPhase> {
        let ActiveProcedure::Threshold(search) = &mut self.procedure else {
            return Err(not_threshold("key press"));
        };
        let result = search.on_key(key, &mut self.device);
        self.settle_threshold(result)
    }

    /// Operator stop for either procedure. Releases the connections.
    ///
    /// # Errors
    ///
    /// A log failure while recording the cyclic end marker; resources are
    /// released regardless.
    pub fn on_stop(&mut self) -> SessionResult<()> {
        let result = match &mut self.procedure {
            ActiveProcedure::Threshold(search) => {
                search.on_stop();
                Ok(())
            }
            ActiveProcedure::Cyclic(cyclic) => match self.marker.as_mut() {
                Some(marker) => cyclic.stop(marker).map(drop),
                None => Ok(()),
            },
        };
        self.release();
        result
    }

    /// Run a cyclic session until it completes, fails, or a stop arrives on
    /// `stop_rx`. The wait between trials races the stop channel, so a stop
    /// is honoured without waiting for the next trial.
    ///
    /// # Errors
    ///
    /// Device and log failures; [`SessionError::InvalidState`] for a
    /// threshold session or an already started cyclic one.
    pub async fn run_cyclic(&mut self, stop_rx: &mut mpsc::Receiver<()>) -> SessionResult<CyclicPhase> {
        let result = match (&mut self.procedure, self.marker.as_mut()) {
            (ActiveProcedure::Cyclic(cyclic), Some(marker)) => {
                drive(cyclic, &mut self.device, marker, stop_rx).await
            }
            _ => Err(SessionError::InvalidState {
                action: "run cyclic session",
                phase: "threshold search".to_string(),
            }),
        };
        self.release();
        result
    }

    /// Close the stimulator and marker channel once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if self.device.close() == CloseOutcome::AlreadyClosed {
            tracing::debug!("Stimulator was already closed");
        }
        if let Some(marker) = self.marker.as_mut() {
            if marker.close() == CloseOutcome::AlreadyClosed {
                tracing::debug!("Marker channel was already closed");
            }
        }
        tracing::info!("Session {} / {} released", self.params.subject_id, self.params.session);
    }

    fn settle_threshold(&mut self, result: SessionResult<ThresholdPhase>) -> SessionResult<ThresholdPhase> {
        match &result {
            Ok(phase) if phase.is_terminal() => self.release(),
            Ok(_) | Err(SessionError::InvalidState { .. }) => {}
            Err(_) => self.release(),
        }
        result
    }
}

impl<D: DeviceController, M: MarkerChannel, C: Clock> Drop for SessionController<D, M, C> {
    fn drop(&mut self) {
        self.release();
    }
}

fn not_threshold(action: &'static str) -> SessionError {
    SessionError::InvalidState {
        action,
        phase: "cyclic session".to_string(),
    }
}

async fn drive<D, M>(
    cyclic: &mut CyclicProcedure,
    device: &mut D,
    marker: &mut M,
    stop_rx: &mut mpsc::Receiver<()>,
) -> SessionResult<CyclicPhase>
where
    D: DeviceController,
    M: MarkerChannel,
{
    let mut outcome = cyclic.start(device, marker).await?;
    while let StepOutcome::Scheduled(delay) = outcome {
        tokio::select! {
            () = tokio::time::sleep(delay) => {
                outcome = cyclic.step(device, marker).await?;
            }
            Some(()) = stop_rx.recv() => {
                cyclic.stop(marker)?;
                break;
            }
        }
    }
    Ok(cyclic.phase())
}
