//! Thermode Native - Host-side protocol engine for thermal stimulation
//!
//! This crate runs sessions against real or simulated hardware:
//! - Stimulator connections (serial and simulated)
//! - Acquisition marker channels
//! - Append-only experiment logs
//! - Threshold and cyclic procedure state machines
//! - Session ownership of connections and clean release
//!
//! # Modules
//!
//! - [`device`]: Stimulator command surface and implementations
//! - [`marker`]: Marker channels
//! - [`logger`]: Experiment log files
//! - [`selector`]: Zone selection policies
//! - [`clock`]: Monotonic clocks for blocking holds
//! - [`procedure`]: Threshold and cyclic state machines
//! - [`session`]: Session controller and connectors

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]

pub mod clock;
pub mod device;
pub mod error;
pub mod logger;
pub mod marker;
pub mod procedure;
pub mod selector;
pub mod session;

// Re-export key types
pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{CloseOutcome, DeviceController, SimulatedThermode};
pub use error::{DeviceError, LogError, MarkerError, SessionError, SessionResult};
pub use logger::LogLayout;
pub use marker::{MarkerChannel, RecordingMarkerChannel};
pub use procedure::{CyclicPhase, CyclicProcedure, StepOutcome, ThresholdPhase, ThresholdProcedure};
pub use selector::SpatialSelector;
pub use session::{Connector, SessionController, SimulatedConnector};

#[cfg(feature = "serial")]
pub use device::{list_ports, TcsDevice};
#[cfg(feature = "serial")]
pub use marker::SerialMarkerChannel;
#[cfg(feature = "serial")]
pub use session::SerialConnector;
