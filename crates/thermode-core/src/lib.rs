//! Thermode Core - `no_std` compatible types for thermal stimulation sessions
//!
//! This crate holds everything about a session that does not touch
//! hardware: zone and marker vocabulary, validated session parameters,
//! the threshold staircase, the cyclic zone schedule and the stimulator
//! command codec. It needs `alloc` but not `std`.
//!
//! # Modules
//!
//! - [`types`]: Zones, stimulus profiles and specs, responses, trial records
//! - [`marker`]: Single-byte acquisition markers and sentinels
//! - [`config`]: Session parameters and validation
//! - [`staircase`]: Ascending threshold search state
//! - [`schedule`]: Fixed-order cyclic zone schedule
//! - [`command`]: Stimulator command encoding and reply parsing
//! - [`error`]: Configuration and frame errors
//!
//! # Features
//!
//! - `std`: Enable standard library support (`std::error::Error` impls)
//!
//! # Example
//!
//! ```rust
//! use thermode_core::{Response, StaircaseOutcome, StaircaseState};
//!
//! let mut staircase = StaircaseState::new(58);
//! assert_eq!(staircase.record(Response::NotPainful), None);
//! assert_eq!(staircase.current_c(), 59);
//! assert_eq!(
//!     staircase.record(Response::Painful),
//!     Some(StaircaseOutcome::ThresholdFound { threshold_c: 59 })
//! );
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod command;
pub mod config;
pub mod error;
pub mod marker;
pub mod schedule;
pub mod staircase;
pub mod types;

// Re-export commonly used types at crate root
pub use command::{parse_temperature_frame, TcsCommand, TEMPERATURE_FRAME_LEN};
pub use config::{
    CyclicParameters, IntervalSet, ProcedureParameters, SessionParameters, ThresholdParameters,
};
pub use error::{ConfigError, FrameError};
pub use marker::Marker;
pub use schedule::{CyclicScheduleState, DEFAULT_ZONE_ORDER};
pub use staircase::{StaircaseOutcome, StaircaseState};
pub use types::{
    Response, StimulusProfile, StimulusSpec, TrialRecord, Zone, ZoneVector, ZONE_COUNT,
};
