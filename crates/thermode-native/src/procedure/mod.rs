//! Procedure state machines
//!
//! - [`ThresholdProcedure`]: ascending staircase driven by operator and
//!   subject input, with blocking hold windows
//! - [`CyclicProcedure`]: fixed-temperature trials on a cyclic zone order,
//!   stepped by an async scheduler that stays responsive to stop
//!
//! Procedures borrow the stimulator and marker channel for each call; they
//! never open or close them.

mod cyclic;
mod threshold;

pub use cyclic::{CyclicEnd, CyclicPhase, CyclicProcedure, StepOutcome, SAMPLE_PERIOD};
pub use threshold::{ThresholdEnd, ThresholdPhase, ThresholdProcedure};

use chrono::Local;

use crate::logger::file_stamp;

/// Wall-clock stamp for a trial record taken now.
fn wall_clock_now() -> String {
    file_stamp(&Local::now())
}
