//! Stimulator command codec
//!
//! The stimulator speaks a terse ASCII protocol: a command letter, an
//! optional zone digit (`0` addresses every zone) and a fixed-width decimal
//! value. Temperatures travel in tenths of a degree.
//!
//! # Frame Format
//!
//! ```text
//! N320          baseline 32.0 °C
//! D001000       1000 ms hold on all zones
//! V13000        ramp-up 300.0 °C/s on zone 1
//! C0320 C3510   all zones 32.0 °C, then zone 3 at 51.0 °C
//! L             start the stimulus
//! E             read temperatures
//! ```
//!
//! The `E` reply is `nnn+aaa+bbb+ccc+ddd+eee` followed by a terminator:
//! the neutral probe reading and the five zone readings.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use crate::config::{MAX_BASELINE_C, MIN_BASELINE_C};
use crate::error::FrameError;
use crate::types::{ZoneVector, ZONE_COUNT};

/// Length of a complete temperature reply, terminator included.
pub const TEMPERATURE_FRAME_LEN: usize = 24;

/// Offset of the first zone reading; each following zone is 4 bytes on.
const FIRST_ZONE_OFFSET: usize = 4;

/// Digits per temperature reading.
const READING_DIGITS: usize = 3;

/// One command understood by the stimulator.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TcsCommand {
    /// Suppress periodic unsolicited output
    QuietMode,
    /// Baseline temperature (°C)
    SetBaseline(f32),
    /// Hold duration per zone (s)
    SetDurations(ZoneVector),
    /// Ramp-up speed per zone (°C/s)
    SetRampUp(ZoneVector),
    /// Ramp-down speed per zone (°C/s)
    SetRampDown(ZoneVector),
    /// Target temperature per zone (°C)
    SetTemperatures(ZoneVector),
    /// Deliver the configured stimulus
    Stimulate,
    /// Request a temperature reading
    ReadTemperatures,
}

impl TcsCommand {
    /// Short name used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::QuietMode => "quiet mode",
            Self::SetBaseline(_) => "set baseline",
            Self::SetDurations(_) => "set durations",
            Self::SetRampUp(_) => "set ramp-up speeds",
            Self::SetRampDown(_) => "set ramp-down speeds",
            Self::SetTemperatures(_) => "set temperatures",
            Self::Stimulate => "stimulate",
            Self::ReadTemperatures => "get temperatures",
        }
    }

    /// Encode to the ASCII bytes sent on the wire.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        match self {
            Self::QuietMode => out.push('F'),
            Self::SetBaseline(celsius) => {
                let clamped = celsius.clamp(MIN_BASELINE_C, MAX_BASELINE_C);
                push_value(&mut out, 'N', None, tenths(clamped), 3);
            }
            Self::SetDurations(seconds) => {
                let ms = seconds.map(|s| (s * 1000.0 + 0.5) as u32);
                push_vector(&mut out, 'D', &ms, 5);
            }
            Self::SetRampUp(speeds) => push_vector(&mut out, 'V', &speeds.map(tenths), 4),
            Self::SetRampDown(speeds) => push_vector(&mut out, 'R', &speeds.map(tenths), 4),
            Self::SetTemperatures(celsius) => {
                push_vector(&mut out, 'C', &celsius.map(tenths), 3);
            }
            Self::Stimulate => out.push('L'),
            Self::ReadTemperatures => out.push('E'),
        }
        out.into_bytes()
    }
}

/// Non-negative value in tenths, rounded to nearest.
fn tenths(value: f32) -> u32 {
    if value <= 0.0 {
        0
    } else {
        (value * 10.0 + 0.5) as u32
    }
}

fn push_value(out: &mut String, letter: char, zone: Option<usize>, value: u32, width: usize) {
    out.push(letter);
    if let Some(z) = zone {
        // zone digit: 0 = all zones
        let _ = write!(out, "{z}");
    }
    let _ = write!(out, "{value:0width$}");
}

/// One frame for all zones when every value matches, else one per zone.
fn push_vector(out: &mut String, letter: char, values: &[u32; ZONE_COUNT], width: usize) {
    if values.iter().all(|v| *v == values[0]) {
        push_value(out, letter, Some(0), values[0], width);
    } else {
        for (i, value) in values.iter().enumerate() {
            push_value(out, letter, Some(i + 1), *value, width);
        }
    }
}

/// Parse a temperature reply into the five zone readings (°C).
///
/// The neutral probe reading is ignored.
pub fn parse_temperature_frame(frame: &[u8]) -> Result<ZoneVector, FrameError> {
    if frame.len() < TEMPERATURE_FRAME_LEN {
        return Err(FrameError::Incomplete {
            received: frame.len(),
            expected: TEMPERATURE_FRAME_LEN,
        });
    }

    let mut zones = [0.0_f32; ZONE_COUNT];
    for (i, zone) in zones.iter_mut().enumerate() {
        let start = FIRST_ZONE_OFFSET * (i + 1);
        let mut value: u32 = 0;
        for offset in start..start + READING_DIGITS {
            let byte = frame[offset];
            if !byte.is_ascii_digit() {
                return Err(FrameError::InvalidDigit { offset, byte });
            }
            value = value * 10 + u32::from(byte - b'0');
        }
        *zone = value as f32 / 10.0;
    }
    Ok(zones)
}
