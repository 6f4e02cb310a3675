//! Core types for thermal stimulation sessions
//!
//! This module provides the vocabulary shared by every tier of the system:
//! - Zone identifiers for the five-zone thermode
//! - Per-zone timing profiles (durations, ramp speeds)
//! - Single-zone stimulus descriptions
//! - Subject responses and trial records

use alloc::string::String;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::marker::Marker;

// ============================================================================
// Zones
// ============================================================================

/// Number of independently addressable zones on the thermode.
pub const ZONE_COUNT: usize = 5;

/// A per-zone vector, indexed by [`Zone::index`].
pub type ZoneVector = [f32; ZONE_COUNT];

/// One stimulation zone, numbered 1 through 5 as labelled on the probe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Zone(u8);

impl Zone {
    /// Zone 1
    pub const Z1: Self = Self(1);
    /// Zone 2
    pub const Z2: Self = Self(2);
    /// Zone 3
    pub const Z3: Self = Self(3);
    /// Zone 4
    pub const Z4: Self = Self(4);
    /// Zone 5
    pub const Z5: Self = Self(5);

    /// All zones in numeric order
    pub const ALL: [Self; ZONE_COUNT] = [Self::Z1, Self::Z2, Self::Z3, Self::Z4, Self::Z5];

    /// Create a zone from its 1-based number.
    #[inline]
    #[must_use]
    pub const fn new(number: u8) -> Option<Self> {
        if number >= 1 && number <= ZONE_COUNT as u8 {
            Some(Self(number))
        } else {
            None
        }
    }

    /// Create a zone from a 0-based vector index.
    #[inline]
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < ZONE_COUNT {
            Some(Self(index as u8 + 1))
        } else {
            None
        }
    }

    /// 1-based zone number
    #[inline]
    #[must_use]
    pub const fn number(self) -> u8 {
        self.0
    }

    /// 0-based index into a [`ZoneVector`]
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zone {}", self.0)
    }
}

// ============================================================================
// Stimulus Profile
// ============================================================================

/// Static timing parameters sent to the stimulator before any stimulus.
///
/// These are the values the device needs besides the temperature vector:
/// baseline, how long each zone holds, and how fast it ramps.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StimulusProfile {
    /// Resting temperature of inactive zones (°C)
    pub baseline_c: f32,
    /// Hold duration per zone (s)
    pub durations_s: ZoneVector,
    /// Ramp-up speed per zone (°C/s)
    pub ramp_up_c_per_s: ZoneVector,
    /// Ramp-down (return) speed per zone (°C/s)
    pub ramp_down_c_per_s: ZoneVector,
}

impl StimulusProfile {
    /// Default ramp speed in both directions (°C/s)
    pub const DEFAULT_RAMP_C_PER_S: f32 = 300.0;

    /// Same hold duration and default ramp speeds on every zone.
    #[must_use]
    pub fn uniform(baseline_c: f32, hold_s: u32) -> Self {
        Self {
            baseline_c,
            durations_s: [hold_s as f32; ZONE_COUNT],
            ramp_up_c_per_s: [Self::DEFAULT_RAMP_C_PER_S; ZONE_COUNT],
            ramp_down_c_per_s: [Self::DEFAULT_RAMP_C_PER_S; ZONE_COUNT],
        }
    }

    /// Longest per-zone hold duration (s).
    #[must_use]
    pub fn longest_hold_s(&self) -> f32 {
        self.durations_s
            .iter()
            .fold(0.0_f32, |acc, &d| if d > acc { d } else { acc })
    }
}

// ============================================================================
// Stimulus Spec
// ============================================================================

/// A complete single-zone stimulus.
///
/// Exactly one zone is driven to the active temperature; every other zone
/// stays at the profile baseline. The active zone is kept explicitly so it
/// is known even when the active temperature equals the baseline.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StimulusSpec {
    /// Timing and baseline parameters
    pub profile: StimulusProfile,
    /// Temperature per zone (°C)
    pub temperatures_c: ZoneVector,
    /// Zone carrying the active temperature
    pub active_zone: Zone,
    /// Active temperature (°C)
    pub active_c: f32,
}

impl StimulusSpec {
    /// Build a stimulus with `active_c` on `zone` and baseline elsewhere.
    #[must_use]
    pub fn single_zone(profile: StimulusProfile, zone: Zone, active_c: f32) -> Self {
        let mut temperatures_c = [profile.baseline_c; ZONE_COUNT];
        temperatures_c[zone.index()] = active_c;

        Self {
            profile,
            temperatures_c,
            active_zone: zone,
            active_c,
        }
    }

    /// Zones whose temperature differs from the baseline.
    pub fn heated_zones(&self) -> impl Iterator<Item = Zone> + '_ {
        Zone::ALL
            .into_iter()
            .filter(move |zone| self.temperatures_c[zone.index()] != self.profile.baseline_c)
    }

    /// Marker identifying this stimulus' zone.
    #[inline]
    #[must_use]
    pub const fn marker(&self) -> Marker {
        Marker::for_zone(self.active_zone)
    }
}

// ============================================================================
// Responses and Trial Records
// ============================================================================

/// Subject's answer after a threshold-search stimulus.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Response {
    /// Stimulus reached the qualifying pain level
    Painful,
    /// Stimulus stayed below the qualifying pain level
    NotPainful,
}

impl Response {
    /// Map a key press to a response. Unrecognised keys give `None`.
    #[must_use]
    pub const fn from_key(key: char) -> Option<Self> {
        match key {
            'y' | 'Y' => Some(Self::Painful),
            'n' | 'N' => Some(Self::NotPainful),
            _ => None,
        }
    }

    /// Build from a yes/no flag.
    #[inline]
    #[must_use]
    pub const fn from_painful(painful: bool) -> Self {
        if painful {
            Self::Painful
        } else {
            Self::NotPainful
        }
    }

    /// Whether the subject reported pain
    #[inline]
    #[must_use]
    pub const fn is_painful(self) -> bool {
        matches!(self, Self::Painful)
    }

    /// Single-letter code used in session logs (`Y` / `N`).
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Painful => 'Y',
            Self::NotPainful => 'N',
        }
    }
}

/// One persisted trial or marker event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Monotonic milliseconds since the session began
    pub elapsed_ms: u64,
    /// Local wall-clock stamp (`YYYY_mm_dd_HH_MM_SS`)
    pub wall_clock: String,
    /// Zone or sentinel marker
    pub marker: Marker,
    /// Applied active temperature, if a stimulus was delivered
    pub temperature_c: Option<f32>,
    /// Subject response (threshold search only)
    pub response: Option<Response>,
}

// ============================================================================
// Tests
// ============================================================================
