//! Session parameters and their validation
//!
//! [`SessionParameters`] is built once from operator input, validated once
//! with [`SessionParameters::validate`], and then shared read-only with
//! every component of the session.
//!
//! # Allowed values
//!
//! - Active temperature (threshold start / cyclic target): integers 32–60 °C
//! - Baseline: 20–40 °C, never above the active temperature
//! - Hold duration: whole seconds, 1–99 (the stimulator takes 5-digit ms)
//! - Cyclic total duration: must exceed hold + longest interval + 1 s

use alloc::string::String;
use core::ops::RangeInclusive;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::schedule::DEFAULT_ZONE_ORDER;
use crate::types::{StimulusProfile, Zone, ZONE_COUNT};

/// Integer temperatures a stimulus may be delivered at (°C).
pub const ALLOWED_TEMPERATURES_C: RangeInclusive<u8> = 32..=60;

/// Hottest temperature ever issued (°C).
pub const MAX_TEMP_C: u8 = 60;

/// Lowest baseline accepted by the stimulator (°C).
pub const MIN_BASELINE_C: f32 = 20.0;

/// Highest baseline accepted by the stimulator (°C).
pub const MAX_BASELINE_C: f32 = 40.0;

/// Default baseline (°C).
pub const DEFAULT_BASELINE_C: f32 = 32.0;

/// Default hold duration (s).
pub const DEFAULT_HOLD_S: u32 = 1;

/// Longest hold the stimulator's duration field can carry (s).
pub const MAX_HOLD_S: u32 = 99;

/// Extra wait after the hold before asking for a threshold response.
pub const THRESHOLD_RESPONSE_MARGIN: Duration = Duration::from_millis(500);

/// Extra sampling time after the hold in cyclic trials; also deducted
/// from the following inter-trial interval.
pub const CYCLIC_SAMPLING_MARGIN: Duration = Duration::from_millis(250);

// ============================================================================
// Interval Set
// ============================================================================

/// Discrete set of inter-trial intervals.
///
/// Contains `min, min + step, min + 2·step, …` strictly below `max`.
/// The default is 8.0 s to 11.5 s in 0.5 s steps.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSet {
    /// Smallest interval (ms)
    pub min_ms: u32,
    /// Exclusive upper bound (ms)
    pub max_ms: u32,
    /// Spacing between values (ms)
    pub step_ms: u32,
}

impl IntervalSet {
    /// 8.0 s ≤ interval < 12.0 s in 0.5 s steps.
    pub const DEFAULT: Self = Self {
        min_ms: 8_000,
        max_ms: 12_000,
        step_ms: 500,
    };

    /// Number of intervals in the set.
    #[must_use]
    pub const fn len(&self) -> usize {
        if self.step_ms == 0 || self.max_ms <= self.min_ms {
            0
        } else {
            ((self.max_ms - self.min_ms + self.step_ms - 1) / self.step_ms) as usize
        }
    }

    /// Whether the set is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interval at `index`, if in range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Duration> {
        if index < self.len() {
            let ms = self.min_ms + self.step_ms * index as u32;
            Some(Duration::from_millis(u64::from(ms)))
        } else {
            None
        }
    }

    /// Iterate over every interval in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Upper bound used when checking the total duration, in whole seconds.
    #[must_use]
    pub const fn upper_bound_s(&self) -> u32 {
        (self.max_ms + 999) / 1000
    }

    /// Check the set is usable for scheduling.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_ms == 0 {
            return Err(ConfigError::InvalidIntervalSet { reason: "step must be positive" });
        }
        if self.is_empty() {
            return Err(ConfigError::InvalidIntervalSet { reason: "set contains no intervals" });
        }
        if u128::from(self.min_ms) < CYCLIC_SAMPLING_MARGIN.as_millis() {
            return Err(ConfigError::InvalidIntervalSet {
                reason: "shortest interval is shorter than the sampling margin",
            });
        }
        Ok(())
    }
}

impl Default for IntervalSet {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ============================================================================
// Procedure Parameters
// ============================================================================

/// Ascending staircase threshold search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdParameters {
    /// First temperature presented (°C)
    pub start_temp_c: u8,
}

/// Repeated fixed-temperature stimulation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclicParameters {
    /// Temperature delivered on every trial (°C)
    pub target_temp_c: u8,
    /// Session length (s)
    pub total_duration_s: u32,
    /// Marker device port
    pub marker_port: String,
    /// Inter-trial intervals to draw from
    pub intervals: IntervalSet,
    /// Fixed zone visit order
    pub zone_order: [Zone; ZONE_COUNT],
    /// Delay between the begin marker and the first stimulus (ms)
    pub lead_in_ms: u32,
}

/// Procedure-specific block of the session parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcedureParameters {
    /// Threshold search
    Threshold(ThresholdParameters),
    /// Cyclic stimulation
    Cyclic(CyclicParameters),
}

// ============================================================================
// Session Parameters
// ============================================================================

/// Immutable configuration of one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionParameters {
    /// Subject identifier
    pub subject_id: String,
    /// Session identifier
    pub session: String,
    /// Stimulator port
    pub device_port: String,
    /// Baseline temperature (°C)
    pub baseline_c: f32,
    /// Hold duration per stimulus (s)
    pub hold_duration_s: u32,
    /// Procedure-specific parameters
    pub procedure: ProcedureParameters,
}

impl SessionParameters {
    /// Threshold-search parameters with default baseline and hold.
    #[must_use]
    pub fn threshold(
        subject_id: impl Into<String>,
        session: impl Into<String>,
        device_port: impl Into<String>,
        start_temp_c: u8,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            session: session.into(),
            device_port: device_port.into(),
            baseline_c: DEFAULT_BASELINE_C,
            hold_duration_s: DEFAULT_HOLD_S,
            procedure: ProcedureParameters::Threshold(ThresholdParameters { start_temp_c }),
        }
    }

    /// Cyclic parameters with default baseline, hold, intervals and order.
    #[must_use]
    pub fn cyclic(
        subject_id: impl Into<String>,
        session: impl Into<String>,
        device_port: impl Into<String>,
        marker_port: impl Into<String>,
        target_temp_c: u8,
        total_duration_s: u32,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            session: session.into(),
            device_port: device_port.into(),
            baseline_c: DEFAULT_BASELINE_C,
            hold_duration_s: DEFAULT_HOLD_S,
            procedure: ProcedureParameters::Cyclic(CyclicParameters {
                target_temp_c,
                total_duration_s,
                marker_port: marker_port.into(),
                intervals: IntervalSet::DEFAULT,
                zone_order: DEFAULT_ZONE_ORDER,
                lead_in_ms: 1_000,
            }),
        }
    }

    /// Replace the baseline temperature.
    #[must_use]
    pub fn with_baseline(mut self, baseline_c: f32) -> Self {
        self.baseline_c = baseline_c;
        self
    }

    /// Replace the hold duration.
    #[must_use]
    pub fn with_hold(mut self, hold_duration_s: u32) -> Self {
        self.hold_duration_s = hold_duration_s;
        self
    }

    /// Temperature delivered on the active zone (start or target).
    #[must_use]
    pub fn active_temperature_c(&self) -> u8 {
        match &self.procedure {
            ProcedureParameters::Threshold(p) => p.start_temp_c,
            ProcedureParameters::Cyclic(p) => p.target_temp_c,
        }
    }

    /// Hold duration as a [`Duration`].
    #[must_use]
    pub fn hold_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.hold_duration_s))
    }

    /// Static device profile derived from these parameters.
    #[must_use]
    pub fn profile(&self) -> StimulusProfile {
        StimulusProfile::uniform(self.baseline_c, self.hold_duration_s)
    }

    /// Value the cyclic total duration must exceed (s).
    #[must_use]
    pub fn total_duration_floor_s(hold_duration_s: u32, intervals: &IntervalSet) -> u32 {
        hold_duration_s.saturating_add(intervals.upper_bound_s()).saturating_add(1)
    }

    /// Validate every field. Called once before a session starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subject_id.trim().is_empty() {
            return Err(ConfigError::EmptySubjectId);
        }
        if self.session.trim().is_empty() {
            return Err(ConfigError::EmptySession);
        }
        if self.device_port.trim().is_empty() {
            return Err(ConfigError::EmptyPort { role: "Stimulator" });
        }
        if !(MIN_BASELINE_C..=MAX_BASELINE_C).contains(&self.baseline_c) {
            return Err(ConfigError::BaselineOutOfRange {
                requested_c: self.baseline_c,
                minimum_c: MIN_BASELINE_C,
                maximum_c: MAX_BASELINE_C,
            });
        }
        if self.hold_duration_s == 0 {
            return Err(ConfigError::ZeroHoldDuration);
        }
        if self.hold_duration_s > MAX_HOLD_S {
            return Err(ConfigError::HoldOutOfRange {
                requested_s: self.hold_duration_s,
                maximum_s: MAX_HOLD_S,
            });
        }

        let active_c = self.active_temperature_c();
        if !ALLOWED_TEMPERATURES_C.contains(&active_c) {
            return Err(ConfigError::TemperatureNotAllowed {
                requested_c: active_c,
                minimum_c: *ALLOWED_TEMPERATURES_C.start(),
                maximum_c: *ALLOWED_TEMPERATURES_C.end(),
            });
        }
        if f32::from(active_c) < self.baseline_c {
            return Err(ConfigError::ActiveBelowBaseline {
                active_c,
                baseline_c: self.baseline_c,
            });
        }

        if let ProcedureParameters::Cyclic(cyclic) = &self.procedure {
            if cyclic.marker_port.trim().is_empty() {
                return Err(ConfigError::EmptyPort { role: "Marker" });
            }
            cyclic.intervals.validate()?;
            if !is_zone_permutation(&cyclic.zone_order) {
                return Err(ConfigError::InvalidZoneOrder);
            }
            let floor_s = Self::total_duration_floor_s(self.hold_duration_s, &cyclic.intervals);
            if cyclic.total_duration_s <= floor_s {
                return Err(ConfigError::TotalDurationTooShort {
                    requested_s: cyclic.total_duration_s,
                    must_exceed_s: floor_s,
                });
            }
        }

        Ok(())
    }
}

/// Whether `order` names each zone exactly once.
fn is_zone_permutation(order: &[Zone; ZONE_COUNT]) -> bool {
    let mut seen = [false; ZONE_COUNT];
    for zone in order {
        if seen[zone.index()] {
            return false;
        }
        seen[zone.index()] = true;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold() -> SessionParameters {
        SessionParameters::threshold("S01", "A", "COM5", 46)
    }

    fn cyclic(total_s: u32) -> SessionParameters {
        SessionParameters::cyclic("S01", "A", "COM5", "COM8", 51, total_s)
    }

    #[test]
    fn test_interval_set_default_values() {
        let set = IntervalSet::DEFAULT;
        assert_eq!(set.len(), 8);
        assert_eq!(set.get(0), Some(Duration::from_millis(8_000)));
        assert_eq!(set.get(7), Some(Duration::from_millis(11_500)));
        assert_eq!(set.get(8), None);
        assert_eq!(set.iter().count(), 8);
        assert_eq!(set.upper_bound_s(), 12);
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_interval_set_rejects_degenerate() {
        let zero_step = IntervalSet { min_ms: 1_000, max_ms: 2_000, step_ms: 0 };
        assert!(zero_step.validate().is_err());

        let empty = IntervalSet { min_ms: 2_000, max_ms: 2_000, step_ms: 500 };
        assert!(empty.is_empty());
        assert!(empty.validate().is_err());

        let too_short = IntervalSet { min_ms: 100, max_ms: 1_000, step_ms: 100 };
        assert!(too_short.validate().is_err());
    }

    #[test]
    fn test_threshold_validation() {
        assert!(threshold().validate().is_ok());

        let mut params = threshold();
        params.subject_id = String::from("  ");
        assert_eq!(params.validate(), Err(ConfigError::EmptySubjectId));

        let params = SessionParameters::threshold("S01", "A", "COM5", 61);
        assert!(matches!(
            params.validate(),
            Err(ConfigError::TemperatureNotAllowed { requested_c: 61, .. })
        ));

        let params = SessionParameters::threshold("S01", "A", "COM5", 31);
        assert!(params.validate().is_err());

        assert_eq!(threshold().with_hold(0).validate(), Err(ConfigError::ZeroHoldDuration));
    }

    #[test]
    fn test_hold_ceiling() {
        assert!(threshold().with_hold(MAX_HOLD_S).validate().is_ok());
        assert_eq!(
            threshold().with_hold(100).validate(),
            Err(ConfigError::HoldOutOfRange { requested_s: 100, maximum_s: MAX_HOLD_S })
        );

        // Rejected before the total-duration floor is computed
        assert_eq!(
            cyclic(300).with_hold(u32::MAX).validate(),
            Err(ConfigError::HoldOutOfRange { requested_s: u32::MAX, maximum_s: MAX_HOLD_S })
        );
    }

    #[test]
    fn test_total_duration_floor_saturates() {
        let floor = SessionParameters::total_duration_floor_s(u32::MAX, &IntervalSet::DEFAULT);
        assert_eq!(floor, u32::MAX);
        assert_eq!(SessionParameters::total_duration_floor_s(1, &IntervalSet::DEFAULT), 14);
    }

    #[test]
    fn test_temperature_bounds_inclusive() {
        for t in [32, 46, 60] {
            assert!(SessionParameters::threshold("S", "1", "COM5", t).validate().is_ok());
        }
    }

    #[test]
    fn test_baseline_validation() {
        assert!(matches!(
            threshold().with_baseline(45.0).validate(),
            Err(ConfigError::BaselineOutOfRange { .. })
        ));
        let params = SessionParameters::threshold("S", "1", "COM5", 33).with_baseline(35.0);
        assert!(matches!(params.validate(), Err(ConfigError::ActiveBelowBaseline { .. })));
    }

    #[test]
    fn test_cyclic_total_duration_floor() {
        // hold 1 + max interval 12 + 1
        assert!(matches!(
            cyclic(14).validate(),
            Err(ConfigError::TotalDurationTooShort { requested_s: 14, must_exceed_s: 14 })
        ));
        assert!(cyclic(15).validate().is_ok());
        assert!(cyclic(300).validate().is_ok());
    }

    #[test]
    fn test_cyclic_requires_marker_port_and_permutation() {
        let mut params = cyclic(300);
        if let ProcedureParameters::Cyclic(c) = &mut params.procedure {
            c.marker_port.clear();
        }
        assert_eq!(params.validate(), Err(ConfigError::EmptyPort { role: "Marker" }));

        let mut params = cyclic(300);
        if let ProcedureParameters::Cyclic(c) = &mut params.procedure {
            c.zone_order = [Zone::Z1, Zone::Z1, Zone::Z2, Zone::Z3, Zone::Z4];
        }
        assert_eq!(params.validate(), Err(ConfigError::InvalidZoneOrder));
    }

    #[test]
    fn test_profile_from_parameters() {
        let profile = threshold().with_hold(3).profile();
        assert_eq!(profile.durations_s, [3.0; ZONE_COUNT]);
        assert_eq!(profile.baseline_c, DEFAULT_BASELINE_C);
    }
}
