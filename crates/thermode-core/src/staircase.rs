//! Ascending staircase (method of limits)
//!
//! The staircase presents a stimulus at the current temperature, then moves
//! up by [`STEP_UP_C`] on every "not painful" answer. The first "painful"
//! answer confirms the threshold. If the next step would exceed
//! [`MAX_TEMP_C`] the search ends without issuing that stimulus.

use serde::{Deserialize, Serialize};

use crate::config::MAX_TEMP_C;
use crate::types::Response;

/// Increment applied after a "not painful" answer (°C).
pub const STEP_UP_C: u8 = 1;

/// How a staircase run ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StaircaseOutcome {
    /// Subject reported pain at this temperature
    ThresholdFound {
        /// Confirmed threshold (°C)
        threshold_c: u8,
    },
    /// Ceiling reached without a painful answer
    MaxExceeded {
        /// Temperature the next step would have used (°C)
        attempted_c: u8,
    },
}

/// Mutable state of one threshold search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaircaseState {
    current_c: u8,
    ceiling_c: u8,
    trials: u32,
    outcome: Option<StaircaseOutcome>,
}

impl StaircaseState {
    /// Start a search at `start_c` with the standard ceiling.
    #[must_use]
    pub fn new(start_c: u8) -> Self {
        Self::with_ceiling(start_c, MAX_TEMP_C)
    }

    /// Start a search at `start_c` with a custom ceiling.
    ///
    /// A start above the ceiling is lowered to the ceiling.
    #[must_use]
    pub fn with_ceiling(start_c: u8, ceiling_c: u8) -> Self {
        Self {
            current_c: start_c.min(ceiling_c),
            ceiling_c,
            trials: 0,
            outcome: None,
        }
    }

    /// Temperature of the next (or last) stimulus (°C).
    #[inline]
    pub fn current_c(&self) -> u8 {
        self.current_c
    }

    /// Highest temperature a stimulus may use (°C).
    #[inline]
    pub fn ceiling_c(&self) -> u8 {
        self.ceiling_c
    }

    /// Responses recorded so far.
    #[inline]
    pub fn trials(&self) -> u32 {
        self.trials
    }

    /// Terminal outcome, once reached.
    #[inline]
    pub fn outcome(&self) -> Option<StaircaseOutcome> {
        self.outcome
    }

    /// Whether the search has ended.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Record the answer to the stimulus at [`Self::current_c`].
    ///
    /// Returns the outcome when this answer ends the search. Answers after
    /// the search ended are ignored and return `None`.
    pub fn record(&mut self, response: Response) -> Option<StaircaseOutcome> {
        if self.is_terminal() {
            return None;
        }
        self.trials += 1;

        let outcome = match response {
            Response::Painful => Some(StaircaseOutcome::ThresholdFound {
                threshold_c: self.current_c,
            }),
            Response::NotPainful => {
                let next = self.current_c.saturating_add(STEP_UP_C);
                if next > self.ceiling_c {
                    Some(StaircaseOutcome::MaxExceeded { attempted_c: next })
                } else {
                    self.current_c = next;
                    None
                }
            }
        };
        self.outcome = outcome;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_painful_on_third_trial() {
        let mut s = StaircaseState::new(46);
        assert_eq!(s.record(Response::NotPainful), None);
        assert_eq!(s.record(Response::NotPainful), None);
        assert_eq!(s.current_c(), 48);
        assert_eq!(
            s.record(Response::Painful),
            Some(StaircaseOutcome::ThresholdFound { threshold_c: 48 })
        );
        assert_eq!(s.trials(), 3);
        assert!(s.is_terminal());
    }

    #[test]
    fn test_never_painful_stops_at_ceiling() {
        let mut s = StaircaseState::new(46);
        let mut issued = std::vec::Vec::new();
        loop {
            issued.push(s.current_c());
            if let Some(outcome) = s.record(Response::NotPainful) {
                assert_eq!(outcome, StaircaseOutcome::MaxExceeded { attempted_c: 61 });
                break;
            }
        }
        // 46..=60
        assert_eq!(issued.len(), 15);
        assert!(issued.windows(2).all(|w| w[1] == w[0] + STEP_UP_C));
        assert!(issued.iter().all(|t| *t <= MAX_TEMP_C));
        assert_eq!(s.current_c(), 60);
    }

    #[test]
    fn test_start_at_max() {
        let mut s = StaircaseState::new(60);
        assert_eq!(
            s.record(Response::NotPainful),
            Some(StaircaseOutcome::MaxExceeded { attempted_c: 61 })
        );
        assert_eq!(s.trials(), 1);
    }

    #[test]
    fn test_answers_after_terminal_ignored() {
        let mut s = StaircaseState::new(50);
        s.record(Response::Painful);
        assert_eq!(s.record(Response::NotPainful), None);
        assert_eq!(s.current_c(), 50);
        assert_eq!(s.trials(), 1);
    }

    #[test]
    fn test_custom_ceiling() {
        let s = StaircaseState::with_ceiling(45, 40);
        assert_eq!(s.current_c(), 40);
        assert_eq!(s.ceiling_c(), 40);
    }
}
