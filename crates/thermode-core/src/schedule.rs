//! Fixed-order zone schedule for cyclic sessions
//!
//! The cyclic protocol visits the five zones in a fixed permutation,
//! wrapping around for as long as the session runs.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Zone, ZONE_COUNT};

/// Visit order used unless the operator configures another.
pub const DEFAULT_ZONE_ORDER: [Zone; ZONE_COUNT] = [Zone::Z1, Zone::Z4, Zone::Z2, Zone::Z5, Zone::Z3];

/// Position within the cyclic visit order and the session time budget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclicScheduleState {
    order: [Zone; ZONE_COUNT],
    position: usize,
    visits: u32,
    total: Duration,
}

impl CyclicScheduleState {
    /// Start at the beginning of `order` with a session budget of `total`.
    #[must_use]
    pub fn new(order: [Zone; ZONE_COUNT], total: Duration) -> Self {
        Self {
            order,
            position: 0,
            visits: 0,
            total,
        }
    }

    /// Return the zone at the current position and advance, wrapping.
    pub fn next_zone(&mut self) -> Zone {
        let zone = self.order[self.position];
        self.position = (self.position + 1) % ZONE_COUNT;
        self.visits += 1;
        zone
    }

    /// Zone the next call to [`Self::next_zone`] will return.
    #[inline]
    pub fn peek(&self) -> Zone {
        self.order[self.position]
    }

    /// Index into the order of the next zone.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Zones handed out so far.
    #[inline]
    pub fn visits(&self) -> u32 {
        self.visits
    }

    /// The configured visit order.
    #[inline]
    pub fn order(&self) -> &[Zone; ZONE_COUNT] {
        &self.order
    }

    /// Session budget.
    #[inline]
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Whether another stimulus may start at `elapsed`.
    #[inline]
    pub fn has_remaining(&self, elapsed: Duration) -> bool {
        elapsed < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order_wraps() {
        let mut schedule = CyclicScheduleState::new(DEFAULT_ZONE_ORDER, Duration::from_secs(60));
        let visited: std::vec::Vec<u8> = (0..7).map(|_| schedule.next_zone().number()).collect();
        assert_eq!(visited, [1, 4, 2, 5, 3, 1, 4]);
        assert_eq!(schedule.position(), 2);
        assert_eq!(schedule.visits(), 7);
        assert_eq!(schedule.peek(), Zone::Z2);
    }

    #[test]
    fn test_remaining_boundary() {
        let schedule = CyclicScheduleState::new(DEFAULT_ZONE_ORDER, Duration::from_secs(20));
        assert!(schedule.has_remaining(Duration::from_millis(19_999)));
        assert!(!schedule.has_remaining(Duration::from_secs(20)));
        assert!(!schedule.has_remaining(Duration::from_secs(21)));
    }
}
