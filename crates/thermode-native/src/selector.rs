//! Stimulation zone selection
//!
//! Threshold searches draw a zone uniformly at random for every trial.
//! Cyclic sessions walk a fixed permutation of the zones.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use thermode_core::schedule::CyclicScheduleState;
use thermode_core::types::{Zone, ZONE_COUNT};

/// Zone selection policy.
#[derive(Clone, Debug)]
pub enum SpatialSelector {
    /// Independent uniform draw per trial
    Uniform(StdRng),
    /// Fixed order, wrapping
    Cyclic(CyclicScheduleState),
}

impl SpatialSelector {
    /// Uniform selection seeded from the OS.
    #[must_use]
    pub fn uniform() -> Self {
        Self::Uniform(StdRng::from_entropy())
    }

    /// Uniform selection with a fixed seed.
    #[must_use]
    pub fn uniform_seeded(seed: u64) -> Self {
        Self::Uniform(StdRng::seed_from_u64(seed))
    }

    /// Cyclic selection over `order` for a session of length `total`.
    #[must_use]
    pub fn cyclic(order: [Zone; ZONE_COUNT], total: Duration) -> Self {
        Self::Cyclic(CyclicScheduleState::new(order, total))
    }

    /// Zone for the next trial.
    pub fn next_zone(&mut self) -> Zone {
        match self {
            Self::Uniform(rng) => Zone::ALL[rng.gen_range(0..ZONE_COUNT)],
            Self::Cyclic(schedule) => schedule.next_zone(),
        }
    }

    /// Cyclic schedule state, if this is a cyclic selector.
    pub fn schedule(&self) -> Option<&CyclicScheduleState> {
        match self {
            Self::Uniform(_) => None,
            Self::Cyclic(schedule) => Some(schedule),
        }
    }
}
