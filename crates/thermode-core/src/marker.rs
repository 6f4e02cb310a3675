//! Event markers for acquisition synchronisation
//!
//! A marker is a single byte written to the acquisition device so that
//! experiment events line up with the physiological recording. Zone
//! markers carry the zone number (1–5); the session begin and end
//! sentinels use values outside that range.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Zone;

/// Single-byte event marker.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Marker(u8);

impl Marker {
    /// Session begin sentinel
    pub const BEGIN: Self = Self(11);

    /// Session end sentinel
    pub const END: Self = Self(22);

    /// Marker for a stimulus delivered on `zone`.
    #[inline]
    #[must_use]
    pub const fn for_zone(zone: Zone) -> Self {
        Self(zone.number())
    }

    /// Wrap a raw byte.
    #[inline]
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Raw byte sent on the wire
    #[inline]
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self.0
    }

    /// Whether this is the begin or end sentinel.
    #[inline]
    #[must_use]
    pub const fn is_sentinel(self) -> bool {
        self.0 == Self::BEGIN.0 || self.0 == Self::END.0
    }

    /// The zone this marker identifies, if it is a zone marker.
    #[must_use]
    pub const fn zone(self) -> Option<Zone> {
        if self.is_sentinel() {
            None
        } else {
            Zone::new(self.0)
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Sentinels must never collide with a zone marker.
const _: () = {
    let mut n = 1;
    while n <= 5 {
        assert!(n != Marker::BEGIN.0 && n != Marker::END.0);
        n += 1;
    }
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_disjoint_from_zones() {
        for zone in Zone::ALL {
            let marker = Marker::for_zone(zone);
            assert_ne!(marker, Marker::BEGIN);
            assert_ne!(marker, Marker::END);
            assert!(!marker.is_sentinel());
            assert_eq!(marker.zone(), Some(zone));
        }
        assert!(Marker::BEGIN.is_sentinel());
        assert!(Marker::END.is_sentinel());
        assert_eq!(Marker::BEGIN.zone(), None);
    }

    #[test]
    fn test_wire_values() {
        assert_eq!(Marker::BEGIN.to_byte(), 11);
        assert_eq!(Marker::END.to_byte(), 22);
        assert_eq!(Marker::for_zone(Zone::Z4).to_byte(), 4);
        assert_eq!(Marker::from_byte(3).zone(), Some(Zone::Z3));
        assert_eq!(Marker::from_byte(9).zone(), None);
    }
}
