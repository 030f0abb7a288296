//! Satoshi amount type with JSON-safe serialization.
//!
//! BCH amounts routinely exceed 2^53 (JavaScript's safe integer limit) but
//! never exceed `2^63-1` in this system (`spec.md` §3). [`Sats`] wraps a
//! `u64` and always serializes as a decimal string, the same precision
//! workaround the teacher's `UnixTimestamp` uses for Unix time.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A non-negative amount of satoshis, serialized as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Sats(u64);

impl Sats {
    pub const ZERO: Sats = Sats(0);

    pub const fn new(value: u64) -> Self {
        Sats(value)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Saturating subtraction, floored at zero — used by `resetPendingSats`.
    pub fn saturating_sub(self, rhs: Sats) -> Sats {
        Sats(self.0.saturating_sub(rhs.0))
    }

    pub fn checked_sub(self, rhs: Sats) -> Option<Sats> {
        self.0.checked_sub(rhs.0).map(Sats)
    }

    pub fn checked_add(self, rhs: Sats) -> Option<Sats> {
        self.0.checked_add(rhs.0).map(Sats)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Display for Sats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Sats {
    fn from(value: u64) -> Self {
        Sats(value)
    }
}

impl Add for Sats {
    type Output = Sats;
    fn add(self, rhs: Sats) -> Sats {
        Sats(self.0 + rhs.0)
    }
}

impl AddAssign for Sats {
    fn add_assign(&mut self, rhs: Sats) {
        self.0 += rhs.0;
    }
}

impl Sub for Sats {
    type Output = Sats;
    fn sub(self, rhs: Sats) -> Sats {
        Sats(self.0 - rhs.0)
    }
}

impl SubAssign for Sats {
    fn sub_assign(&mut self, rhs: Sats) {
        self.0 -= rhs.0;
    }
}

impl Sum for Sats {
    fn sum<I: Iterator<Item = Sats>>(iter: I) -> Self {
        iter.fold(Sats::ZERO, |a, b| a + b)
    }
}

impl Serialize for Sats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Sats {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        struct SatsVisitor;
        impl serde::de::Visitor<'_> for SatsVisitor {
            type Value = Sats;

            fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str("a non-negative integer or decimal string")
            }

            fn visit_str<E: Error>(self, v: &str) -> Result<Sats, E> {
                v.parse::<u64>()
                    .map(Sats)
                    .map_err(|_| E::custom("sats must be a non-negative integer"))
            }

            fn visit_u64<E: Error>(self, v: u64) -> Result<Sats, E> {
                Ok(Sats(v))
            }

            fn visit_i64<E: Error>(self, v: i64) -> Result<Sats, E> {
                u64::try_from(v)
                    .map(Sats)
                    .map_err(|_| E::custom("sats must be non-negative"))
            }
        }

        deserializer.deserialize_any(SatsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_json_as_a_string() {
        let value = Sats::new(21_000_000_00_000_000);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"2100000000000000\"");
        let back: Sats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        let balance = Sats::new(100);
        assert_eq!(balance.saturating_sub(Sats::new(150)), Sats::ZERO);
    }
}
