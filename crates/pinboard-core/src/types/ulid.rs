use derive_more::{Deref, DerefMut, Display};
use serde::{Deserialize, Serialize, Serializer, de::Deserializer};
use std::{
    str::FromStr,
    sync::{LazyLock, Mutex},
};
use thiserror::Error as ThisError;
use ulid::Ulid as WrappedUlid;

///
/// Error
///

#[derive(Debug, ThisError)]
pub enum UlidError {
    #[error("invalid ulid string")]
    InvalidString,

    #[error("monotonic error - overflow")]
    GeneratorOverflow,
}

///
/// Ulid
///
/// Wrapper over the `ulid` crate's type with a monotonic process-wide
/// generator and string-based serde (so ids are usable as JSON map keys).
///

#[derive(
    Clone, Copy, Debug, Deref, DerefMut, Display, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
#[repr(transparent)]
pub struct Ulid(WrappedUlid);

impl Ulid {
    pub const STORED_SIZE: u32 = 16;

    #[must_use]
    pub const fn nil() -> Self {
        Self(WrappedUlid::nil())
    }

    #[must_use]
    pub const fn from_parts(timestamp_ms: u64, random: u128) -> Self {
        Self(WrappedUlid::from_parts(timestamp_ms, random))
    }

    /// generate
    /// Generate a ULID with the current timestamp and a random value.
    /// Falls back to nil on generator overflow.
    #[must_use]
    pub fn generate() -> Self {
        Self::try_generate().unwrap_or_else(|_| Self::nil())
    }

    /// try_generate
    /// Fallible ULID generation preserving error type (e.g., overflow).
    pub fn try_generate() -> Result<Self, UlidError> {
        generate_monotonic()
    }

    /// from_bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(WrappedUlid::from_bytes(bytes))
    }

    #[must_use]
    pub const fn to_bytes(&self) -> [u8; 16] {
        self.0.to_bytes()
    }

    /// from_u128
    #[must_use]
    pub const fn from_u128(n: u128) -> Self {
        Self(WrappedUlid::from_bytes(n.to_be_bytes()))
    }
}

impl Default for Ulid {
    fn default() -> Self {
        Self::nil()
    }
}

impl From<WrappedUlid> for Ulid {
    fn from(ulid: WrappedUlid) -> Self {
        Self(ulid)
    }
}

impl FromStr for Ulid {
    type Err = UlidError;

    fn from_str(encoded: &str) -> Result<Self, Self::Err> {
        WrappedUlid::from_string(encoded)
            .map(Self)
            .map_err(|_| UlidError::InvalidString)
    }
}

impl Serialize for Ulid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Ulid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;

        Self::from_str(&encoded).map_err(serde::de::Error::custom)
    }
}

///
/// GENERATOR is lazily initiated with a Mutex
/// it has to keep state to make sure key order is maintained
///

static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::default()));

fn generate_monotonic() -> Result<Ulid, UlidError> {
    let mut generator = GENERATOR.lock().expect("ULID generator mutex poisoned");

    generator.generate()
}

///
/// Generator
///
/// Monotonic generation: within the same millisecond the previous value is
/// incremented instead of re-randomized, so generation order matches sort
/// order.
///

#[derive(Default)]
struct Generator {
    previous: Ulid,
}

impl Generator {
    fn generate(&mut self) -> Result<Ulid, UlidError> {
        let last_ts = self.previous.timestamp_ms();
        let candidate = WrappedUlid::new();

        // maybe time went backward, or it is the same ms.
        // increment instead of generating a new random so that it is monotonic
        if candidate.timestamp_ms() <= last_ts {
            let Some(next) = self.previous.increment() else {
                return Err(UlidError::GeneratorOverflow);
            };
            self.previous = Ulid(next);

            return Ok(self.previous);
        }

        self.previous = Ulid(candidate);

        Ok(self.previous)
    }
}

///
/// TESTS
///
