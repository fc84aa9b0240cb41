use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Store-internal identifier for a persisted object.
///
/// An `Oid` is allocated by the store when an object is created in a working
/// view and never changes afterwards. It is distinct from the user-visible
/// `id` attribute, which validators check and which may repeat across
/// different parents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Oid(u64);

impl Oid {
    /// The root resource. Always present in every store.
    pub const ROOT: Oid = Oid(0);

    /// Wrap a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns `true` for the root resource.
    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }

    /// The next identifier in allocation order.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.0)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl FromStr for Oid {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('L').unwrap_or(s);
        digits.parse::<u64>().map(Self)
    }
}

impl From<u64> for Oid {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
