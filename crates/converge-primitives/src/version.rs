//! Protocol build version.
//!
//! Carried in every sync envelope under the `ver` key. A peer running a
//! strictly newer build is tolerated (forward compatibility); a peer running
//! an incompatibly older one surfaces as decode failures and is logged by
//! the engine.

use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Monotonically increasing protocol build number.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct BuildVersion(u32);

impl BuildVersion {
    /// The build this crate speaks.
    pub const CURRENT: Self = Self(1);

    #[must_use]
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_newer_than(self, other: Self) -> bool {
        self.0 > other.0
    }
}

impl Display for BuildVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
