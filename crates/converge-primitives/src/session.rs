use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// The privileged principal. A session owned by `root` passes every
/// built-in authorization rule.
pub const ROOT: &str = "root";

/// An authenticated principal context.
///
/// Session creation and validation live outside the core; sync and
/// authorization only ever read the owner.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Session {
    owner: String,
}

impl Session {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
        }
    }

    #[must_use]
    pub fn root() -> Self {
        Self::new(ROOT)
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.owner == ROOT
    }
}

/// Session identifier of the form `<userId>/<uniqueId>`.
///
/// The unique part is globally unique; [`SessionId::generate`] draws 128
/// random bits and bs58-encodes them.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SessionId {
    user: String,
    unique: String,
}

impl SessionId {
    pub fn generate(user: impl Into<String>) -> Self {
        let mut bytes = [0_u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);

        Self {
            user: user.into(),
            unique: bs58::encode(bytes).into_string(),
        }
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[must_use]
    pub fn unique(&self) -> &str {
        &self.unique
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.unique)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ThisError)]
#[error("session id must be of the form <userId>/<uniqueId>")]
pub struct InvalidSessionId;

impl FromStr for SessionId {
    type Err = InvalidSessionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The unique part never contains a separator; the user part may.
        let (user, unique) = s.rsplit_once('/').ok_or(InvalidSessionId)?;

        if user.is_empty() || unique.is_empty() {
            return Err(InvalidSessionId);
        }

        Ok(Self {
            user: user.to_owned(),
            unique: unique.to_owned(),
        })
    }
}
