//! Strongly-typed names and identifiers
//!
//! Deployed objects carry a random lowercase suffix so the same logical
//! benchmark can be deployed again while an earlier copy is still being
//! torn down.

use rand::distributions::Uniform;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Length of the random suffix appended to deployed names
pub const SUFFIX_LEN: usize = 10;

/// Name of a deployed object: `<base>-<suffix>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeploymentName {
    base: String,
    suffix: String,
}

impl DeploymentName {
    /// Mint a fresh name with a random suffix.
    pub fn mint(base: impl Into<String>) -> Self {
        Self::mint_with(base, &mut rand::thread_rng())
    }

    pub fn mint_with<R: Rng + ?Sized>(base: impl Into<String>, rng: &mut R) -> Self {
        Self {
            base: base.into(),
            suffix: random_suffix(rng),
        }
    }

    /// Reuse a suffix minted for a sibling object.
    pub fn with_suffix(base: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            suffix: suffix.into(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl fmt::Display for DeploymentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.suffix)
    }
}

fn random_suffix<R: Rng + ?Sized>(rng: &mut R) -> String {
    let letters = Uniform::new_inclusive(b'a', b'z');
    (0..SUFFIX_LEN).map(|_| char::from(rng.sample(letters))).collect()
}

/// Identifier of one experiment run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run:{}", self.0)
    }
}
