//! Nations and their static country profiles.
//!
//! Profiles are loaded once at startup (see [`crate::rules`]) and never mutated. Engine code
//! dispatches on [`Abilities`], never on the nation identity itself.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A playable trading nation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NationId {
    England,
    France,
    Netherlands,
    Portugal,
    Spain,
}

impl NationId {
    pub const ALL: [NationId; 5] = [
        NationId::England,
        NationId::France,
        NationId::Netherlands,
        NationId::Portugal,
        NationId::Spain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::England => "england",
            Self::France => "france",
            Self::Netherlands => "netherlands",
            Self::Portugal => "portugal",
            Self::Spain => "spain",
        }
    }
}

impl fmt::Display for NationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown nation `{0}`")]
pub struct UnknownNation(pub String);

impl FromStr for NationId {
    type Err = UnknownNation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NationId::ALL
            .into_iter()
            .find(|n| n.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownNation(s.to_string()))
    }
}

/// Capability set carried by a profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Abilities {
    /// May undo one RPS result per phase by spending a reroll token.
    pub reroll: bool,
    /// RPS losses are treated as draws.
    pub absolute_monarchy: bool,
    /// Earns a capital bonus on every payout with a positive goods multiplier.
    pub mercantilism: bool,
}

/// Immutable per-nation production and ability parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CountryProfile {
    pub name: String,
    pub trait_description: String,
    pub max_batch_count: u32,
    pub capital_per_batch: i64,
    pub clicks_per_batch: u32,
    #[serde(default)]
    pub abilities: Abilities,
    #[serde(default)]
    pub reroll_tokens: u32,
    #[serde(default)]
    pub mercantilism_tokens: u32,
}

/// Lookup table of country profiles keyed by nation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileTable {
    profiles: BTreeMap<NationId, CountryProfile>,
}

impl ProfileTable {
    pub fn get(&self, nation: NationId) -> Option<&CountryProfile> {
        self.profiles.get(&nation)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NationId, &CountryProfile)> {
        self.profiles.iter().map(|(n, p)| (*n, p))
    }

    /// Nations that have no profile in this table.
    pub fn missing(&self) -> Vec<NationId> {
        NationId::ALL
            .into_iter()
            .filter(|n| !self.profiles.contains_key(n))
            .collect()
    }
}
