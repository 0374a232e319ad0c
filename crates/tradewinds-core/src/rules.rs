//! Game rules: country profiles plus the policy constants the engines read.
//!
//! Rules are YAML, either embedded in the binary or read from a directory holding
//! `nations.yaml` and `policy.yaml`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::nation::{NationId, ProfileTable};

/// Highest value of the event roll.
pub const EVENT_ROLL_MAX: u32 = 100;

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no profile for nation {0}")]
    MissingProfile(NationId),
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}

pub enum RulesSource<'a> {
    Embedded,
    Path(String),
    Bytes { nations: &'a str, policy: &'a str },
}

/// Win/lose deltas for one RPS mini-game. Draws are always zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpsDeltas {
    pub win: i64,
    pub lose: i64,
}

/// One outcome band of the voyage event roll.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventBand {
    pub name: String,
    /// Inclusive upper bound of the roll.
    pub max_roll: u32,
    pub capital_multiplier: f64,
    pub goods_multiplier: f64,
    #[serde(default)]
    pub disaster: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub voyage_minimum: i64,
    pub voyage_step: i64,
    pub investment_minimum: i64,
    pub investment_step: i64,
    /// Capital per unit of goods acquired on a voyage.
    pub goods_divisor: i64,
    pub production_rps: RpsDeltas,
    pub arrival_rps: RpsDeltas,
    pub event_bands: Vec<EventBand>,
    pub base_good_value: f64,
    pub scarcity_multiplier: f64,
    pub monopoly_bonus: i64,
    pub mercantilism_bonus: i64,
    pub mercantilism_lifetime_cap: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            voyage_minimum: 20,
            voyage_step: 10,
            investment_minimum: 10,
            investment_step: 10,
            goods_divisor: 10,
            production_rps: RpsDeltas { win: 2, lose: -1 },
            arrival_rps: RpsDeltas { win: 1, lose: -1 },
            event_bands: vec![
                EventBand {
                    name: "favorable_wind".into(),
                    max_roll: 15,
                    capital_multiplier: 1.0,
                    goods_multiplier: 2.0,
                    disaster: false,
                },
                EventBand {
                    name: "storm".into(),
                    max_roll: 35,
                    capital_multiplier: 0.0,
                    goods_multiplier: 0.0,
                    disaster: true,
                },
                EventBand {
                    name: "calm_seas".into(),
                    max_roll: EVENT_ROLL_MAX,
                    capital_multiplier: 1.0,
                    goods_multiplier: 1.0,
                    disaster: false,
                },
            ],
            base_good_value: 10.0,
            scarcity_multiplier: 1.1,
            monopoly_bonus: 15,
            mercantilism_bonus: 3,
            mercantilism_lifetime_cap: 10,
        }
    }
}

impl Policy {
    /// First band whose upper bound covers `roll`.
    pub fn band_for(&self, roll: u32) -> Option<&EventBand> {
        self.event_bands.iter().find(|b| roll <= b.max_roll)
    }

    pub fn validate(&self) -> Result<(), RulesError> {
        let invalid = |msg: &str| Err(RulesError::InvalidPolicy(msg.to_string()));
        if self.voyage_step <= 0 || self.investment_step <= 0 || self.goods_divisor <= 0 {
            return invalid("steps and goods divisor must be positive");
        }
        if self.voyage_minimum <= 0 || self.investment_minimum <= 0 {
            return invalid("minimum amounts must be positive");
        }
        if self.event_bands.is_empty() {
            return invalid("at least one event band is required");
        }
        let ascending = self
            .event_bands
            .windows(2)
            .all(|pair| pair[0].max_roll < pair[1].max_roll);
        if !ascending {
            return invalid("event bands must be strictly ascending");
        }
        if self.event_bands.last().map(|b| b.max_roll) != Some(EVENT_ROLL_MAX) {
            return invalid("last event band must end at 100");
        }
        let negative = self
            .event_bands
            .iter()
            .any(|b| b.capital_multiplier < 0.0 || b.goods_multiplier < 0.0);
        if negative {
            return invalid("event multipliers must not be negative");
        }
        Ok(())
    }
}

/// Everything the engines need that is fixed for the lifetime of the process.
#[derive(Clone, Debug, PartialEq)]
pub struct Rules {
    pub nations: ProfileTable,
    pub policy: Policy,
}

impl Rules {
    pub fn embedded() -> Result<Self, RulesError> {
        load_rules(RulesSource::Embedded)
    }
}

pub fn load_rules(source: RulesSource<'_>) -> Result<Rules, RulesError> {
    let rules = match source {
        RulesSource::Embedded => parse_rules(
            include_str!("../data/nations.yaml"),
            include_str!("../data/policy.yaml"),
        )?,
        RulesSource::Path(path) => {
            let nations = std::fs::read_to_string(format!("{path}/nations.yaml"))?;
            let policy = std::fs::read_to_string(format!("{path}/policy.yaml"))?;
            parse_rules(&nations, &policy)?
        }
        RulesSource::Bytes { nations, policy } => parse_rules(nations, policy)?,
    };

    if let Some(nation) = rules.nations.missing().into_iter().next() {
        return Err(RulesError::MissingProfile(nation));
    }
    rules.policy.validate()?;
    Ok(rules)
}

fn parse_rules(nations: &str, policy: &str) -> Result<Rules, RulesError> {
    Ok(Rules {
        nations: serde_yaml::from_str(nations)?,
        policy: serde_yaml::from_str(policy)?,
    })
}
