//! End-of-game scoring.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ledger::{Good, TeamLedger};
use crate::nation::NationId;
use crate::rules::Policy;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// 1-based.
    pub rank: u32,
    pub name: String,
    pub nation: NationId,
    pub capital: i64,
    pub spice: i64,
    pub sugar: i64,
    pub total_assets: i64,
    pub monopolies: Vec<Good>,
}

/// Per-unit value of each good for the current global totals.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub spice: f64,
    pub sugar: f64,
    pub scarce: Option<Good>,
}

impl Valuation {
    pub fn of(&self, good: Good) -> f64 {
        match good {
            Good::Spice => self.spice,
            Good::Sugar => self.sugar,
        }
    }
}

fn totals<'a>(teams: impl Iterator<Item = &'a TeamLedger>) -> (i64, i64) {
    teams.fold((0, 0), |(spice, sugar), t| {
        (spice + t.goods.spice, sugar + t.goods.sugar)
    })
}

/// A good is scarce when its total is positive and strictly below the other's.
pub fn valuation(policy: &Policy, spice_total: i64, sugar_total: i64) -> Valuation {
    let scarce = if spice_total > 0 && spice_total < sugar_total {
        Some(Good::Spice)
    } else if sugar_total > 0 && sugar_total < spice_total {
        Some(Good::Sugar)
    } else {
        None
    };
    let value = |good| {
        if scarce == Some(good) {
            policy.base_good_value * policy.scarcity_multiplier
        } else {
            policy.base_good_value
        }
    };
    Valuation {
        spice: value(Good::Spice),
        sugar: value(Good::Sugar),
        scarce,
    }
}

/// Rank every team by total assets, highest first.
///
/// Ties keep nation order, which is the iteration order of the room's team map.
pub fn compute_rankings(policy: &Policy, teams: &BTreeMap<NationId, TeamLedger>) -> Vec<RankingEntry> {
    let (spice_total, sugar_total) = totals(teams.values());
    let values = valuation(policy, spice_total, sugar_total);

    let mut scored: Vec<(f64, RankingEntry)> = teams
        .values()
        .map(|team| {
            let mut assets = team.total_capital as f64;
            let mut monopolies = Vec::new();
            for good in Good::ALL {
                let held = team.goods.get(good);
                assets += held as f64 * values.of(good);
                let total = match good {
                    Good::Spice => spice_total,
                    Good::Sugar => sugar_total,
                };
                if total > 0 && held * 2 > total {
                    assets += policy.monopoly_bonus as f64;
                    monopolies.push(good);
                }
            }
            let entry = RankingEntry {
                rank: 0,
                name: team.name.clone(),
                nation: team.nation,
                capital: team.total_capital,
                spice: team.goods.spice,
                sugar: team.goods.sugar,
                total_assets: assets.floor() as i64,
                monopolies,
            };
            (assets, entry)
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .enumerate()
        .map(|(idx, (_, mut entry))| {
            entry.rank = idx as u32 + 1;
            entry
        })
        .collect()
}
