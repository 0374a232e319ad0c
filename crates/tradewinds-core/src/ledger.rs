//! Per-nation team ledger: capital, goods, voyage and ability state for one room.

use serde::{Deserialize, Serialize};

use crate::ids::ConnectionId;
use crate::nation::{Abilities, CountryProfile, NationId};
use crate::rps::RpsRecord;

/// Voyage destinations. Each market yields one kind of goods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    India,
    Americas,
    /// Stay in port: a zero-amount selection.
    Stay,
}

impl Destination {
    pub fn good(self) -> Option<Good> {
        match self {
            Self::India => Some(Good::Spice),
            Self::Americas => Some(Good::Sugar),
            Self::Stay => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Good {
    Spice,
    Sugar,
}

impl Good {
    pub const ALL: [Good; 2] = [Good::Spice, Good::Sugar];
}

/// Goods inventory. Counters only grow within a round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goods {
    pub spice: i64,
    pub sugar: i64,
}

impl Goods {
    pub fn get(&self, good: Good) -> i64 {
        match good {
            Good::Spice => self.spice,
            Good::Sugar => self.sugar,
        }
    }

    /// Credit `amount` units; negative amounts are ignored.
    pub fn credit(&mut self, good: Good, amount: i64) {
        let amount = amount.max(0);
        match good {
            Good::Spice => self.spice += amount,
            Good::Sugar => self.sugar += amount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub external_id: String,
    pub display_name: String,
    pub connection: Option<ConnectionId>,
    pub connected: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoyageSelection {
    pub destination: Destination,
    pub amount: i64,
    pub committed_by: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentMade {
    pub target: NationId,
    pub amount: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentReceived {
    pub source: NationId,
    pub amount: i64,
    pub investor_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Multipliers {
    pub capital: f64,
    pub goods: f64,
}

impl Multipliers {
    pub const NEUTRAL: Multipliers = Multipliers {
        capital: 1.0,
        goods: 1.0,
    };
}

impl Default for Multipliers {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// The drawn voyage event for this round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventOutcome {
    pub name: String,
    pub roll: u32,
    pub multipliers: Multipliers,
    pub disaster: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamLedger {
    pub nation: NationId,
    pub name: String,
    pub members: Vec<Member>,

    pub abilities: Abilities,
    pub max_batch_count: u32,
    pub capital_per_batch: i64,
    pub clicks_per_batch: u32,

    /// Never negative; every mutation goes through [`TeamLedger::adjust_capital`].
    pub total_capital: i64,
    pub goods: Goods,

    pub batch_count: u32,
    pub production_rps: Option<RpsRecord>,
    pub production_reroll_used: bool,

    pub voyage: Option<VoyageSelection>,
    pub investments_made: Vec<InvestmentMade>,
    pub investments_received: Vec<InvestmentReceived>,

    pub reroll_tokens: u32,
    pub mercantilism_tokens: u32,
    /// Lifetime count of mercantilism bonuses paid.
    pub mercantilism_uses: u32,

    pub event_drawn_this_round: bool,
    pub event: Option<EventOutcome>,
    pub multipliers: Multipliers,
    pub disaster_occurred: bool,
    pub arrival_rps_played: bool,
    pub arrival_rps: Option<RpsRecord>,
    pub arrival_reroll_used: bool,

    pub settlement_done_this_round: bool,
}

impl TeamLedger {
    pub fn new(nation: NationId, profile: &CountryProfile) -> Self {
        Self {
            nation,
            name: profile.name.clone(),
            members: Vec::new(),
            abilities: profile.abilities,
            max_batch_count: profile.max_batch_count,
            capital_per_batch: profile.capital_per_batch,
            clicks_per_batch: profile.clicks_per_batch,
            total_capital: 0,
            goods: Goods::default(),
            batch_count: 0,
            production_rps: None,
            production_reroll_used: false,
            voyage: None,
            investments_made: Vec::new(),
            investments_received: Vec::new(),
            reroll_tokens: if profile.abilities.reroll {
                profile.reroll_tokens
            } else {
                0
            },
            mercantilism_tokens: if profile.abilities.mercantilism {
                profile.mercantilism_tokens
            } else {
                0
            },
            mercantilism_uses: 0,
            event_drawn_this_round: false,
            event: None,
            multipliers: Multipliers::NEUTRAL,
            disaster_occurred: false,
            arrival_rps_played: false,
            arrival_rps: None,
            arrival_reroll_used: false,
            settlement_done_this_round: false,
        }
    }

    /// Apply a signed capital change, clamping at zero. Returns the change actually applied.
    pub fn adjust_capital(&mut self, delta: i64) -> i64 {
        let before = self.total_capital;
        self.total_capital = before.saturating_add(delta).max(0);
        self.total_capital - before
    }

    /// True when a voyage to a real market has been committed this round.
    pub fn has_voyage(&self) -> bool {
        self.voyage
            .as_ref()
            .is_some_and(|v| v.destination != Destination::Stay && v.amount > 0)
    }

    pub fn member(&self, external_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.external_id == external_id)
    }

    pub fn member_mut(&mut self, external_id: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.external_id == external_id)
    }

    pub fn connected_members(&self) -> usize {
        self.members.iter().filter(|m| m.connected).count()
    }

    /// State cleared on entry into PRODUCTION.
    pub fn reset_production(&mut self) {
        self.batch_count = 0;
        self.production_rps = None;
        self.production_reroll_used = false;
    }

    /// State cleared on entry into ARRIVAL.
    pub fn reset_arrival(&mut self) {
        self.event_drawn_this_round = false;
        self.event = None;
        self.multipliers = Multipliers::NEUTRAL;
        self.disaster_occurred = false;
        self.arrival_rps_played = false;
        self.arrival_rps = None;
        self.arrival_reroll_used = false;
    }

    /// Full per-round reset after settlement. Capital, goods and lifetime ability counters
    /// are kept.
    pub fn reset_round(&mut self) {
        self.reset_production();
        self.reset_arrival();
        self.voyage = None;
        self.investments_made.clear();
        self.investments_received.clear();
        self.settlement_done_this_round = false;
    }
}
