//! PRODUCTION phase: batch clicks, the production RPS round and its reroll.

use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::nation::NationId;
use crate::rng::RandomSource;
use crate::room::{Phase, RoomState};
use crate::rps::{self, Hand, RpsRecord};
use crate::rules::Policy;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Produced { batch_count: u32, total_capital: i64 },
    /// Cap already hit; nothing changed.
    MaxReached { batch_count: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerollOutcome {
    /// Delta that was undone.
    pub reversed: i64,
    pub tokens_left: u32,
}

pub fn record_production_batch(
    room: &mut RoomState,
    nation: NationId,
) -> Result<BatchOutcome, GameError> {
    room.require_phase("production batch", Phase::Production)?;
    let team = room.team_mut(nation)?;
    if team.batch_count >= team.max_batch_count {
        return Ok(BatchOutcome::MaxReached {
            batch_count: team.batch_count,
        });
    }
    team.batch_count += 1;
    let per_batch = team.capital_per_batch;
    team.adjust_capital(per_batch);
    Ok(BatchOutcome::Produced {
        batch_count: team.batch_count,
        total_capital: team.total_capital,
    })
}

pub fn play_production_rps(
    room: &mut RoomState,
    policy: &Policy,
    rng: &mut dyn RandomSource,
    nation: NationId,
    hand: Hand,
) -> Result<RpsRecord, GameError> {
    room.require_phase("production rock-paper-scissors", Phase::Production)?;
    let team = room.team_mut(nation)?;
    if team.production_rps.is_some() {
        return Err(GameError::RpsAlreadyPlayed);
    }
    let mut record = rps::play(rng, hand, team.abilities, policy.production_rps);
    record.delta = team.adjust_capital(record.delta);
    team.production_rps = Some(record);
    Ok(record)
}

/// Undo the production RPS round so it can be played once more.
pub fn reroll_production(room: &mut RoomState, nation: NationId) -> Result<RerollOutcome, GameError> {
    room.require_phase("production reroll", Phase::Production)?;
    let team = room.team_mut(nation)?;
    if !team.abilities.reroll {
        return Err(GameError::NoRerollAbility);
    }
    if team.production_reroll_used {
        return Err(GameError::RerollAlreadyUsed);
    }
    if team.reroll_tokens == 0 {
        return Err(GameError::NoRerollTokens);
    }
    let record = team.production_rps.ok_or(GameError::RpsNotPlayed)?;

    team.adjust_capital(-record.delta);
    team.production_rps = None;
    team.reroll_tokens -= 1;
    team.production_reroll_used = true;
    Ok(RerollOutcome {
        reversed: record.delta,
        tokens_left: team.reroll_tokens,
    })
}
