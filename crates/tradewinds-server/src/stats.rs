//! Account statistics: per-person, per-nation results across finished games.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use tradewinds_core::{NationId, RankingEntry, RoomState};

use crate::store::StoreError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NationRecord {
    pub wins: u32,
    pub max_capital: i64,
    pub last_played: Option<DateTime<Utc>>,
}

pub type PlayerStats = BTreeMap<NationId, NationRecord>;

#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Empty stats for an unknown person.
    async fn load(&self, external_id: &str) -> Result<PlayerStats, StoreError>;
    async fn save(&self, external_id: &str, stats: PlayerStats) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStatsStore {
    players: RwLock<HashMap<String, PlayerStats>>,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsStore for MemoryStatsStore {
    async fn load(&self, external_id: &str) -> Result<PlayerStats, StoreError> {
        Ok(self
            .players
            .read()
            .await
            .get(external_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, external_id: &str, stats: PlayerStats) -> Result<(), StoreError> {
        self.players
            .write()
            .await
            .insert(external_id.to_string(), stats);
        Ok(())
    }
}

/// Fold one finished game into every roster member's record. Returns how many were written.
pub async fn record_game(
    stats: &dyn StatsStore,
    room: &RoomState,
    rankings: &[RankingEntry],
    finished_at: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let winner = rankings.first().map(|r| r.nation);
    let mut written = 0;
    for team in room.teams.values() {
        for member in &team.members {
            let mut player = stats.load(&member.external_id).await?;
            let record = player.entry(team.nation).or_default();
            if winner == Some(team.nation) {
                record.wins += 1;
            }
            record.max_capital = record.max_capital.max(team.total_capital);
            record.last_played = Some(finished_at);
            stats.save(&member.external_id, player).await?;
            written += 1;
        }
    }
    Ok(written)
}
