use serde::{Deserialize, Serialize};

use crate::ranking::RankingEntry;
use crate::room::Phase;
use crate::settlement::SettlementRecord;
use crate::view::{RoomView, VoyageProjection};

/// Notifications produced by a phase transition, in emission order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RoomEvent {
    VoyageSettled(SettlementRecord),
    /// Unredacted snapshot taken after settlement and before the round reset.
    RoundClosed(Box<RoomView>),
    PhaseChanged { phase: Phase, round: u32 },
    InvestmentBoard(Vec<VoyageProjection>),
    GameEnded(Vec<RankingEntry>),
}
