//! Wire messages between clients and the room hub.
//!
//! Both directions are serde enums tagged by `type`. The TCP adapter frames them as JSON
//! lines; the MessagePack helpers serve binary transports.

use serde::{Deserialize, Serialize};

use tradewinds_core::{
    BatchOutcome, Destination, ErrorKind, EventDraw, Hand, InvestmentMade, NationId, Phase,
    RankingEntry, RerollOutcome, Registration, RoomEvent, RoomView, RpsRecord, SettlementRecord,
    TeamView, VoyageProjection, VoyageSelection,
};

/// Client-to-server messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Open a new room with the sender as administrator
    CreateRoom {
        admin_id: String,
        /// Requested code; generated when absent
        #[serde(default)]
        room: Option<String>,
    },
    /// Re-attach the administrator after a reconnect
    ReclaimAdmin { room: String, admin_id: String },
    Register {
        room: String,
        external_id: String,
        display_name: String,
        nation: NationId,
    },
    RequestState { room: String },

    // Administrator actions
    StartPhase { room: String, phase: Phase },
    EndGame { room: String },
    ResetGame { room: String },
    ResetProductionCounts { room: String },
    StartCountdown { room: String, seconds: u32 },
    StopCountdown { room: String },

    // Team actions
    ProductionBatch { room: String },
    PlayProductionRps { room: String, hand: Hand },
    RerollProductionRps { room: String },
    CommitVoyage {
        room: String,
        destination: Destination,
        #[serde(default)]
        amount: i64,
    },
    ResetVoyage { room: String },
    MakeInvestment {
        room: String,
        target: NationId,
        amount: i64,
    },
    ResetInvestments { room: String },
    DrawEvent { room: String },
    PlayArrivalRps { room: String, hand: Hand },
    RerollArrivalRps { room: String },
}

impl ClientMessage {
    pub fn room(&self) -> Option<&str> {
        match self {
            Self::CreateRoom { room, .. } => room.as_deref(),
            Self::ReclaimAdmin { room, .. }
            | Self::Register { room, .. }
            | Self::RequestState { room }
            | Self::StartPhase { room, .. }
            | Self::EndGame { room }
            | Self::ResetGame { room }
            | Self::ResetProductionCounts { room }
            | Self::StartCountdown { room, .. }
            | Self::StopCountdown { room }
            | Self::ProductionBatch { room }
            | Self::PlayProductionRps { room, .. }
            | Self::RerollProductionRps { room }
            | Self::CommitVoyage { room, .. }
            | Self::ResetVoyage { room }
            | Self::MakeInvestment { room, .. }
            | Self::ResetInvestments { room }
            | Self::DrawEvent { room }
            | Self::PlayArrivalRps { room, .. }
            | Self::RerollArrivalRps { room } => Some(room),
        }
    }

    /// Short action name used in results and logs.
    pub fn action(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "create_room",
            Self::ReclaimAdmin { .. } => "reclaim_admin",
            Self::Register { .. } => "register",
            Self::RequestState { .. } => "request_state",
            Self::StartPhase { .. } => "start_phase",
            Self::EndGame { .. } => "end_game",
            Self::ResetGame { .. } => "reset_game",
            Self::ResetProductionCounts { .. } => "reset_production_counts",
            Self::StartCountdown { .. } => "start_countdown",
            Self::StopCountdown { .. } => "stop_countdown",
            Self::ProductionBatch { .. } => "production_batch",
            Self::PlayProductionRps { .. } => "play_production_rps",
            Self::RerollProductionRps { .. } => "reroll_production_rps",
            Self::CommitVoyage { .. } => "commit_voyage",
            Self::ResetVoyage { .. } => "reset_voyage",
            Self::MakeInvestment { .. } => "make_investment",
            Self::ResetInvestments { .. } => "reset_investments",
            Self::DrawEvent { .. } => "draw_event",
            Self::PlayArrivalRps { .. } => "play_arrival_rps",
            Self::RerollArrivalRps { .. } => "reroll_arrival_rps",
        }
    }
}

/// Result payload of an accepted action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ActionOutcome {
    Done,
    Batch(BatchOutcome),
    Rps(RpsRecord),
    Reroll(RerollOutcome),
    Voyage(VoyageSelection),
    VoyageReset { refunded: Option<i64> },
    Investment(InvestmentMade),
    InvestmentsReset { refunded: i64 },
    Event(EventDraw),
}

/// Server-to-client messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    RoomCreated { room: String },
    Registered {
        room: String,
        registration: Registration,
    },
    AdminReclaimed { room: String },
    ActionResult {
        room: String,
        action: String,
        outcome: ActionOutcome,
    },
    /// Full or redacted snapshot of the room for this recipient
    RoomState { view: RoomView },
    /// The recipient's own team ledger
    TeamState { team: TeamView },
    PhaseChanged { room: String, phase: Phase, round: u32 },
    InvestmentBoard { room: String, voyages: Vec<VoyageProjection> },
    VoyageSettled { room: String, record: SettlementRecord },
    RoundClosed { room: String, view: RoomView },
    FinalRankings { room: String, rankings: Vec<RankingEntry> },
    Countdown { room: String, remaining_secs: u32 },
    CountdownStopped { room: String },
    /// The room expired or never existed; drop any cached session for it
    RoomNotFound { room: String },
    Error {
        kind: ErrorKind,
        action: String,
        message: String,
    },
}

impl ServerMessage {
    /// Wire form of an engine event. Round snapshots are redacted per recipient by the caller.
    pub fn from_event(room: &str, event: RoomEvent) -> Self {
        let room = room.to_string();
        match event {
            RoomEvent::VoyageSettled(record) => Self::VoyageSettled { room, record },
            RoomEvent::RoundClosed(view) => Self::RoundClosed { room, view: *view },
            RoomEvent::PhaseChanged { phase, round } => Self::PhaseChanged { room, phase, round },
            RoomEvent::InvestmentBoard(voyages) => Self::InvestmentBoard { room, voyages },
            RoomEvent::GameEnded(rankings) => Self::FinalRankings { room, rankings },
        }
    }
}

/// Serialize a client message for network transmission
pub fn serialize_client_message(msg: &ClientMessage) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec_named(msg)
}

/// Deserialize a client message from network data
pub fn deserialize_client_message(data: &[u8]) -> Result<ClientMessage, rmp_serde::decode::Error> {
    rmp_serde::from_slice(data)
}

/// Serialize a server message for network transmission
pub fn serialize_server_message(msg: &ServerMessage) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec_named(msg)
}

/// Deserialize a server message from network data
pub fn deserialize_server_message(data: &[u8]) -> Result<ServerMessage, rmp_serde::decode::Error> {
    rmp_serde::from_slice(data)
}

pub fn client_message_from_line(line: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(line.trim())
}

/// One JSON document followed by a newline.
pub fn server_message_to_line(msg: &ServerMessage) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}
