//! Client-facing projections of a room.
//!
//! The authoritative [`RoomState`] carries identities, connection ids and RNG state; none of
//! that ever leaves through a view.

use serde::{Deserialize, Serialize};

use crate::ledger::{
    Destination, EventOutcome, Goods, InvestmentMade, InvestmentReceived, Multipliers,
    TeamLedger, VoyageSelection,
};
use crate::nation::{Abilities, NationId};
use crate::ranking::RankingEntry;
use crate::room::{Phase, RoomState};
use crate::rps::RpsRecord;

/// Who a view is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "nation", rename_all = "snake_case")]
pub enum Viewer {
    Admin,
    Team(NationId),
    Spectator,
}

impl Viewer {
    fn sees_private(&self, nation: NationId) -> bool {
        match self {
            Self::Admin => true,
            Self::Team(own) => *own == nation,
            Self::Spectator => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberView {
    pub display_name: String,
    pub connected: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamView {
    pub nation: NationId,
    pub name: String,
    pub members: Vec<MemberView>,
    pub abilities: Abilities,
    pub max_batch_count: u32,
    pub capital_per_batch: i64,
    pub clicks_per_batch: u32,
    pub total_capital: i64,
    pub goods: Goods,
    pub batch_count: u32,
    pub production_rps: Option<RpsRecord>,
    pub production_reroll_used: bool,
    pub voyage: Option<VoyageSelection>,
    pub investments_made: Vec<InvestmentMade>,
    pub investments_received: Vec<InvestmentReceived>,
    pub reroll_tokens: Option<u32>,
    pub mercantilism_tokens: u32,
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

impl TeamView {
    /// Everything the owning team may see about itself.
    pub fn full(team: &TeamLedger) -> Self {
        Self {
            nation: team.nation,
            name: team.name.clone(),
            members: team
                .members
                .iter()
                .map(|m| MemberView {
                    display_name: m.display_name.clone(),
                    connected: m.connected,
                })
                .collect(),
            abilities: team.abilities,
            max_batch_count: team.max_batch_count,
            capital_per_batch: team.capital_per_batch,
            clicks_per_batch: team.clicks_per_batch,
            total_capital: team.total_capital,
            goods: team.goods,
            batch_count: team.batch_count,
            production_rps: team.production_rps,
            production_reroll_used: team.production_reroll_used,
            voyage: team.voyage.clone(),
            investments_made: team.investments_made.clone(),
            investments_received: team.investments_received.clone(),
            reroll_tokens: Some(team.reroll_tokens),
            mercantilism_tokens: team.mercantilism_tokens,
            mercantilism_uses: team.mercantilism_uses,
            event_drawn_this_round: team.event_drawn_this_round,
            event: team.event.clone(),
            multipliers: team.multipliers,
            disaster_occurred: team.disaster_occurred,
            arrival_rps_played: team.arrival_rps_played,
            arrival_rps: team.arrival_rps,
            arrival_reroll_used: team.arrival_reroll_used,
            settlement_done_this_round: team.settlement_done_this_round,
        }
    }

    /// What other teams get to see.
    pub fn redacted(team: &TeamLedger) -> Self {
        let mut view = Self::full(team);
        view.redact();
        view
    }

    // RPS hands and the remaining reroll budget are private to the team.
    fn redact(&mut self) {
        self.production_rps = None;
        self.arrival_rps = None;
        self.reroll_tokens = None;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomView {
    pub code: String,
    pub game_started: bool,
    pub current_round: u32,
    pub current_phase: Phase,
    pub admin_connected: bool,
    pub teams: Vec<TeamView>,
    pub final_rankings: Option<Vec<RankingEntry>>,
}

impl RoomView {
    pub fn for_viewer(room: &RoomState, viewer: Viewer) -> Self {
        let teams = room
            .teams
            .values()
            .map(|team| {
                if viewer.sees_private(team.nation) {
                    TeamView::full(team)
                } else {
                    TeamView::redacted(team)
                }
            })
            .collect();
        Self {
            code: room.code.clone(),
            game_started: room.game_started,
            current_round: room.current_round,
            current_phase: room.current_phase,
            admin_connected: room.admin.connection.is_some(),
            teams,
            final_rankings: room.final_rankings.clone(),
        }
    }

    /// Narrow an already-built view to what `viewer` may see.
    pub fn restricted_to(&self, viewer: Viewer) -> Self {
        let mut view = self.clone();
        for team in view.teams.iter_mut() {
            if !viewer.sees_private(team.nation) {
                team.redact();
            }
        }
        view
    }
}

/// One committed voyage as shown on the investment board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoyageProjection {
    pub nation: NationId,
    pub name: String,
    pub destination: Destination,
    pub amount: i64,
    pub committed_by: String,
    pub investments: Vec<InvestmentReceived>,
}

/// Read-only list of every voyage that can take investment.
pub fn investment_board(room: &RoomState) -> Vec<VoyageProjection> {
    room.teams
        .values()
        .filter(|team| team.has_voyage())
        .filter_map(|team| {
            let voyage = team.voyage.as_ref()?;
            Some(VoyageProjection {
                nation: team.nation,
                name: team.name.clone(),
                destination: voyage.destination,
                amount: voyage.amount,
                committed_by: voyage.committed_by.clone(),
                investments: team.investments_received.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ConnectionId;
    use crate::rng::ScriptedRolls;
    use crate::rps::Hand;
    use crate::rules::Rules;

    fn room(rules: &Rules) -> RoomState {
        let mut room = RoomState::new("COVE", "instructor-secret", ConnectionId(1), 77);
        room.register(rules, ConnectionId(10), "alice-secret", "Alice", NationId::England)
            .unwrap();
        room.register(rules, ConnectionId(11), "bob-secret", "Bob", NationId::Spain)
            .unwrap();
        room.current_phase = Phase::Production;
        let mut rng = ScriptedRolls::new([0, 0]);
        crate::production::play_production_rps(
            &mut room,
            &rules.policy,
            &mut rng,
            NationId::England,
            Hand::Paper,
        )
        .unwrap();
        room
    }

    #[test]
    fn team_viewer_sees_only_own_private_fields() {
        let rules = Rules::embedded().unwrap();
        let room = room(&rules);

        let view = RoomView::for_viewer(&room, Viewer::Team(NationId::Spain));
        let england = view.teams.iter().find(|t| t.nation == NationId::England).unwrap();
        assert!(england.production_rps.is_none());
        assert!(england.reroll_tokens.is_none());
        let spain = view.teams.iter().find(|t| t.nation == NationId::Spain).unwrap();
        assert_eq!(spain.reroll_tokens, Some(0));

        let admin = RoomView::for_viewer(&room, Viewer::Admin);
        let england = admin.teams.iter().find(|t| t.nation == NationId::England).unwrap();
        assert!(england.production_rps.is_some());
        assert_eq!(england.reroll_tokens, Some(3));
    }

    #[test]
    fn views_never_carry_identities() {
        let rules = Rules::embedded().unwrap();
        let room = room(&rules);

        for viewer in [Viewer::Admin, Viewer::Team(NationId::England), Viewer::Spectator] {
            let json = serde_json::to_string(&RoomView::for_viewer(&room, viewer)).unwrap();
            assert!(!json.contains("secret"), "{json}");
            assert!(!json.contains("rng"), "{json}");
            assert!(!json.contains("connection"), "{json}");
        }
    }

    #[test]
    fn admin_view_can_be_narrowed() {
        let rules = Rules::embedded().unwrap();
        let room = room(&rules);

        let admin = RoomView::for_viewer(&room, Viewer::Admin);
        let narrowed = admin.restricted_to(Viewer::Team(NationId::Spain));
        assert_eq!(narrowed, RoomView::for_viewer(&room, Viewer::Team(NationId::Spain)));
    }
}
