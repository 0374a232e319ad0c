//! The phase state machine and the administrator actions that drive it.
//!
//! ```text
//! WAITING -> PRODUCTION -> TRADE -> INVESTMENT -> ARRIVAL -> TRADE ...
//!                  any phase --end_game--> ENDED
//! ```
//!
//! Leaving ARRIVAL always settles first. Settlement is never triggered anywhere else.

use tracing::info;

use crate::error::GameError;
use crate::event::RoomEvent;
use crate::ids::ConnectionId;
use crate::ledger::TeamLedger;
use crate::nation::NationId;
use crate::ranking::compute_rankings;
use crate::room::{Phase, RoomState};
use crate::rules::{Policy, Rules};
use crate::settlement::{settle_arrival, SettlementRecord};
use crate::view::{investment_board, RoomView, Viewer};

/// The only phase `start_phase` may move to from `current`.
pub fn next_phase(current: Phase) -> Option<Phase> {
    match current {
        Phase::Waiting => Some(Phase::Production),
        Phase::Production => Some(Phase::Trade),
        Phase::Trade => Some(Phase::Investment),
        Phase::Investment => Some(Phase::Arrival),
        Phase::Arrival => Some(Phase::Trade),
        Phase::Ended => None,
    }
}

/// Settle every team with an outstanding voyage, in nation order.
pub fn settle_all(room: &mut RoomState, policy: &Policy) -> Vec<SettlementRecord> {
    let nations: Vec<NationId> = room.teams.keys().copied().collect();
    nations
        .into_iter()
        .filter_map(|nation| settle_arrival(room, policy, nation))
        .collect()
}

fn settle_leaving_arrival(room: &mut RoomState, policy: &Policy, events: &mut Vec<RoomEvent>) {
    if room.current_phase != Phase::Arrival {
        return;
    }
    events.extend(
        settle_all(room, policy)
            .into_iter()
            .map(RoomEvent::VoyageSettled),
    );
}

/// Advance to `target`, which must be the next phase in the cycle.
///
/// Postconditions by target:
/// - PRODUCTION: game started, production counters cleared.
/// - TRADE: round counter advanced; coming from ARRIVAL, all voyages settled, a closing
///   snapshot emitted, then every per-round field reset.
/// - INVESTMENT: investment board emitted, no ledger change.
/// - ARRIVAL: event and arrival RPS state cleared, multipliers neutral.
pub fn start_phase(
    room: &mut RoomState,
    policy: &Policy,
    requester: ConnectionId,
    target: Phase,
) -> Result<Vec<RoomEvent>, GameError> {
    room.require_admin(requester)?;
    let from = room.current_phase;
    if from == Phase::Ended {
        return Err(GameError::GameEnded);
    }
    if next_phase(from) != Some(target) {
        return Err(GameError::IllegalTransition { from, to: target });
    }

    let mut events = Vec::new();
    settle_leaving_arrival(room, policy, &mut events);
    if from == Phase::Arrival {
        events.push(RoomEvent::RoundClosed(Box::new(RoomView::for_viewer(
            room,
            Viewer::Admin,
        ))));
    }

    match target {
        Phase::Production => {
            room.game_started = true;
            room.teams.values_mut().for_each(TeamLedger::reset_production);
        }
        Phase::Trade => {
            room.current_round += 1;
            if from == Phase::Arrival {
                room.teams.values_mut().for_each(TeamLedger::reset_round);
            }
        }
        Phase::Arrival => {
            room.teams.values_mut().for_each(TeamLedger::reset_arrival);
        }
        Phase::Investment | Phase::Waiting | Phase::Ended => {}
    }
    room.current_phase = target;

    info!(
        room = %room.code,
        from = %from,
        to = %target,
        round = room.current_round,
        "phase changed"
    );
    events.push(RoomEvent::PhaseChanged {
        phase: target,
        round: room.current_round,
    });
    if target == Phase::Investment {
        events.push(RoomEvent::InvestmentBoard(investment_board(room)));
    }
    Ok(events)
}

/// Force the game to its terminal phase and freeze the final rankings.
pub fn end_game(
    room: &mut RoomState,
    policy: &Policy,
    requester: ConnectionId,
) -> Result<Vec<RoomEvent>, GameError> {
    room.require_admin(requester)?;
    if room.current_phase == Phase::Ended {
        return Err(GameError::GameEnded);
    }

    let mut events = Vec::new();
    settle_leaving_arrival(room, policy, &mut events);

    let rankings = compute_rankings(policy, &room.teams);
    room.final_rankings = Some(rankings.clone());
    room.current_phase = Phase::Ended;

    info!(
        room = %room.code,
        round = room.current_round,
        winner = ?rankings.first().map(|r| r.nation),
        "game ended"
    );
    events.push(RoomEvent::PhaseChanged {
        phase: Phase::Ended,
        round: room.current_round,
    });
    events.push(RoomEvent::GameEnded(rankings));
    Ok(events)
}

/// Rebuild every ledger from its profile and return to WAITING. The roster is kept.
pub fn reset_game(
    room: &mut RoomState,
    rules: &Rules,
    requester: ConnectionId,
) -> Result<Vec<RoomEvent>, GameError> {
    room.require_admin(requester)?;
    if let Some(nation) = room
        .teams
        .keys()
        .copied()
        .find(|nation| rules.nations.get(*nation).is_none())
    {
        return Err(GameError::UnknownNation(nation));
    }

    for (nation, team) in room.teams.iter_mut() {
        let Some(profile) = rules.nations.get(*nation) else {
            continue;
        };
        let members = std::mem::take(&mut team.members);
        *team = TeamLedger::new(*nation, profile);
        team.members = members;
    }
    room.game_started = false;
    room.current_round = 0;
    room.current_phase = Phase::Waiting;
    room.final_rankings = None;

    info!(room = %room.code, teams = room.teams.len(), "game reset");
    Ok(vec![RoomEvent::PhaseChanged {
        phase: Phase::Waiting,
        round: 0,
    }])
}

/// Clear batch counters and production RPS state for every team.
pub fn reset_production_counts(
    room: &mut RoomState,
    requester: ConnectionId,
) -> Result<(), GameError> {
    room.require_admin(requester)?;
    if room.current_phase == Phase::Ended {
        return Err(GameError::GameEnded);
    }
    room.teams.values_mut().for_each(TeamLedger::reset_production);
    Ok(())
}
