//! ARRIVAL phase: the voyage event, the arrival RPS round, and the once-per-round payout.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GameError;
use crate::ledger::{Destination, EventOutcome, Multipliers, TeamLedger};
use crate::nation::NationId;
use crate::production::RerollOutcome;
use crate::rng::RandomSource;
use crate::room::{Phase, RoomState};
use crate::rps::{self, Hand, RpsRecord};
use crate::rules::{Policy, EVENT_ROLL_MAX};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventDraw {
    Drawn(EventOutcome),
    AlreadyDrawn,
    /// Nothing at sea, nothing to draw for.
    NoVoyage,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestorPayout {
    pub nation: NationId,
    pub investor_name: String,
    pub principal: i64,
    pub goods: i64,
    pub mercantilism_bonus: i64,
}

/// Summary of one voyage's payout, pushed to the room after settlement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub nation: NationId,
    pub round: u32,
    pub destination: Destination,
    pub amount: i64,
    pub event: Option<String>,
    pub disaster: bool,
    pub multipliers: Multipliers,
    pub rps_delta: i64,
    pub goods: i64,
    pub capital: i64,
    pub mercantilism_bonus: i64,
    pub investors: Vec<InvestorPayout>,
}

pub fn draw_event(
    room: &mut RoomState,
    policy: &Policy,
    rng: &mut dyn RandomSource,
    nation: NationId,
) -> Result<EventDraw, GameError> {
    room.require_phase("draw event", Phase::Arrival)?;
    let team = room.team_mut(nation)?;
    if team.event_drawn_this_round {
        return Ok(EventDraw::AlreadyDrawn);
    }
    if !team.has_voyage() {
        return Ok(EventDraw::NoVoyage);
    }

    let roll = rng.roll(1, EVENT_ROLL_MAX);
    let outcome = match policy.band_for(roll) {
        Some(band) => EventOutcome {
            name: band.name.clone(),
            roll,
            multipliers: Multipliers {
                capital: band.capital_multiplier,
                goods: band.goods_multiplier,
            },
            disaster: band.disaster,
        },
        None => EventOutcome {
            name: "calm_seas".to_string(),
            roll,
            multipliers: Multipliers::NEUTRAL,
            disaster: false,
        },
    };

    team.event_drawn_this_round = true;
    team.multipliers = outcome.multipliers;
    team.event = Some(outcome.clone());
    if outcome.disaster {
        team.disaster_occurred = true;
        team.arrival_rps_played = true;
    }
    Ok(EventDraw::Drawn(outcome))
}

/// The arrival round scores goods, not capital. The delta waits for settlement.
pub fn play_arrival_rps(
    room: &mut RoomState,
    policy: &Policy,
    rng: &mut dyn RandomSource,
    nation: NationId,
    hand: Hand,
) -> Result<RpsRecord, GameError> {
    room.require_phase("arrival rock-paper-scissors", Phase::Arrival)?;
    let team = room.team_mut(nation)?;
    if !team.has_voyage() {
        return Err(GameError::NoVoyage);
    }
    if !team.event_drawn_this_round {
        return Err(GameError::EventNotDrawn);
    }
    if team.disaster_occurred {
        return Err(GameError::DisasterOccurred);
    }
    if team.arrival_rps_played {
        return Err(GameError::RpsAlreadyPlayed);
    }

    let record = rps::play(rng, hand, team.abilities, policy.arrival_rps);
    team.arrival_rps = Some(record);
    team.arrival_rps_played = true;
    Ok(record)
}

pub fn reroll_arrival(room: &mut RoomState, nation: NationId) -> Result<RerollOutcome, GameError> {
    room.require_phase("arrival reroll", Phase::Arrival)?;
    let team = room.team_mut(nation)?;
    if !team.abilities.reroll {
        return Err(GameError::NoRerollAbility);
    }
    if team.arrival_reroll_used {
        return Err(GameError::RerollAlreadyUsed);
    }
    if team.reroll_tokens == 0 {
        return Err(GameError::NoRerollTokens);
    }
    let record = team.arrival_rps.ok_or(GameError::RpsNotPlayed)?;

    team.arrival_rps = None;
    team.arrival_rps_played = false;
    team.reroll_tokens -= 1;
    team.arrival_reroll_used = true;
    Ok(RerollOutcome {
        reversed: record.delta,
        tokens_left: team.reroll_tokens,
    })
}

fn goods_for(policy: &Policy, amount: i64, goods_multiplier: f64, rps_delta: i64) -> i64 {
    let base = (amount as f64 / policy.goods_divisor as f64 * goods_multiplier).floor() as i64;
    (base + rps_delta).max(0)
}

fn mercantilism(team: &mut TeamLedger, policy: &Policy) -> i64 {
    if !team.abilities.mercantilism
        || team.mercantilism_tokens == 0
        || team.mercantilism_uses >= policy.mercantilism_lifetime_cap
    {
        return 0;
    }
    team.mercantilism_uses += 1;
    team.mercantilism_tokens -= 1;
    team.adjust_capital(policy.mercantilism_bonus)
}

/// Pay out one team's voyage and everyone who invested in it.
///
/// Returns `None` without touching anything unless the team has a voyage, has drawn its
/// event and has not settled yet this round. Otherwise the settled flag is set last.
pub fn settle_arrival(
    room: &mut RoomState,
    policy: &Policy,
    nation: NationId,
) -> Option<SettlementRecord> {
    let round = room.current_round;
    let team = room.teams.get(&nation)?;
    if !team.has_voyage() || !team.event_drawn_this_round || team.settlement_done_this_round {
        return None;
    }
    let voyage = team.voyage.clone()?;
    let good = voyage.destination.good()?;
    let multipliers = team.multipliers;
    let disaster = team.disaster_occurred;
    let rps_delta = if disaster {
        0
    } else {
        team.arrival_rps.map_or(0, |r| r.delta)
    };
    let event = team.event.as_ref().map(|e| e.name.clone());
    let received = team.investments_received.clone();

    let mut record = SettlementRecord {
        nation,
        round,
        destination: voyage.destination,
        amount: voyage.amount,
        event,
        disaster,
        multipliers,
        rps_delta,
        goods: 0,
        capital: 0,
        mercantilism_bonus: 0,
        investors: Vec::with_capacity(received.len()),
    };

    for inv in &received {
        let Some(investor) = room.teams.get_mut(&inv.source) else {
            continue;
        };
        let principal = investor.adjust_capital(inv.amount);
        let mut payout = InvestorPayout {
            nation: inv.source,
            investor_name: inv.investor_name.clone(),
            principal,
            goods: 0,
            mercantilism_bonus: 0,
        };
        if !disaster {
            payout.goods = goods_for(policy, inv.amount, multipliers.goods, rps_delta);
            investor.goods.credit(good, payout.goods);
            if multipliers.goods > 0.0 {
                payout.mercantilism_bonus = mercantilism(investor, policy);
            }
        }
        record.investors.push(payout);
    }

    let voyager = room.teams.get_mut(&nation)?;
    if disaster {
        record.capital = voyager.adjust_capital(voyage.amount);
    } else {
        record.goods = goods_for(policy, voyage.amount, multipliers.goods, rps_delta);
        voyager.goods.credit(good, record.goods);
        let gain = (voyage.amount as f64 * multipliers.capital).floor() as i64;
        record.capital = voyager.adjust_capital(gain);
        if multipliers.goods > 0.0 {
            record.mercantilism_bonus = mercantilism(voyager, policy);
        }
    }
    voyager.settlement_done_this_round = true;

    debug!(
        room = %room.code,
        nation = %nation,
        round,
        disaster,
        goods = record.goods,
        capital = record.capital,
        investors = record.investors.len(),
        "voyage settled"
    );
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ConnectionId;
    use crate::rng::ScriptedRolls;
    use crate::rps::RpsResult;
    use crate::rules::Rules;
    use crate::voyage::{commit_voyage, make_investment};

    /// Spain sails 100 to India, Portugal invests 30.
    fn voyage_room(rules: &Rules) -> RoomState {
        let mut room = RoomState::new("BAY", "instructor", ConnectionId(1), 5);
        room.register(rules, ConnectionId(10), "a", "Ann", NationId::Spain)
            .unwrap();
        room.register(rules, ConnectionId(11), "b", "Ben", NationId::Portugal)
            .unwrap();
        room.team_mut(NationId::Spain).unwrap().total_capital = 150;
        room.team_mut(NationId::Portugal).unwrap().total_capital = 80;

        room.current_phase = Phase::Trade;
        commit_voyage(&mut room, &rules.policy, NationId::Spain, "Ann", Destination::India, 100)
            .unwrap();
        room.current_phase = Phase::Investment;
        make_investment(&mut room, &rules.policy, NationId::Portugal, "Ben", NationId::Spain, 30)
            .unwrap();
        room.current_phase = Phase::Arrival;
        room
    }

    #[test]
    fn normal_settlement_pays_once() {
        let rules = Rules::embedded().unwrap();
        let mut room = voyage_room(&rules);

        // 60 -> calm seas
        let mut rng = ScriptedRolls::new([60]);
        let draw = draw_event(&mut room, &rules.policy, &mut rng, NationId::Spain).unwrap();
        assert!(matches!(draw, EventDraw::Drawn(ref e) if e.name == "calm_seas"));

        let record = settle_arrival(&mut room, &rules.policy, NationId::Spain).unwrap();
        assert_eq!(record.goods, 10);
        assert_eq!(record.capital, 100);
        assert_eq!(record.investors[0].principal, 30);
        assert_eq!(record.investors[0].goods, 3);

        let after_first = room.clone();
        assert!(settle_arrival(&mut room, &rules.policy, NationId::Spain).is_none());
        assert_eq!(room, after_first);

        let spain = room.team(NationId::Spain).unwrap();
        assert_eq!(spain.total_capital, 150);
        assert_eq!(spain.goods.spice, 10);
        let portugal = room.team(NationId::Portugal).unwrap();
        assert_eq!(portugal.total_capital, 80);
        assert_eq!(portugal.goods.spice, 3);
    }

    #[test]
    fn favorable_wind_doubles_goods() {
        let rules = Rules::embedded().unwrap();
        let mut room = voyage_room(&rules);
        let mut rng = ScriptedRolls::new([10]);
        draw_event(&mut room, &rules.policy, &mut rng, NationId::Spain).unwrap();

        let record = settle_arrival(&mut room, &rules.policy, NationId::Spain).unwrap();
        assert_eq!(record.multipliers.goods, 2.0);
        assert_eq!(record.goods, 20);
        assert_eq!(record.capital, 100);
        assert_eq!(record.investors[0].goods, 6);
    }

    #[test]
    fn disaster_refunds_principal_only() {
        let rules = Rules::embedded().unwrap();
        let mut room = voyage_room(&rules);
        let mut rng = ScriptedRolls::new([20]);
        let draw = draw_event(&mut room, &rules.policy, &mut rng, NationId::Spain).unwrap();
        assert!(matches!(draw, EventDraw::Drawn(ref e) if e.disaster));

        let spain = room.team(NationId::Spain).unwrap();
        assert!(spain.disaster_occurred);
        assert!(spain.arrival_rps_played);
        assert_eq!(
            play_arrival_rps(&mut room, &rules.policy, &mut rng, NationId::Spain, Hand::Rock),
            Err(GameError::DisasterOccurred)
        );

        let record = settle_arrival(&mut room, &rules.policy, NationId::Spain).unwrap();
        assert!(record.disaster);
        assert_eq!(record.capital, 100);
        assert_eq!(record.goods, 0);

        let spain = room.team(NationId::Spain).unwrap();
        assert_eq!(spain.total_capital, 150);
        assert_eq!(spain.goods.spice, 0);
        let portugal = room.team(NationId::Portugal).unwrap();
        assert_eq!(portugal.total_capital, 80);
        assert_eq!(portugal.goods.spice, 0);
    }

    #[test]
    fn arrival_rps_adjusts_voyager_and_investor_goods() {
        let rules = Rules::embedded().unwrap();
        let mut room = voyage_room(&rules);
        // calm seas, then scissors so rock wins
        let mut rng = ScriptedRolls::new([50, 2]);
        draw_event(&mut room, &rules.policy, &mut rng, NationId::Spain).unwrap();
        let rps = play_arrival_rps(&mut room, &rules.policy, &mut rng, NationId::Spain, Hand::Rock)
            .unwrap();
        assert_eq!(rps.result, RpsResult::Win);
        // goods are untouched until settlement
        assert_eq!(room.team(NationId::Spain).unwrap().goods.spice, 0);

        let record = settle_arrival(&mut room, &rules.policy, NationId::Spain).unwrap();
        assert_eq!(record.goods, 11);
        assert_eq!(record.investors[0].goods, 4);
    }

    #[test]
    fn undrawn_or_missing_voyage_does_not_settle() {
        let rules = Rules::embedded().unwrap();
        let mut room = voyage_room(&rules);
        assert!(settle_arrival(&mut room, &rules.policy, NationId::Spain).is_none());
        assert!(settle_arrival(&mut room, &rules.policy, NationId::Portugal).is_none());
        assert!(!room.team(NationId::Spain).unwrap().settlement_done_this_round);

        let mut rng = ScriptedRolls::new([50]);
        assert_eq!(
            draw_event(&mut room, &rules.policy, &mut rng, NationId::Portugal),
            Ok(EventDraw::NoVoyage)
        );
        draw_event(&mut room, &rules.policy, &mut rng, NationId::Spain).unwrap();
        assert_eq!(
            draw_event(&mut room, &rules.policy, &mut rng, NationId::Spain),
            Ok(EventDraw::AlreadyDrawn)
        );
    }

    #[test]
    fn arrival_rps_requires_drawn_event() {
        let rules = Rules::embedded().unwrap();
        let mut room = voyage_room(&rules);
        let mut rng = ScriptedRolls::default();
        assert_eq!(
            play_arrival_rps(&mut room, &rules.policy, &mut rng, NationId::Spain, Hand::Rock),
            Err(GameError::EventNotDrawn)
        );
        assert_eq!(
            play_arrival_rps(&mut room, &rules.policy, &mut rng, NationId::Portugal, Hand::Rock),
            Err(GameError::NoVoyage)
        );
    }

    #[test]
    fn mercantilism_pays_bonus_up_to_cap() {
        let rules = Rules::embedded().unwrap();
        let mut room = RoomState::new("BAY", "instructor", ConnectionId(1), 5);
        room.register(&rules, ConnectionId(10), "n", "Nel", NationId::Netherlands)
            .unwrap();
        let dutch = room.team_mut(NationId::Netherlands).unwrap();
        dutch.total_capital = 40;
        dutch.mercantilism_uses = rules.policy.mercantilism_lifetime_cap - 1;

        room.current_phase = Phase::Trade;
        commit_voyage(&mut room, &rules.policy, NationId::Netherlands, "Nel", Destination::Americas, 20)
            .unwrap();
        room.current_phase = Phase::Arrival;
        let mut rng = ScriptedRolls::new([90]);
        draw_event(&mut room, &rules.policy, &mut rng, NationId::Netherlands).unwrap();

        let record = settle_arrival(&mut room, &rules.policy, NationId::Netherlands).unwrap();
        assert_eq!(record.mercantilism_bonus, 3);
        let dutch = room.team(NationId::Netherlands).unwrap();
        assert_eq!(dutch.total_capital, 43);
        assert_eq!(dutch.goods.sugar, 2);
        assert_eq!(dutch.mercantilism_uses, rules.policy.mercantilism_lifetime_cap);

        let mut dutch = dutch.clone();
        assert_eq!(mercantilism(&mut dutch, &rules.policy), 0);
    }

    /// `voyage_room` plus the Netherlands investing 20 in Spain.
    fn dutch_investor_room(rules: &Rules) -> RoomState {
        let mut room = voyage_room(rules);
        room.register(rules, ConnectionId(12), "n", "Nel", NationId::Netherlands)
            .unwrap();
        room.team_mut(NationId::Netherlands).unwrap().total_capital = 50;
        room.current_phase = Phase::Investment;
        make_investment(&mut room, &rules.policy, NationId::Netherlands, "Nel", NationId::Spain, 20)
            .unwrap();
        room.current_phase = Phase::Arrival;
        room
    }

    #[test]
    fn mercantilism_pays_investors_too() {
        let rules = Rules::embedded().unwrap();
        let mut room = dutch_investor_room(&rules);
        let mut rng = ScriptedRolls::new([60]);
        draw_event(&mut room, &rules.policy, &mut rng, NationId::Spain).unwrap();

        let record = settle_arrival(&mut room, &rules.policy, NationId::Spain).unwrap();
        let payout = |nation| {
            record
                .investors
                .iter()
                .find(|p| p.nation == nation)
                .unwrap()
                .clone()
        };
        assert_eq!(payout(NationId::Netherlands).mercantilism_bonus, 3);
        assert_eq!(payout(NationId::Netherlands).goods, 2);
        assert_eq!(payout(NationId::Portugal).mercantilism_bonus, 0);
        assert_eq!(record.mercantilism_bonus, 0);

        let dutch = room.team(NationId::Netherlands).unwrap();
        assert_eq!(dutch.total_capital, 53);
        assert_eq!(dutch.goods.spice, 2);
        assert_eq!(dutch.mercantilism_uses, 1);
    }

    #[test]
    fn disaster_pays_investors_no_mercantilism() {
        let rules = Rules::embedded().unwrap();
        let mut room = dutch_investor_room(&rules);
        let mut rng = ScriptedRolls::new([20]);
        draw_event(&mut room, &rules.policy, &mut rng, NationId::Spain).unwrap();

        let record = settle_arrival(&mut room, &rules.policy, NationId::Spain).unwrap();
        assert!(record.disaster);
        assert!(record.investors.iter().all(|p| p.mercantilism_bonus == 0));

        let dutch = room.team(NationId::Netherlands).unwrap();
        assert_eq!(dutch.total_capital, 50);
        assert_eq!(dutch.goods.spice, 0);
        assert_eq!(dutch.mercantilism_uses, 0);
    }

    #[test]
    fn arrival_reroll_shares_token_pool() {
        let rules = Rules::embedded().unwrap();
        let mut room = RoomState::new("BAY", "instructor", ConnectionId(1), 5);
        room.register(&rules, ConnectionId(10), "e", "Eve", NationId::England)
            .unwrap();
        room.team_mut(NationId::England).unwrap().total_capital = 40;
        room.current_phase = Phase::Trade;
        commit_voyage(&mut room, &rules.policy, NationId::England, "Eve", Destination::India, 40)
            .unwrap();
        room.current_phase = Phase::Arrival;

        // calm seas, paper beats rock, then scissors loses to rock
        let mut rng = ScriptedRolls::new([50, 1, 2]);
        draw_event(&mut room, &rules.policy, &mut rng, NationId::England).unwrap();
        play_arrival_rps(&mut room, &rules.policy, &mut rng, NationId::England, Hand::Rock).unwrap();

        let outcome = reroll_arrival(&mut room, NationId::England).unwrap();
        assert_eq!(outcome, RerollOutcome { reversed: -1, tokens_left: 2 });

        let again =
            play_arrival_rps(&mut room, &rules.policy, &mut rng, NationId::England, Hand::Rock)
                .unwrap();
        assert_eq!(again.result, RpsResult::Win);
        assert_eq!(
            reroll_arrival(&mut room, NationId::England),
            Err(GameError::RerollAlreadyUsed)
        );

        let record = settle_arrival(&mut room, &rules.policy, NationId::England).unwrap();
        assert_eq!(record.goods, 5);
    }
}
