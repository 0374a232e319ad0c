//! TRADE and INVESTMENT phases: escrowing capital into voyages and into other teams' voyages.

use crate::error::GameError;
use crate::ledger::{Destination, InvestmentMade, InvestmentReceived, VoyageSelection};
use crate::nation::NationId;
use crate::room::{Phase, RoomState};
use crate::rules::Policy;

fn check_amount(amount: i64, minimum: i64, step: i64, available: i64) -> Result<(), GameError> {
    if amount <= 0 {
        return Err(GameError::NonPositiveAmount { amount });
    }
    if amount < minimum {
        return Err(GameError::BelowMinimum { amount, minimum });
    }
    if amount % step != 0 {
        return Err(GameError::NotMultipleOfStep { amount, step });
    }
    if amount > available {
        return Err(GameError::InsufficientCapital {
            available,
            requested: amount,
        });
    }
    Ok(())
}

/// Choose this round's voyage. Capital is debited at once and held until settlement.
pub fn commit_voyage(
    room: &mut RoomState,
    policy: &Policy,
    nation: NationId,
    committed_by: &str,
    destination: Destination,
    amount: i64,
) -> Result<VoyageSelection, GameError> {
    room.require_phase("commit voyage", Phase::Trade)?;
    let team = room.team_mut(nation)?;
    if team.voyage.is_some() {
        return Err(GameError::VoyageAlreadyCommitted);
    }

    let amount = if destination == Destination::Stay {
        0
    } else {
        check_amount(
            amount,
            policy.voyage_minimum,
            policy.voyage_step,
            team.total_capital,
        )?;
        team.adjust_capital(-amount);
        amount
    };

    let selection = VoyageSelection {
        destination,
        amount,
        committed_by: committed_by.to_string(),
    };
    team.voyage = Some(selection.clone());
    Ok(selection)
}

/// Refund the escrowed amount and clear the selection. Returns the refund, if there was a voyage.
pub fn reset_voyage(room: &mut RoomState, nation: NationId) -> Result<Option<i64>, GameError> {
    room.require_phase("reset voyage", Phase::Trade)?;
    let team = room.team_mut(nation)?;
    let Some(selection) = team.voyage.take() else {
        return Ok(None);
    };
    team.adjust_capital(selection.amount);
    Ok(Some(selection.amount))
}

pub fn make_investment(
    room: &mut RoomState,
    policy: &Policy,
    investor: NationId,
    investor_name: &str,
    target: NationId,
    amount: i64,
) -> Result<InvestmentMade, GameError> {
    room.require_phase("make investment", Phase::Investment)?;
    if investor == target {
        return Err(GameError::SelfInvestment);
    }
    if !room.team(target)?.has_voyage() {
        return Err(GameError::TargetHasNoVoyage(target));
    }

    let source = room.team_mut(investor)?;
    check_amount(
        amount,
        policy.investment_minimum,
        policy.investment_step,
        source.total_capital,
    )?;
    source.adjust_capital(-amount);
    let made = InvestmentMade { target, amount };
    source.investments_made.push(made.clone());

    room.team_mut(target)?
        .investments_received
        .push(InvestmentReceived {
            source: investor,
            amount,
            investor_name: investor_name.to_string(),
        });
    Ok(made)
}

/// Withdraw every investment this team made this round. Returns the total refunded.
///
/// Each refund removes the first entry on the target side matching (source, amount).
pub fn reset_all_investments(room: &mut RoomState, investor: NationId) -> Result<i64, GameError> {
    room.require_phase("reset investments", Phase::Investment)?;
    let made = std::mem::take(&mut room.team_mut(investor)?.investments_made);

    let mut refunded = 0;
    for entry in &made {
        if let Some(target) = room.teams.get_mut(&entry.target) {
            if let Some(pos) = target
                .investments_received
                .iter()
                .position(|r| r.source == investor && r.amount == entry.amount)
            {
                target.investments_received.remove(pos);
            }
        }
        refunded += entry.amount;
    }
    room.team_mut(investor)?.adjust_capital(refunded);
    Ok(refunded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ConnectionId;
    use crate::rules::Rules;

    fn room(rules: &Rules) -> RoomState {
        let mut room = RoomState::new("PORT", "instructor", ConnectionId(1), 9);
        room.register(rules, ConnectionId(10), "a", "Ann", NationId::Spain)
            .unwrap();
        room.register(rules, ConnectionId(11), "b", "Ben", NationId::Portugal)
            .unwrap();
        room.team_mut(NationId::Spain).unwrap().total_capital = 100;
        room.team_mut(NationId::Portugal).unwrap().total_capital = 60;
        room.current_phase = Phase::Trade;
        room
    }

    #[test]
    fn commit_escrows_capital() {
        let rules = Rules::embedded().unwrap();
        let mut room = room(&rules);

        let selection =
            commit_voyage(&mut room, &rules.policy, NationId::Spain, "Ann", Destination::India, 50)
                .unwrap();
        assert_eq!(selection.committed_by, "Ann");
        assert_eq!(room.team(NationId::Spain).unwrap().total_capital, 50);

        assert_eq!(
            commit_voyage(&mut room, &rules.policy, NationId::Spain, "Ann", Destination::India, 20),
            Err(GameError::VoyageAlreadyCommitted)
        );

        assert_eq!(reset_voyage(&mut room, NationId::Spain), Ok(Some(50)));
        assert_eq!(room.team(NationId::Spain).unwrap().total_capital, 100);
        assert_eq!(reset_voyage(&mut room, NationId::Spain), Ok(None));
    }

    #[test]
    fn commit_validates_amount() {
        let rules = Rules::embedded().unwrap();
        let mut room = room(&rules);
        let policy = &rules.policy;
        let spain = NationId::Spain;

        assert_eq!(
            commit_voyage(&mut room, policy, spain, "Ann", Destination::India, 0),
            Err(GameError::NonPositiveAmount { amount: 0 })
        );
        assert_eq!(
            commit_voyage(&mut room, policy, spain, "Ann", Destination::India, 10),
            Err(GameError::BelowMinimum { amount: 10, minimum: 20 })
        );
        assert_eq!(
            commit_voyage(&mut room, policy, spain, "Ann", Destination::India, 25),
            Err(GameError::NotMultipleOfStep { amount: 25, step: 10 })
        );
        assert_eq!(
            commit_voyage(&mut room, policy, spain, "Ann", Destination::Americas, 110),
            Err(GameError::InsufficientCapital { available: 100, requested: 110 })
        );
        assert!(room.team(spain).unwrap().voyage.is_none());
    }

    #[test]
    fn staying_in_port_records_zero() {
        let rules = Rules::embedded().unwrap();
        let mut room = room(&rules);

        let selection =
            commit_voyage(&mut room, &rules.policy, NationId::Spain, "Ann", Destination::Stay, 70)
                .unwrap();
        assert_eq!(selection.amount, 0);
        let team = room.team(NationId::Spain).unwrap();
        assert_eq!(team.total_capital, 100);
        assert!(!team.has_voyage());
    }

    #[test]
    fn investments_move_capital_both_ways() {
        let rules = Rules::embedded().unwrap();
        let mut room = room(&rules);
        commit_voyage(&mut room, &rules.policy, NationId::Spain, "Ann", Destination::India, 40)
            .unwrap();
        room.current_phase = Phase::Investment;

        make_investment(&mut room, &rules.policy, NationId::Portugal, "Ben", NationId::Spain, 20)
            .unwrap();
        make_investment(&mut room, &rules.policy, NationId::Portugal, "Ben", NationId::Spain, 20)
            .unwrap();
        assert_eq!(room.team(NationId::Portugal).unwrap().total_capital, 20);
        assert_eq!(
            room.team(NationId::Spain).unwrap().investments_received.len(),
            2
        );

        assert_eq!(reset_all_investments(&mut room, NationId::Portugal), Ok(40));
        let portugal = room.team(NationId::Portugal).unwrap();
        assert_eq!(portugal.total_capital, 60);
        assert!(portugal.investments_made.is_empty());
        assert!(room
            .team(NationId::Spain)
            .unwrap()
            .investments_received
            .is_empty());
    }

    #[test]
    fn resets_outside_their_phase_are_rejected() {
        let rules = Rules::embedded().unwrap();
        let mut room = room(&rules);
        commit_voyage(&mut room, &rules.policy, NationId::Spain, "Ann", Destination::India, 40)
            .unwrap();
        room.current_phase = Phase::Investment;
        make_investment(&mut room, &rules.policy, NationId::Portugal, "Ben", NationId::Spain, 20)
            .unwrap();

        let before = room.clone();
        assert_eq!(
            reset_voyage(&mut room, NationId::Spain),
            Err(GameError::WrongPhase {
                action: "reset voyage",
                expected: Phase::Trade,
                actual: Phase::Investment,
            })
        );
        assert_eq!(room, before);

        room.current_phase = Phase::Arrival;
        let before = room.clone();
        assert_eq!(
            reset_all_investments(&mut room, NationId::Portugal),
            Err(GameError::WrongPhase {
                action: "reset investments",
                expected: Phase::Investment,
                actual: Phase::Arrival,
            })
        );
        assert_eq!(room, before);
    }

    #[test]
    fn investment_reset_matches_source_and_target() {
        let rules = Rules::embedded().unwrap();
        let mut room = room(&rules);
        room.register(&rules, ConnectionId(12), "c", "Cleo", NationId::France)
            .unwrap();
        room.team_mut(NationId::France).unwrap().total_capital = 60;
        commit_voyage(&mut room, &rules.policy, NationId::Spain, "Ann", Destination::India, 40)
            .unwrap();
        commit_voyage(&mut room, &rules.policy, NationId::France, "Cleo", Destination::Americas, 20)
            .unwrap();
        room.current_phase = Phase::Investment;

        // same amount into two targets, plus another source matching on amount
        make_investment(&mut room, &rules.policy, NationId::Portugal, "Ben", NationId::Spain, 20)
            .unwrap();
        make_investment(&mut room, &rules.policy, NationId::Portugal, "Ben", NationId::France, 20)
            .unwrap();
        make_investment(&mut room, &rules.policy, NationId::France, "Cleo", NationId::Spain, 20)
            .unwrap();

        assert_eq!(reset_all_investments(&mut room, NationId::Portugal), Ok(40));
        assert_eq!(room.team(NationId::Portugal).unwrap().total_capital, 60);
        assert!(room.team(NationId::France).unwrap().investments_received.is_empty());
        let spain = room.team(NationId::Spain).unwrap();
        assert_eq!(spain.investments_received.len(), 1);
        assert_eq!(spain.investments_received[0].source, NationId::France);
        assert_eq!(spain.investments_received[0].investor_name, "Cleo");
    }

    #[test]
    fn investment_targets_must_be_voyaging_strangers() {
        let rules = Rules::embedded().unwrap();
        let mut room = room(&rules);
        commit_voyage(&mut room, &rules.policy, NationId::Spain, "Ann", Destination::Stay, 0)
            .unwrap();
        room.current_phase = Phase::Investment;

        assert_eq!(
            make_investment(&mut room, &rules.policy, NationId::Spain, "Ann", NationId::Spain, 10),
            Err(GameError::SelfInvestment)
        );
        assert_eq!(
            make_investment(&mut room, &rules.policy, NationId::Portugal, "Ben", NationId::Spain, 10),
            Err(GameError::TargetHasNoVoyage(NationId::Spain))
        );
        assert_eq!(
            make_investment(&mut room, &rules.policy, NationId::Portugal, "Ben", NationId::France, 10),
            Err(GameError::TeamNotRegistered(NationId::France))
        );
    }
}
