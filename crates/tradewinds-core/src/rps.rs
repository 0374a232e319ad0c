//! Rock-paper-scissors mini-game shared by production and arrival.

use serde::{Deserialize, Serialize};

use crate::nation::Abilities;
use crate::rng::RandomSource;
use crate::rules::RpsDeltas;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Rock,
    Paper,
    Scissors,
}

impl Hand {
    pub const ALL: [Hand; 3] = [Hand::Rock, Hand::Paper, Hand::Scissors];

    /// Scissors cut paper, paper wraps rock, rock breaks scissors.
    pub fn beats(self, other: Hand) -> bool {
        matches!(
            (self, other),
            (Hand::Scissors, Hand::Paper) | (Hand::Paper, Hand::Rock) | (Hand::Rock, Hand::Scissors)
        )
    }

    pub fn random(rng: &mut dyn RandomSource) -> Hand {
        Hand::ALL[rng.roll(0, 2) as usize]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpsResult {
    Win,
    Lose,
    Draw,
}

pub fn resolve(player: Hand, opponent: Hand) -> RpsResult {
    if player == opponent {
        RpsResult::Draw
    } else if player.beats(opponent) {
        RpsResult::Win
    } else {
        RpsResult::Lose
    }
}

/// A played round, including the delta that was actually applied.
///
/// `delta` is what a reroll reverses, so it records the post-clamp change rather than the
/// nominal one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpsRecord {
    pub player: Hand,
    pub opponent: Hand,
    pub result: RpsResult,
    pub delta: i64,
}

/// Draw an opponent and score the round. The returned delta is nominal.
pub fn play(
    rng: &mut dyn RandomSource,
    player: Hand,
    abilities: Abilities,
    deltas: RpsDeltas,
) -> RpsRecord {
    let opponent = Hand::random(rng);
    let mut result = resolve(player, opponent);
    if abilities.absolute_monarchy && result == RpsResult::Lose {
        result = RpsResult::Draw;
    }
    let delta = match result {
        RpsResult::Win => deltas.win,
        RpsResult::Lose => deltas.lose,
        RpsResult::Draw => 0,
    };
    RpsRecord {
        player,
        opponent,
        result,
        delta,
    }
}
