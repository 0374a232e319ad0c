use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::nation::NationId;
use crate::room::Phase;

/// How a rejected request should be reported to its sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    Infrastructure,
}

/// Rejections from the engine. A rejected operation never mutates the room.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("room `{0}` not found")]
    RoomNotFound(String),

    #[error("only the room administrator may do this")]
    NotAdmin,
    #[error("requester is not a member of this room")]
    NotMember,

    #[error("{action} is only allowed during {expected}, current phase is {actual}")]
    WrongPhase {
        action: &'static str,
        expected: Phase,
        actual: Phase,
    },
    #[error("cannot move from {from} to {to}")]
    IllegalTransition { from: Phase, to: Phase },
    #[error("the game has ended")]
    GameEnded,
    #[error("no profile for nation {0}")]
    UnknownNation(NationId),
    #[error("nation {0} has no registered team")]
    TeamNotRegistered(NationId),
    #[error("display name must not be empty")]
    EmptyDisplayName,
    #[error("external id must not be empty")]
    EmptyExternalId,

    #[error("amount must be positive, got {amount}")]
    NonPositiveAmount { amount: i64 },
    #[error("amount {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: i64, minimum: i64 },
    #[error("amount {amount} is not a multiple of {step}")]
    NotMultipleOfStep { amount: i64, step: i64 },
    #[error("insufficient capital: have {available}, need {requested}")]
    InsufficientCapital { available: i64, requested: i64 },

    #[error("a voyage has already been chosen this round")]
    VoyageAlreadyCommitted,
    #[error("no voyage has been committed")]
    NoVoyage,
    #[error("a team cannot invest in its own voyage")]
    SelfInvestment,
    #[error("{0} has no voyage to invest in")]
    TargetHasNoVoyage(NationId),

    #[error("rock-paper-scissors already played")]
    RpsAlreadyPlayed,
    #[error("rock-paper-scissors has not been played")]
    RpsNotPlayed,
    #[error("this nation has no reroll ability")]
    NoRerollAbility,
    #[error("reroll already used this phase")]
    RerollAlreadyUsed,
    #[error("no reroll tokens left")]
    NoRerollTokens,

    #[error("the voyage event has not been drawn")]
    EventNotDrawn,
    #[error("a disaster struck this voyage")]
    DisasterOccurred,
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RoomNotFound(_) => ErrorKind::NotFound,
            Self::NotAdmin | Self::NotMember => ErrorKind::Authorization,
            _ => ErrorKind::Validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(GameError::RoomNotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(GameError::NotAdmin.kind(), ErrorKind::Authorization);
        assert_eq!(GameError::NotMember.kind(), ErrorKind::Authorization);
        assert_eq!(GameError::NoVoyage.kind(), ErrorKind::Validation);
    }

    #[test]
    fn phase_message_is_readable() {
        let err = GameError::WrongPhase {
            action: "commit voyage",
            expected: Phase::Trade,
            actual: Phase::Production,
        };
        assert_eq!(
            err.to_string(),
            "commit voyage is only allowed during TRADE, current phase is PRODUCTION"
        );
    }
}
