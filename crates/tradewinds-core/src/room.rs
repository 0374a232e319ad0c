//! The room aggregate: phase, round, team ledgers and roster of one game session.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::ids::ConnectionId;
use crate::ledger::{Member, TeamLedger};
use crate::nation::NationId;
use crate::ranking::RankingEntry;
use crate::rng::{GameRng, RandomSource};
use crate::rules::Rules;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Waiting,
    Production,
    Trade,
    Investment,
    Arrival,
    Ended,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Production => "PRODUCTION",
            Self::Trade => "TRADE",
            Self::Investment => "INVESTMENT",
            Self::Arrival => "ARRIVAL",
            Self::Ended => "ENDED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index entry from a live connection to the roster member it speaks for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub external_id: String,
    pub display_name: String,
    pub nation: NationId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSeat {
    pub external_id: String,
    pub connection: Option<ConnectionId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Registration {
    /// A new roster entry was added; `created_team` is set when this created the ledger.
    Joined { nation: NationId, created_team: bool },
    /// A known identity came back on a new connection.
    Rejoined { nation: NationId },
}

impl Registration {
    pub fn nation(&self) -> NationId {
        match self {
            Self::Joined { nation, .. } | Self::Rejoined { nation } => *nation,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomState {
    pub code: String,
    pub game_started: bool,
    pub current_round: u32,
    pub current_phase: Phase,
    pub teams: BTreeMap<NationId, TeamLedger>,
    pub seats: BTreeMap<ConnectionId, Seat>,
    pub admin: AdminSeat,
    pub final_rankings: Option<Vec<RankingEntry>>,
    rng: GameRng,
}

impl RoomState {
    pub fn new(
        code: impl Into<String>,
        admin_external_id: impl Into<String>,
        admin_connection: ConnectionId,
        seed: u64,
    ) -> Self {
        Self {
            code: code.into(),
            game_started: false,
            current_round: 0,
            current_phase: Phase::Waiting,
            teams: BTreeMap::new(),
            seats: BTreeMap::new(),
            admin: AdminSeat {
                external_id: admin_external_id.into(),
                connection: Some(admin_connection),
            },
            final_rankings: None,
            rng: GameRng::seed_from_u64(seed),
        }
    }

    /// Lend the room's own generator to an engine call.
    pub fn with_rng<T>(&mut self, f: impl FnOnce(&mut Self, &mut dyn RandomSource) -> T) -> T {
        let mut rng = self.rng;
        let out = f(self, &mut rng);
        self.rng = rng;
        out
    }

    pub fn is_admin(&self, connection: ConnectionId) -> bool {
        self.admin.connection == Some(connection)
    }

    pub fn require_admin(&self, connection: ConnectionId) -> Result<(), GameError> {
        if self.is_admin(connection) {
            Ok(())
        } else {
            Err(GameError::NotAdmin)
        }
    }

    pub fn seat(&self, connection: ConnectionId) -> Result<&Seat, GameError> {
        self.seats.get(&connection).ok_or(GameError::NotMember)
    }

    pub fn is_member(&self, connection: ConnectionId) -> bool {
        self.is_admin(connection) || self.seats.contains_key(&connection)
    }

    pub fn require_phase(&self, action: &'static str, expected: Phase) -> Result<(), GameError> {
        if self.current_phase == expected {
            Ok(())
        } else {
            Err(GameError::WrongPhase {
                action,
                expected,
                actual: self.current_phase,
            })
        }
    }

    pub fn team(&self, nation: NationId) -> Result<&TeamLedger, GameError> {
        self.teams
            .get(&nation)
            .ok_or(GameError::TeamNotRegistered(nation))
    }

    pub fn team_mut(&mut self, nation: NationId) -> Result<&mut TeamLedger, GameError> {
        self.teams
            .get_mut(&nation)
            .ok_or(GameError::TeamNotRegistered(nation))
    }

    /// Seat a connection on a team, or re-associate a returning identity.
    ///
    /// A known external id always returns to its existing team, whatever nation it asks for,
    /// even after the game has ended. New members are refused once ENDED.
    pub fn register(
        &mut self,
        rules: &Rules,
        connection: ConnectionId,
        external_id: &str,
        display_name: &str,
        nation: NationId,
    ) -> Result<Registration, GameError> {
        let external_id = external_id.trim();
        let display_name = display_name.trim();
        if external_id.is_empty() {
            return Err(GameError::EmptyExternalId);
        }
        if display_name.is_empty() {
            return Err(GameError::EmptyDisplayName);
        }

        let existing = self
            .teams
            .values()
            .find(|t| t.member(external_id).is_some())
            .map(|t| t.nation);

        if let Some(home) = existing {
            self.release_connection(connection);
            self.seats.retain(|_, seat| seat.external_id != external_id);
            let team = self.team_mut(home)?;
            if let Some(member) = team.member_mut(external_id) {
                member.connection = Some(connection);
                member.connected = true;
                member.display_name = display_name.to_string();
            }
            self.seats.insert(
                connection,
                Seat {
                    external_id: external_id.to_string(),
                    display_name: display_name.to_string(),
                    nation: home,
                },
            );
            return Ok(Registration::Rejoined { nation: home });
        }
        if self.current_phase == Phase::Ended {
            return Err(GameError::GameEnded);
        }

        let profile = rules
            .nations
            .get(nation)
            .ok_or(GameError::UnknownNation(nation))?;
        self.release_connection(connection);

        let created_team = !self.teams.contains_key(&nation);
        let team = self
            .teams
            .entry(nation)
            .or_insert_with(|| TeamLedger::new(nation, profile));
        team.members.push(Member {
            external_id: external_id.to_string(),
            display_name: display_name.to_string(),
            connection: Some(connection),
            connected: true,
        });
        self.seats.insert(
            connection,
            Seat {
                external_id: external_id.to_string(),
                display_name: display_name.to_string(),
                nation,
            },
        );
        Ok(Registration::Joined {
            nation,
            created_team,
        })
    }

    /// Re-associate the administrator identity with a new connection.
    pub fn reclaim_admin(
        &mut self,
        connection: ConnectionId,
        external_id: &str,
    ) -> Result<(), GameError> {
        if self.admin.external_id != external_id.trim() {
            return Err(GameError::NotAdmin);
        }
        self.admin.connection = Some(connection);
        Ok(())
    }

    /// Mark whoever holds `connection` as disconnected. Ledgers and roster entries stay.
    ///
    /// Returns false when the connection meant nothing to this room.
    pub fn disconnect(&mut self, connection: ConnectionId) -> bool {
        let was_admin = self.is_admin(connection);
        if was_admin {
            self.admin.connection = None;
        }
        let was_seated = self.seats.contains_key(&connection);
        self.release_connection(connection);
        was_admin || was_seated
    }

    /// No connected member on any team and no administrator connection.
    pub fn is_idle(&self) -> bool {
        self.admin.connection.is_none() && self.teams.values().all(|t| t.connected_members() == 0)
    }

    fn release_connection(&mut self, connection: ConnectionId) {
        let Some(seat) = self.seats.remove(&connection) else {
            return;
        };
        if let Some(member) = self
            .teams
            .get_mut(&seat.nation)
            .and_then(|t| t.member_mut(&seat.external_id))
        {
            if member.connection == Some(connection) {
                member.connection = None;
                member.connected = false;
            }
        }
    }
}
