//! The room hub.
//!
//! Every mutating request runs as one read-modify-write cycle under the room's own lock:
//! load the snapshot, apply exactly one engine operation, write the whole snapshot back.
//! Different rooms never share a lock. Results and notifications go out through an
//! unbounded channel of [`Outbound`] messages addressed to connections.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};

use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use tradewinds_core::{
    commit_voyage, draw_event, end_game, make_investment, play_arrival_rps, play_production_rps,
    record_production_batch, reroll_arrival, reroll_production, reset_all_investments,
    reset_game, reset_production_counts, reset_voyage, start_phase, ConnectionId, ErrorKind,
    GameError, RoomEvent, RoomState, RoomView, Rules, Seat, TeamView, Viewer,
};

use crate::config::ServerConfig;
use crate::countdown::Countdowns;
use crate::protocol::{ActionOutcome, ClientMessage, ServerMessage};
use crate::stats::{record_game, StatsStore};
use crate::store::{decode_room, encode_room, RoomStore, StoreError};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;
const CODE_ATTEMPTS: usize = 32;

#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Game(#[from] GameError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("room `{0}` already exists")]
    RoomExists(String),
    #[error("room codes are 3 to 12 letters or digits")]
    InvalidRoomCode,
}

impl HubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Game(err) => err.kind(),
            Self::Store(_) => ErrorKind::Infrastructure,
            Self::RoomExists(_) | Self::InvalidRoomCode => ErrorKind::Validation,
        }
    }
}

/// A message addressed to one connection.
#[derive(Clone, Debug, PartialEq)]
pub struct Outbound {
    pub to: ConnectionId,
    pub message: ServerMessage,
}

#[derive(Clone)]
pub struct RoomHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    rules: Arc<Rules>,
    config: ServerConfig,
    store: Arc<dyn RoomStore>,
    stats: Arc<dyn StatsStore>,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    /// Rooms each connection has joined, used to route disconnects.
    joined: RwLock<HashMap<ConnectionId, BTreeSet<String>>>,
    countdowns: Countdowns,
    outbound: mpsc::UnboundedSender<Outbound>,
}

/// Lookup form of a client-supplied room code.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Who should hear about a room, and with which view.
fn audience(room: &RoomState) -> Vec<(ConnectionId, Viewer)> {
    let mut out = Vec::with_capacity(room.seats.len() + 1);
    if let Some(admin) = room.admin.connection {
        out.push((admin, Viewer::Admin));
    }
    for (conn, seat) in &room.seats {
        if room.admin.connection != Some(*conn) {
            out.push((*conn, Viewer::Team(seat.nation)));
        }
    }
    out
}

fn viewer_of(room: &RoomState, conn: ConnectionId) -> Viewer {
    if room.is_admin(conn) {
        Viewer::Admin
    } else if let Some(seat) = room.seats.get(&conn) {
        Viewer::Team(seat.nation)
    } else {
        Viewer::Spectator
    }
}

impl RoomHub {
    pub fn new(
        rules: Arc<Rules>,
        config: ServerConfig,
        store: Arc<dyn RoomStore>,
        stats: Arc<dyn StatsStore>,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            inner: Arc::new(HubInner {
                rules,
                config,
                store,
                stats,
                locks: RwLock::new(HashMap::new()),
                joined: RwLock::new(HashMap::new()),
                countdowns: Countdowns::new(),
                outbound: tx,
            }),
        };
        (hub, rx)
    }

    fn from_weak(weak: &Weak<HubInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Process one client message. Failures are reported back to the sender, never raised.
    pub async fn handle(&self, from: ConnectionId, msg: ClientMessage) {
        let action = msg.action();
        if let Err(err) = self.dispatch(from, msg).await {
            self.report(from, action, err);
        }
    }

    fn report(&self, to: ConnectionId, action: &str, err: HubError) {
        let message = match &err {
            HubError::Game(GameError::RoomNotFound(room)) => {
                ServerMessage::RoomNotFound { room: room.clone() }
            }
            _ => ServerMessage::Error {
                kind: err.kind(),
                action: action.to_string(),
                message: err.to_string(),
            },
        };
        match err.kind() {
            ErrorKind::Infrastructure => warn!(conn = %to, action, error = %err, "request failed"),
            _ => debug!(conn = %to, action, error = %err, "request rejected"),
        }
        self.send(to, message);
    }

    fn send(&self, to: ConnectionId, message: ServerMessage) {
        // a closed channel means the transport is shutting down
        let _ = self.inner.outbound.send(Outbound { to, message });
    }

    async fn dispatch(&self, from: ConnectionId, msg: ClientMessage) -> Result<(), HubError> {
        let rules = self.inner.rules.clone();
        let policy = &rules.policy;
        match msg {
            ClientMessage::CreateRoom { admin_id, room } => {
                self.create_room(from, &admin_id, room.as_deref()).await?;
            }
            ClientMessage::ReclaimAdmin { room, admin_id } => {
                let code = normalize_code(&room);
                let (state, ()) = self
                    .mutate(&code, |r| r.reclaim_admin(from, &admin_id))
                    .await?;
                self.track(from, &code).await;
                self.send(from, ServerMessage::AdminReclaimed { room: code });
                self.publish(&state);
            }
            ClientMessage::Register {
                room,
                external_id,
                display_name,
                nation,
            } => {
                let code = normalize_code(&room);
                let (state, registration) = self
                    .mutate(&code, |r| {
                        r.register(&rules, from, &external_id, &display_name, nation)
                    })
                    .await?;
                self.track(from, &code).await;
                info!(
                    room = %code,
                    conn = %from,
                    nation = %registration.nation(),
                    ?registration,
                    "player registered"
                );
                self.send(
                    from,
                    ServerMessage::Registered {
                        room: code,
                        registration,
                    },
                );
                self.publish(&state);
            }
            ClientMessage::RequestState { room } => {
                let state = self.load(&normalize_code(&room)).await?;
                if !state.is_member(from) {
                    return Err(GameError::NotMember.into());
                }
                self.publish_to(&state, from, viewer_of(&state, from));
            }

            ClientMessage::StartPhase { room, phase } => {
                let code = normalize_code(&room);
                let (state, events) = self
                    .mutate(&code, |r| start_phase(r, policy, from, phase))
                    .await?;
                self.emit(&state, events);
                self.publish(&state);
            }
            ClientMessage::EndGame { room } => {
                let code = normalize_code(&room);
                let (state, events) = self.mutate(&code, |r| end_game(r, policy, from)).await?;
                self.inner.countdowns.stop(&code).await;
                self.emit(&state, events);
                self.publish(&state);
                self.record_stats(&state).await;
            }
            ClientMessage::ResetGame { room } => {
                let code = normalize_code(&room);
                let (state, events) = self.mutate(&code, |r| reset_game(r, &rules, from)).await?;
                self.emit(&state, events);
                self.publish(&state);
            }
            ClientMessage::ResetProductionCounts { room } => {
                let code = normalize_code(&room);
                let (state, ()) = self
                    .mutate(&code, |r| reset_production_counts(r, from))
                    .await?;
                self.acknowledge(from, &code, "reset_production_counts", ActionOutcome::Done);
                self.publish(&state);
            }
            ClientMessage::StartCountdown { room, seconds } => {
                let code = normalize_code(&room);
                self.load(&code).await?.require_admin(from)?;
                self.start_countdown(&code, seconds).await;
                self.acknowledge(from, &code, "start_countdown", ActionOutcome::Done);
            }
            ClientMessage::StopCountdown { room } => {
                let code = normalize_code(&room);
                let state = self.load(&code).await?;
                state.require_admin(from)?;
                if self.inner.countdowns.stop(&code).await {
                    self.fan_out(&state, ServerMessage::CountdownStopped { room: code.clone() });
                }
                self.acknowledge(from, &code, "stop_countdown", ActionOutcome::Done);
            }

            ClientMessage::ProductionBatch { room } => {
                self.team_action(from, &room, "production_batch", |r, seat| {
                    record_production_batch(r, seat.nation).map(ActionOutcome::Batch)
                })
                .await?;
            }
            ClientMessage::PlayProductionRps { room, hand } => {
                self.team_action(from, &room, "play_production_rps", |r, seat| {
                    r.with_rng(|r, rng| play_production_rps(r, policy, rng, seat.nation, hand))
                        .map(ActionOutcome::Rps)
                })
                .await?;
            }
            ClientMessage::RerollProductionRps { room } => {
                self.team_action(from, &room, "reroll_production_rps", |r, seat| {
                    reroll_production(r, seat.nation).map(ActionOutcome::Reroll)
                })
                .await?;
            }
            ClientMessage::CommitVoyage {
                room,
                destination,
                amount,
            } => {
                self.team_action(from, &room, "commit_voyage", |r, seat| {
                    commit_voyage(
                        r,
                        policy,
                        seat.nation,
                        &seat.display_name,
                        destination,
                        amount,
                    )
                    .map(ActionOutcome::Voyage)
                })
                .await?;
            }
            ClientMessage::ResetVoyage { room } => {
                self.team_action(from, &room, "reset_voyage", |r, seat| {
                    reset_voyage(r, seat.nation).map(|refunded| ActionOutcome::VoyageReset { refunded })
                })
                .await?;
            }
            ClientMessage::MakeInvestment {
                room,
                target,
                amount,
            } => {
                self.team_action(from, &room, "make_investment", |r, seat| {
                    make_investment(r, policy, seat.nation, &seat.display_name, target, amount)
                        .map(ActionOutcome::Investment)
                })
                .await?;
            }
            ClientMessage::ResetInvestments { room } => {
                self.team_action(from, &room, "reset_investments", |r, seat| {
                    reset_all_investments(r, seat.nation)
                        .map(|refunded| ActionOutcome::InvestmentsReset { refunded })
                })
                .await?;
            }
            ClientMessage::DrawEvent { room } => {
                self.team_action(from, &room, "draw_event", |r, seat| {
                    r.with_rng(|r, rng| draw_event(r, policy, rng, seat.nation))
                        .map(ActionOutcome::Event)
                })
                .await?;
            }
            ClientMessage::PlayArrivalRps { room, hand } => {
                self.team_action(from, &room, "play_arrival_rps", |r, seat| {
                    r.with_rng(|r, rng| play_arrival_rps(r, policy, rng, seat.nation, hand))
                        .map(ActionOutcome::Rps)
                })
                .await?;
            }
            ClientMessage::RerollArrivalRps { room } => {
                self.team_action(from, &room, "reroll_arrival_rps", |r, seat| {
                    reroll_arrival(r, seat.nation).map(ActionOutcome::Reroll)
                })
                .await?;
            }
        }
        Ok(())
    }

    async fn room_lock(&self, code: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.inner.locks.read().await.get(code) {
            return lock.clone();
        }
        self.inner
            .locks
            .write()
            .await
            .entry(code.to_string())
            .or_default()
            .clone()
    }

    /// Hold the room's lock. Retries when the entry was swept while this task waited, so a
    /// waiter never ends up on a mutex the table no longer hands out.
    async fn lock_room(&self, code: &str) -> OwnedMutexGuard<()> {
        loop {
            let lock = self.room_lock(code).await;
            let guard = lock.clone().lock_owned().await;
            let current = self.inner.locks.read().await.get(code).cloned();
            if current.is_some_and(|c| Arc::ptr_eq(&c, &lock)) {
                return guard;
            }
        }
    }

    /// Read a snapshot without taking the room lock.
    async fn load(&self, code: &str) -> Result<RoomState, HubError> {
        let key = self.inner.config.room_key(code);
        let bytes = self
            .inner
            .store
            .get(&key)
            .await?
            .ok_or_else(|| GameError::RoomNotFound(code.to_string()))?;
        Ok(decode_room(&bytes)?)
    }

    /// One serialized read-modify-write cycle. Nothing is written when `apply` fails.
    async fn mutate<T>(
        &self,
        code: &str,
        apply: impl FnOnce(&mut RoomState) -> Result<T, GameError>,
    ) -> Result<(RoomState, T), HubError> {
        let _guard = self.lock_room(code).await;

        let mut room = self.load(code).await?;
        let out = apply(&mut room)?;
        let snapshot = encode_room(&room)?;
        self.inner
            .store
            .set(&self.inner.config.room_key(code), snapshot)
            .await?;
        Ok((room, out))
    }

    async fn team_action(
        &self,
        from: ConnectionId,
        room: &str,
        action: &'static str,
        apply: impl FnOnce(&mut RoomState, &Seat) -> Result<ActionOutcome, GameError>,
    ) -> Result<(), HubError> {
        let code = normalize_code(room);
        let (state, outcome) = self
            .mutate(&code, |r| {
                let seat = r.seat(from)?.clone();
                apply(r, &seat)
            })
            .await?;
        debug!(room = %code, conn = %from, action, "action applied");
        self.acknowledge(from, &code, action, outcome);
        self.publish(&state);
        Ok(())
    }

    fn acknowledge(&self, to: ConnectionId, room: &str, action: &str, outcome: ActionOutcome) {
        self.send(
            to,
            ServerMessage::ActionResult {
                room: room.to_string(),
                action: action.to_string(),
                outcome,
            },
        );
    }

    async fn create_room(
        &self,
        from: ConnectionId,
        admin_id: &str,
        requested: Option<&str>,
    ) -> Result<String, HubError> {
        let admin_id = admin_id.trim();
        if admin_id.is_empty() {
            return Err(GameError::EmptyExternalId.into());
        }
        let code = match requested {
            Some(raw) => {
                let code = normalize_code(raw);
                let valid = (3..=12).contains(&code.len())
                    && code.chars().all(|c| c.is_ascii_alphanumeric());
                if !valid {
                    return Err(HubError::InvalidRoomCode);
                }
                code
            }
            None => self.fresh_code().await?,
        };

        let _guard = self.lock_room(&code).await;
        let key = self.inner.config.room_key(&code);
        if self.inner.store.exists(&key).await? {
            return Err(HubError::RoomExists(code));
        }
        let room = RoomState::new(code.clone(), admin_id, from, rand::random());
        self.inner.store.set(&key, encode_room(&room)?).await?;

        self.track(from, &code).await;
        info!(room = %code, conn = %from, "room created");
        self.send(from, ServerMessage::RoomCreated { room: code.clone() });
        self.publish(&room);
        Ok(code)
    }

    async fn fresh_code(&self) -> Result<String, HubError> {
        let mut code = generate_code();
        for _ in 0..CODE_ATTEMPTS {
            if !self
                .inner
                .store
                .exists(&self.inner.config.room_key(&code))
                .await?
            {
                return Ok(code);
            }
            code = generate_code();
        }
        Err(HubError::RoomExists(code))
    }

    async fn track(&self, conn: ConnectionId, code: &str) {
        self.inner
            .joined
            .write()
            .await
            .entry(conn)
            .or_default()
            .insert(code.to_string());
    }

    /// Push each recipient its own room view, plus its team ledger for team members.
    fn publish(&self, room: &RoomState) {
        for (conn, viewer) in audience(room) {
            self.publish_to(room, conn, viewer);
        }
    }

    fn publish_to(&self, room: &RoomState, conn: ConnectionId, viewer: Viewer) {
        self.send(
            conn,
            ServerMessage::RoomState {
                view: RoomView::for_viewer(room, viewer),
            },
        );
        if let Viewer::Team(nation) = viewer {
            if let Some(team) = room.teams.get(&nation) {
                self.send(
                    conn,
                    ServerMessage::TeamState {
                        team: TeamView::full(team),
                    },
                );
            }
        }
    }

    fn fan_out(&self, room: &RoomState, message: ServerMessage) {
        for (conn, _) in audience(room) {
            self.send(conn, message.clone());
        }
    }

    fn emit(&self, room: &RoomState, events: Vec<RoomEvent>) {
        for event in events {
            match event {
                RoomEvent::RoundClosed(view) => {
                    for (conn, viewer) in audience(room) {
                        self.send(
                            conn,
                            ServerMessage::RoundClosed {
                                room: room.code.clone(),
                                view: view.restricted_to(viewer),
                            },
                        );
                    }
                }
                other => self.fan_out(room, ServerMessage::from_event(&room.code, other)),
            }
        }
    }

    async fn record_stats(&self, room: &RoomState) {
        let Some(rankings) = room.final_rankings.as_deref() else {
            return;
        };
        match record_game(self.inner.stats.as_ref(), room, rankings, Utc::now()).await {
            Ok(written) => debug!(room = %room.code, written, "player stats recorded"),
            Err(err) => warn!(room = %room.code, error = %err, "failed to record player stats"),
        }
    }

    async fn start_countdown(&self, code: &str, seconds: u32) {
        let weak = Arc::downgrade(&self.inner);
        let room = code.to_string();
        self.inner
            .countdowns
            .start(code, seconds, self.inner.config.countdown_tick(), move |remaining| {
                let weak = weak.clone();
                let room = room.clone();
                async move {
                    if let Some(hub) = RoomHub::from_weak(&weak) {
                        hub.broadcast(
                            &room,
                            ServerMessage::Countdown {
                                room: room.clone(),
                                remaining_secs: remaining,
                            },
                        )
                        .await;
                    }
                }
            })
            .await;
        info!(room = %code, seconds, "countdown started");
    }

    /// Best-effort send to everyone in a room; a missing room is ignored.
    pub async fn broadcast(&self, code: &str, message: ServerMessage) {
        match self.load(code).await {
            Ok(room) => self.fan_out(&room, message),
            Err(err) => debug!(room = %code, error = %err, "broadcast skipped"),
        }
    }

    /// Mark the connection gone in every room it joined. Ledgers survive.
    pub async fn disconnect(&self, conn: ConnectionId) {
        let rooms = self.inner.joined.write().await.remove(&conn).unwrap_or_default();
        for code in rooms {
            match self.mutate(&code, |r| Ok(r.disconnect(conn))).await {
                Ok((room, true)) => {
                    debug!(room = %code, conn = %conn, "connection left");
                    self.publish(&room);
                }
                Ok((_, false)) => {}
                Err(err) => debug!(room = %code, conn = %conn, error = %err, "disconnect skipped"),
            }
        }
    }

    /// Delete every room with no connected member and no administrator connection.
    pub async fn sweep_idle(&self) -> Result<usize, HubError> {
        let prefix = &self.inner.config.key_prefix;
        let keys = self
            .inner
            .store
            .list_keys(&self.inner.config.room_pattern())
            .await?;

        let mut removed = 0;
        for key in keys {
            let Some(code) = key.strip_prefix(prefix.as_str()) else {
                continue;
            };
            let _guard = self.lock_room(code).await;
            let idle = match self.load(code).await {
                Ok(room) => room.is_idle(),
                Err(HubError::Game(GameError::RoomNotFound(_))) => false,
                Err(err) => {
                    warn!(room = %code, error = %err, "skipping unreadable room");
                    false
                }
            };
            if idle {
                self.inner.store.delete(&key).await?;
                self.inner.countdowns.stop(code).await;
                // removed under the guard so waiters see a missing entry and retry
                self.inner.locks.write().await.remove(code);
                removed += 1;
                info!(room = %code, "idle room removed");
            }
        }
        self.inner.countdowns.reap().await;
        Ok(removed)
    }

    /// Current snapshot of a room, for diagnostics and tests.
    pub async fn snapshot(&self, code: &str) -> Result<RoomState, HubError> {
        self.load(&normalize_code(code)).await
    }

    pub async fn countdown_running(&self, code: &str) -> bool {
        self.inner.countdowns.is_running(&normalize_code(code)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::MemoryStatsStore;
    use crate::store::MemoryStore;
    use tradewinds_core::NationId;

    #[test]
    fn generated_codes_use_the_alphabet() {
        let code = generate_code();
        assert_eq!(code.len(), CODE_LEN);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        assert_eq!(normalize_code("  abc12 "), "ABC12");
    }

    #[test]
    fn error_kinds() {
        assert_eq!(
            HubError::Store(StoreError::Unavailable("down".into())).kind(),
            ErrorKind::Infrastructure
        );
        assert_eq!(HubError::RoomExists("X".into()).kind(), ErrorKind::Validation);
        assert_eq!(
            HubError::from(GameError::NotAdmin).kind(),
            ErrorKind::Authorization
        );
    }

    fn test_hub() -> RoomHub {
        let (hub, _rx) = RoomHub::new(
            Arc::new(Rules::embedded().unwrap()),
            ServerConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStatsStore::new()),
        );
        hub
    }

    #[tokio::test]
    async fn waiter_on_a_swept_lock_moves_to_the_live_one() {
        let hub = test_hub();
        let held = hub.lock_room("ABC").await;

        let waiter_hub = hub.clone();
        let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let waiter = tokio::spawn(async move {
            let _guard = waiter_hub.lock_room("ABC").await;
            let _ = locked_tx.send(());
            let _ = release_rx.await;
        });
        tokio::task::yield_now().await;

        // same table edit sweep_idle makes for an idle room
        hub.inner.locks.write().await.remove("ABC");
        drop(held);
        locked_rx.await.unwrap();

        let live = hub.inner.locks.read().await.get("ABC").cloned().unwrap();
        assert!(live.try_lock().is_err());

        release_tx.send(()).unwrap();
        waiter.await.unwrap();
        assert!(live.try_lock().is_ok());
    }

    #[test]
    fn admin_is_not_addressed_twice() {
        let rules = Rules::embedded().unwrap();
        let mut room = RoomState::new("ABC", "instructor", ConnectionId(1), 0);
        room.register(&rules, ConnectionId(1), "instructor", "Instructor", NationId::Spain)
            .unwrap();
        room.register(&rules, ConnectionId(2), "kid", "Kid", NationId::France)
            .unwrap();

        let audience = audience(&room);
        assert_eq!(
            audience,
            vec![
                (ConnectionId(1), Viewer::Admin),
                (ConnectionId(2), Viewer::Team(NationId::France)),
            ]
        );
        assert_eq!(viewer_of(&room, ConnectionId(9)), Viewer::Spectator);
    }
}
