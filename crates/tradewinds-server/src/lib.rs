//! Tradewinds room server
//!
//! Per-room serialized hub over a pluggable snapshot store, with account statistics,
//! countdown broadcasts and a JSON-lines TCP adapter.

pub mod config;
pub mod countdown;
pub mod hub;
pub mod protocol;
pub mod stats;
pub mod store;
pub mod transport;

pub use config::ServerConfig;
pub use countdown::Countdowns;
pub use hub::{HubError, Outbound, RoomHub};
pub use protocol::*;
pub use stats::{MemoryStatsStore, NationRecord, PlayerStats, StatsStore};
pub use store::{MemoryStore, RoomStore, StoreError};
pub use transport::LineServer;
