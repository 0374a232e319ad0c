//! Tradewinds game engine.
//!
//! Pure, synchronous room state for the classroom trading game: nations and their
//! profiles, team ledgers, the phase cycle, production, voyages and investments,
//! arrival settlement and final ranking. Persistence and transport live elsewhere.

mod error;
mod event;
mod ids;
mod ledger;
mod nation;
mod phase;
mod production;
mod ranking;
mod rng;
mod room;
pub mod rps;
mod rules;
mod settlement;
mod view;
mod voyage;

pub use crate::error::*;
pub use crate::event::*;
pub use crate::ids::*;
pub use crate::ledger::*;
pub use crate::nation::*;
pub use crate::phase::*;
pub use crate::production::*;
pub use crate::ranking::*;
pub use crate::rng::*;
pub use crate::room::*;
pub use crate::rps::{Hand, RpsRecord, RpsResult};
pub use crate::rules::*;
pub use crate::settlement::*;
pub use crate::view::*;
pub use crate::voyage::*;
