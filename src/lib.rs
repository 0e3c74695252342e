//! State-transition engine for a hub-and-spoke payment channel network.
//!
//! Every user holds one bilateral channel with the hub. Users can open
//! threads (virtual channels to another user) inside their channel; open
//! threads are committed to by a Merkle root in the channel state.
//!
//! The engine is pure: [`state::generator`] builds the next state for an
//! update, [`state::Validator`] decides whether a counterparty's proposed
//! state is a legal successor. Only [`state::ChainConfirmer`] talks to the
//! chain, to fetch the receipt that confirms a pending deposit or withdrawal.

pub mod config;
pub mod state;
#[doc(hidden)]
pub mod testing;
pub mod types;
pub mod utils;

pub use config::EngineConfig;
pub use state::{generate, ChainConfirmer, ChainReader, Validator};
pub use types::{
    ChannelState, EngineError, Party, ThreadState, UpdateArgs, UpdateReason, Violation,
    ViolationKind,
};
pub use utils::merkle::{build_root, EMPTY_ROOT_HASH};
