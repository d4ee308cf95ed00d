//! # Gateway game-thread layer
//!
//! Everything in this crate runs on the single game thread. The network
//! layer posts login requests, deciphered command payloads and detach
//! notices here through the embedding server's dispatcher; this crate
//! validates sessions, dispatches commands into the game façade, and builds
//! every outbound packet straight into the per-connection output queues.
//!
//! The game engine itself (map, creatures, items, persistence, chat rooms,
//! market storage) is not implemented here. It is consumed through the
//! capability traits in [`facade`].

pub mod client;
pub mod context;
pub mod dispatch;
pub mod facade;
pub mod login;
pub mod send;
#[cfg(test)]
pub(crate) mod testutil;
pub mod viewport;
pub mod waitlist;

pub use client::*;
pub use context::*;
pub use facade::*;
