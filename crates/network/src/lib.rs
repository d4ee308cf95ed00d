//! # Gateway network layer
//!
//! Runs every socket on one thread: a current-thread executor drives the
//! accept loop plus, per connection, a short-lived handshake task and then a
//! reader and a writer task. Game logic never runs here; completed frames
//! and login requests cross to the game thread through the [`GameSink`]
//! seam, and the game thread reaches back only by appending to connection
//! output queues.

mod connection;
mod server;
mod sink;

pub use connection::*;
pub use server::*;
pub use sink::*;
