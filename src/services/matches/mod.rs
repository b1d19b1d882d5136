//! Two-player wagering matches
//!
//! - `engine`: pure state transitions (create, join, move, resolve, cancel)
//! - `service`: persistence, per-match locking, events and settlement
//! - `http`: axum routes including the websocket event stream

pub mod engine;
pub mod http;
pub mod service;
pub mod types;

pub use service::{LogSettlement, MatchService, Settlement};
pub use types::*;
