//! GameHub - casual game hub backend
//!
//! The crate is laid out by concern:
//! - config: TOML configuration with environment overrides
//! - database: document store trait with in-memory and SQLite backends
//! - chain: stablecoin transfer verification over JSON-RPC
//! - gaming: Connect Four and Tic-Tac-Toe rules and computer opponents
//! - services: the hearts economy, wagering matches and AI endpoints
//! - api: axum router and shared state
//! - logging: tracing subscriber setup

pub mod api;
pub mod chain;
pub mod config;
pub mod database;
pub mod error;
pub mod gaming;
pub mod logging;
pub mod services;

// Re-export commonly used types for easy access
pub use api::{router, AppState};
pub use config::{Config, Environment};
pub use error::{Error, Result};
pub use services::economy::{EconomyService, User, UserId};
pub use services::matches::{Match, MatchEvent, MatchId, MatchService, MatchStatus};
