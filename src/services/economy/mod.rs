//! User economy: hearts, powerups, premium unlocks, scores and purchases

pub mod hearts;
pub mod http;
pub mod service;
pub mod types;

pub use hearts::HeartPolicy;
pub use service::{EconomyService, EconomyStats};
pub use types::*;
