//! GameHub services
//!
//! Each service owns its domain logic and exposes an axum `routes()`
//! builder; `crate::api` merges them into one router over a shared
//! [`crate::api::AppState`].

pub mod ai;
pub mod economy;
pub mod matches;

pub use economy::EconomyService;
pub use matches::MatchService;
