//! Match Service Types
//!
//! Defines wagering matches, bets, match events and the bodies of the
//! match endpoints.

use crate::database::{Collection, Document};
use crate::error::{Error, Result};
use crate::gaming::{BoardState, Placement};
use crate::services::economy::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique match identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub Uuid);

impl MatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MatchId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(MatchId)
            .map_err(|_| Error::not_found("Match"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameType {
    #[serde(rename = "connect-four")]
    ConnectFour,
    #[serde(rename = "2048-duel")]
    Duel2048,
}

impl GameType {
    /// Whether the server adjudicates moves for this game
    pub fn supports_moves(&self) -> bool {
        matches!(self, GameType::ConnectFour)
    }
}

impl FromStr for GameType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "connect-four" => Ok(GameType::ConnectFour),
            "2048-duel" => Ok(GameType::Duel2048),
            other => Err(Error::Validation(format!("Unsupported game type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Waiting,
    Active,
    Completed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Waiting => "waiting",
            MatchStatus::Active => "active",
            MatchStatus::Completed => "completed",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Cancelled)
    }
}

impl FromStr for MatchStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "waiting" => Ok(MatchStatus::Waiting),
            "active" => Ok(MatchStatus::Active),
            "completed" => Ok(MatchStatus::Completed),
            "cancelled" => Ok(MatchStatus::Cancelled),
            other => Err(Error::Validation(format!("Invalid status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    Ready,
    Playing,
    Forfeit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPlayer {
    pub user_id: UserId,
    pub wallet_address: String,
    pub status: PlayerStatus,
    pub score: Option<i64>,
}

/// A two-player wagering game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub game_type: GameType,
    /// Seat order: index 0 is player 1
    pub players: Vec<MatchPlayer>,
    pub stake_amount: Decimal,
    pub status: MatchStatus,
    pub winner_id: Option<UserId>,
    pub game_state: Option<BoardState>,
    pub on_chain_match_id: Option<u64>,
    pub tx_hash: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// Seat index (0 or 1) of a user
    pub fn seat_of(&self, user_id: UserId) -> Option<usize> {
        self.players.iter().position(|p| p.user_id == user_id)
    }

    pub fn is_player(&self, user_id: UserId) -> bool {
        self.seat_of(user_id).is_some()
    }

    pub fn creator(&self) -> Option<UserId> {
        self.players.first().map(|p| p.user_id)
    }
}

impl Document for Match {
    const COLLECTION: Collection = Collection::Matches;

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn key(&self) -> Option<String> {
        Some(self.status.as_str().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Placed,
    Won,
    Lost,
    Refunded,
}

/// A spectator wager on a match outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    pub id: Uuid,
    pub match_id: MatchId,
    pub user_id: UserId,
    pub wallet_address: String,
    pub predicted_winner_id: UserId,
    pub amount: Decimal,
    pub status: BetStatus,
    pub tx_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Document for Bet {
    const COLLECTION: Collection = Collection::Bets;

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn key(&self) -> Option<String> {
        Some(self.match_id.to_string())
    }
}

/// Match events broadcast to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    MatchCreated {
        match_id: MatchId,
        creator: UserId,
    },
    PlayerJoined {
        match_id: MatchId,
        player: UserId,
    },
    MoveMade {
        match_id: MatchId,
        player: UserId,
        placement: Placement,
    },
    MatchCompleted {
        match_id: MatchId,
        winner: Option<UserId>,
    },
    MatchCancelled {
        match_id: MatchId,
    },
    BetPlaced {
        match_id: MatchId,
        bet_id: Uuid,
    },
}

impl MatchEvent {
    pub fn match_id(&self) -> MatchId {
        match self {
            MatchEvent::MatchCreated { match_id, .. }
            | MatchEvent::PlayerJoined { match_id, .. }
            | MatchEvent::MoveMade { match_id, .. }
            | MatchEvent::MatchCompleted { match_id, .. }
            | MatchEvent::MatchCancelled { match_id }
            | MatchEvent::BetPlaced { match_id, .. } => *match_id,
        }
    }
}

/// Match service statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStats {
    pub total_matches: u64,
    pub moves_applied: u64,
    pub completed_matches: u64,
    pub cancelled_matches: u64,
    pub bets_placed: u64,
}

// ---- request bodies ----

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatchRequest {
    pub user_id: Option<String>,
    pub game_type: Option<String>,
    pub stake_amount: Option<Decimal>,
    pub tx_hash: Option<String>,
    pub on_chain_match_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMatchRequest {
    pub match_id: Option<String>,
    pub user_id: Option<String>,
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub user_id: Option<String>,
    pub column: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelMatchRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveMatchRequest {
    pub match_id: Option<String>,
    pub winner_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBetRequest {
    pub match_id: Option<String>,
    pub user_id: Option<String>,
    pub predicted_winner_id: Option<String>,
    pub amount: Option<Decimal>,
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListMatchesQuery {
    pub status: Option<String>,
}

// ---- responses ----

#[derive(Debug, Clone, Serialize)]
pub struct MatchResponse {
    #[serde(rename = "match")]
    pub match_: Match,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchListResponse {
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveResponse {
    #[serde(rename = "match")]
    pub match_: Match,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BetResponse {
    pub bet: Bet,
}
