//! Economy Service Types
//!
//! Users, payments, game sessions and leaderboards, plus the request and
//! response bodies of the economy endpoints.

use crate::database::{Collection, Document};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(UserId)
            .map_err(|_| Error::not_found("User"))
    }
}

/// Consumable powerups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerupKind {
    Sonar,
    Xray,
    Timefreeze,
    Lucky,
    ExtraTime,
}

impl PowerupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerupKind::Sonar => "sonar",
            PowerupKind::Xray => "xray",
            PowerupKind::Timefreeze => "timefreeze",
            PowerupKind::Lucky => "lucky",
            PowerupKind::ExtraTime => "extra_time",
        }
    }
}

impl FromStr for PowerupKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sonar" => Ok(PowerupKind::Sonar),
            "xray" => Ok(PowerupKind::Xray),
            "timefreeze" => Ok(PowerupKind::Timefreeze),
            "lucky" => Ok(PowerupKind::Lucky),
            "extra_time" | "extraTime" => Ok(PowerupKind::ExtraTime),
            _ => Err(Error::Validation("Invalid powerup type".to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PowerupBalances {
    pub sonar: u32,
    pub xray: u32,
    pub timefreeze: u32,
    pub lucky: u32,
    pub extra_time: u32,
}

impl PowerupBalances {
    pub fn get(&self, kind: PowerupKind) -> u32 {
        match kind {
            PowerupKind::Sonar => self.sonar,
            PowerupKind::Xray => self.xray,
            PowerupKind::Timefreeze => self.timefreeze,
            PowerupKind::Lucky => self.lucky,
            PowerupKind::ExtraTime => self.extra_time,
        }
    }

    pub fn get_mut(&mut self, kind: PowerupKind) -> &mut u32 {
        match kind {
            PowerupKind::Sonar => &mut self.sonar,
            PowerupKind::Xray => &mut self.xray,
            PowerupKind::Timefreeze => &mut self.timefreeze,
            PowerupKind::Lucky => &mut self.lucky,
            PowerupKind::ExtraTime => &mut self.extra_time,
        }
    }
}

/// Passive heart regeneration timer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRefill {
    pub last_free_refill_at: Option<DateTime<Utc>>,
    pub next_free_refill_at: Option<DateTime<Utc>>,
}

/// A registered player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    /// Always lowercase
    pub wallet_address: String,
    pub username: String,
    pub avatar: String,
    pub hearts_balance: u32,
    #[serde(default)]
    pub premium_games_unlocked: Vec<String>,
    #[serde(default)]
    pub powerup_balances: PowerupBalances,
    #[serde(default)]
    pub total_spent: Decimal,
    #[serde(default)]
    pub heart_refill: HeartRefill,
    #[serde(default)]
    pub high_scores: BTreeMap<String, i64>,
    #[serde(default)]
    pub play_counts: BTreeMap<String, u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_unlocked(&self, game_id: &str) -> bool {
        self.premium_games_unlocked.iter().any(|g| g == game_id)
    }
}

impl Document for User {
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn key(&self) -> Option<String> {
        Some(self.wallet_address.clone())
    }
}

/// What a payment bought
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    PremiumGame,
    Hearts,
    Powerup,
    ExtraTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Verified,
    Failed,
}

/// An on-chain purchase. Pending and verified rows are unique per
/// transaction hash; failed rows never claim the hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub tx_hash: String,
    pub wallet_address: String,
    pub user_id: Option<UserId>,
    #[serde(rename = "type")]
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub currency: String,
    pub item_id: Option<String>,
    pub quantity: u32,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Payment {
    const COLLECTION: Collection = Collection::Payments;

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn key(&self) -> Option<String> {
        match self.status {
            PaymentStatus::Failed => Some(format!("failed:{}:{}", self.tx_hash, self.id)),
            PaymentStatus::Pending | PaymentStatus::Verified => Some(self.tx_hash.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

/// One play-through of a single-player game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    pub id: Uuid,
    pub user_id: UserId,
    pub game_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub score: Option<i64>,
    pub status: SessionStatus,
}

impl Document for GameSession {
    const COLLECTION: Collection = Collection::Sessions;

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn key(&self) -> Option<String> {
        Some(self.user_id.to_string())
    }
}

/// Per user, per game aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub user_id: UserId,
    pub game_id: String,
    pub high_score: i64,
    pub total_played: u64,
    /// Seconds
    pub total_play_time: u64,
    pub updated_at: DateTime<Utc>,
}

impl GameStats {
    pub fn new(user_id: UserId, game_id: &str) -> Self {
        Self {
            user_id,
            game_id: game_id.to_string(),
            high_score: 0,
            total_played: 0,
            total_play_time: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn document_id(user_id: UserId, game_id: &str) -> String {
        format!("{}:{}", user_id, game_id)
    }
}

impl Document for GameStats {
    const COLLECTION: Collection = Collection::GameStats;

    fn id(&self) -> String {
        Self::document_id(self.user_id, &self.game_id)
    }

    fn key(&self) -> Option<String> {
        Some(self.game_id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub username: String,
    pub avatar: String,
    pub score: i64,
    pub date: DateTime<Utc>,
}

/// Cached top scores for one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    pub game_id: String,
    pub entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    pub fn new(game_id: &str) -> Self {
        Self {
            game_id: game_id.to_string(),
            entries: Vec::new(),
        }
    }

    /// Insert or raise a user's entry, keep entries sorted by score and
    /// truncate to `capacity`
    pub fn record(&mut self, user: &User, score: i64, now: DateTime<Utc>, capacity: usize) {
        match self.entries.iter_mut().find(|e| e.user_id == user.id) {
            Some(entry) => {
                if score > entry.score {
                    entry.score = score;
                    entry.date = now;
                }
            }
            None => self.entries.push(LeaderboardEntry {
                user_id: user.id,
                username: user.username.clone(),
                avatar: user.avatar.clone(),
                score,
                date: now,
            }),
        }

        self.entries.sort_by(|a, b| b.score.cmp(&a.score));
        self.entries.truncate(capacity);
    }
}

impl Document for Leaderboard {
    const COLLECTION: Collection = Collection::Leaderboards;

    fn id(&self) -> String {
        self.game_id.clone()
    }
}

/// Score column of a ranking: points or money spent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RankScore {
    Points(i64),
    Currency(String),
}

/// A row of the global or per-game ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingRow {
    pub user_id: UserId,
    pub username: String,
    pub avatar: String,
    pub score: RankScore,
    pub is_currency: bool,
}

// ---- request bodies ----
//
// Every field is optional so that missing values produce the endpoint's own
// validation message rather than a generic decode failure.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub wallet_address: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRequest {
    pub wallet_address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumePowerupRequest {
    pub wallet_address: Option<String>,
    pub powerup_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveScoreRequest {
    pub wallet_address: Option<String>,
    pub game_id: Option<String>,
    pub score: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteGameRequest {
    pub wallet_address: Option<String>,
    pub session_id: Option<Uuid>,
    pub score: Option<i64>,
    #[serde(default)]
    pub time_spent: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseHeartsRequest {
    pub tx_hash: Option<String>,
    pub wallet_address: Option<String>,
    pub quantity: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePowerupRequest {
    pub tx_hash: Option<String>,
    pub wallet_address: Option<String>,
    pub powerup_type: Option<String>,
    pub quantity: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePremiumRequest {
    pub tx_hash: Option<String>,
    pub wallet_address: Option<String>,
    pub game_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub wallet_address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileQuery {
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardQuery {
    pub game_id: Option<String>,
}

// ---- responses ----

#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessUserResponse {
    pub success: bool,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartsResponse {
    pub success: bool,
    pub hearts_balance: u32,
    pub next_free_refill_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveScoreResponse {
    pub success: bool,
    pub high_score: i64,
    pub play_count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameResponse {
    pub success: bool,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteGameResponse {
    pub success: bool,
    pub new_high_score: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntriesResponse<T> {
    pub entries: Vec<T>,
}

/// Outcome of a purchase
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PurchaseResponse {
    Completed { success: bool, user: User },
    Unchanged { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_powerup_kind_parsing() {
        assert_eq!("xray".parse::<PowerupKind>().unwrap(), PowerupKind::Xray);
        assert_eq!("extra_time".parse::<PowerupKind>().unwrap(), PowerupKind::ExtraTime);
        assert!("laser".parse::<PowerupKind>().is_err());
        assert_eq!(
            serde_json::to_string(&PowerupKind::ExtraTime).unwrap(),
            "\"extra_time\""
        );
    }

    #[test]
    fn test_leaderboard_keeps_best_score_per_user() {
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            wallet_address: "0xabc".into(),
            username: "ann".into(),
            avatar: String::new(),
            hearts_balance: 5,
            premium_games_unlocked: vec![],
            powerup_balances: PowerupBalances::default(),
            total_spent: Decimal::ZERO,
            heart_refill: HeartRefill::default(),
            high_scores: BTreeMap::new(),
            play_counts: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };

        let mut board = Leaderboard::new("snake");
        board.record(&user, 40, now, 100);
        board.record(&user, 10, now, 100);
        assert_eq!(board.entries.len(), 1);
        assert_eq!(board.entries[0].score, 40);

        board.record(&user, 90, now, 100);
        assert_eq!(board.entries[0].score, 90);
    }

    #[test]
    fn test_payment_type_field_name() {
        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            tx_hash: "0x01".into(),
            wallet_address: "0xabc".into(),
            user_id: None,
            payment_type: PaymentType::PremiumGame,
            amount: Decimal::ZERO,
            currency: "cUSD".into(),
            item_id: Some("tetris".into()),
            quantity: 1,
            status: PaymentStatus::Failed,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&payment).unwrap();
        assert_eq!(json["type"], "premium_game");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["txHash"], "0x01");
        assert_ne!(payment.key().as_deref(), Some("0x01"));

        let verified = Payment {
            status: PaymentStatus::Verified,
            ..payment
        };
        assert_eq!(verified.key().as_deref(), Some("0x01"));
    }
}
