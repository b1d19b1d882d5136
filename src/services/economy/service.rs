//! Economy Service Implementation
//!
//! Registration, hearts, powerups, scores, game sessions, leaderboards and
//! verified purchases. Every read-modify-write of a user record runs under
//! that wallet's lock.

use super::hearts::HeartPolicy;
use super::types::*;
use crate::chain::{ChainVerifier, TransferOutcome};
use crate::config::EconomyConfig;
use crate::database::{DocumentStore, KeyedLocks, Repository};
use crate::error::{Error, Result};
use crate::gaming::catalog;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const AVATAR_BASE: &str = "https://api.dicebear.com/9.x/pixel-art/svg?seed=";

/// Economy counters reported by the health endpoint
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EconomyStats {
    pub registrations: u64,
    pub verified_payments: u64,
    pub rejected_payments: u64,
    pub games_started: u64,
}

#[derive(Debug, Default)]
struct EconomyCounters {
    registrations: AtomicU64,
    verified_payments: AtomicU64,
    rejected_payments: AtomicU64,
    games_started: AtomicU64,
}

/// A purchase awaiting verification
struct PurchaseOrder {
    tx_hash: String,
    wallet: String,
    payment_type: PaymentType,
    amount: Decimal,
    item_id: Option<String>,
    quantity: u32,
}

/// The parts of the service a purchase needs once its transfer is verified
struct PurchaseLedger {
    users: Repository<User>,
    payments: Repository<Payment>,
    locks: Arc<KeyedLocks>,
    counters: Arc<EconomyCounters>,
    currency: String,
}

impl PurchaseLedger {
    async fn credit<F>(self, order: PurchaseOrder, apply: F) -> Result<PurchaseResponse>
    where
        F: FnOnce(&mut User) -> bool,
    {
        let _guard = self.locks.lock(&order.wallet).await;
        let mut user = self
            .users
            .find_one_by_key(&order.wallet)
            .await?
            .ok_or_else(|| Error::not_found("User"))?;
        if !apply(&mut user) {
            return Ok(PurchaseResponse::Unchanged {
                message: "Game already unlocked".to_string(),
            });
        }

        let now = Utc::now();
        let mut payment = Payment {
            id: Uuid::new_v4(),
            tx_hash: order.tx_hash.clone(),
            wallet_address: order.wallet.clone(),
            user_id: Some(user.id),
            payment_type: order.payment_type,
            amount: order.amount,
            currency: self.currency,
            item_id: order.item_id,
            quantity: order.quantity,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.payments.insert(&payment).await.map_err(|e| match e {
            Error::Conflict(_) => duplicate_transaction(),
            other => other,
        })?;

        user.total_spent += order.amount;
        user.updated_at = Utc::now();
        self.users.save(&user).await?;

        payment.status = PaymentStatus::Verified;
        payment.updated_at = Utc::now();
        self.payments.save(&payment).await?;

        self.counters.verified_payments.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            tx_hash = %order.tx_hash,
            wallet = %order.wallet,
            kind = ?order.payment_type,
            amount = %order.amount,
            "purchase credited"
        );

        Ok(PurchaseResponse::Completed { success: true, user })
    }
}

/// Economy Service
pub struct EconomyService {
    config: EconomyConfig,
    policy: HeartPolicy,
    users: Repository<User>,
    payments: Repository<Payment>,
    sessions: Repository<GameSession>,
    stats: Repository<GameStats>,
    leaderboards: Repository<Leaderboard>,
    verifier: Arc<dyn ChainVerifier>,
    locks: Arc<KeyedLocks>,
    counters: Arc<EconomyCounters>,
}

fn required(value: Option<String>, message: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Validation(message.to_string()))
}

fn duplicate_transaction() -> Error {
    Error::Conflict("Transaction already processed".to_string())
}

impl EconomyService {
    pub fn new(
        config: EconomyConfig,
        store: Arc<dyn DocumentStore>,
        verifier: Arc<dyn ChainVerifier>,
    ) -> Self {
        Self {
            policy: HeartPolicy::from_config(&config),
            config,
            users: Repository::new(store.clone()),
            payments: Repository::new(store.clone()),
            sessions: Repository::new(store.clone()),
            stats: Repository::new(store.clone()),
            leaderboards: Repository::new(store),
            verifier,
            locks: Arc::new(KeyedLocks::new()),
            counters: Arc::new(EconomyCounters::default()),
        }
    }

    pub fn stats(&self) -> EconomyStats {
        EconomyStats {
            registrations: self.counters.registrations.load(Ordering::Relaxed),
            verified_payments: self.counters.verified_payments.load(Ordering::Relaxed),
            rejected_payments: self.counters.rejected_payments.load(Ordering::Relaxed),
            games_started: self.counters.games_started.load(Ordering::Relaxed),
        }
    }

    async fn find_user(&self, wallet: &str) -> Result<User> {
        self.users
            .find_one_by_key(wallet)
            .await?
            .ok_or_else(|| Error::not_found("User"))
    }

    async fn save_user(&self, user: &mut User) -> Result<()> {
        user.updated_at = Utc::now();
        self.users.save(user).await
    }

    /// Register a wallet. Wallets are unique, case-insensitively.
    pub async fn register(&self, req: RegisterRequest) -> Result<User> {
        let message = "Wallet address and username are required";
        let wallet = required(req.wallet_address, message)?.to_lowercase();
        let username = required(req.username, message)?;

        let _guard = self.locks.lock(&wallet).await;
        if self.users.find_one_by_key(&wallet).await?.is_some() {
            return Err(Error::Conflict("User already exists".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            avatar: format!("{}{}", AVATAR_BASE, wallet),
            wallet_address: wallet,
            username,
            hearts_balance: self.config.starting_hearts,
            premium_games_unlocked: Vec::new(),
            powerup_balances: PowerupBalances::default(),
            total_spent: Decimal::ZERO,
            heart_refill: HeartRefill::default(),
            high_scores: Default::default(),
            play_counts: Default::default(),
            created_at: now,
            updated_at: now,
        };

        self.users.insert(&user).await.map_err(|e| match e {
            Error::Conflict(_) => Error::Conflict("User already exists".to_string()),
            other => other,
        })?;

        self.counters.registrations.fetch_add(1, Ordering::Relaxed);
        tracing::info!(user_id = %user.id, wallet = %user.wallet_address, "user registered");
        Ok(user)
    }

    /// Profile read with passive heart refill applied
    pub async fn user_with_refill(&self, wallet: Option<String>) -> Result<User> {
        let wallet = required(wallet, "Wallet address required")?.to_lowercase();
        let _guard = self.locks.lock(&wallet).await;

        let mut user = self.find_user(&wallet).await?;
        if self.policy.apply_refill(&mut user, Utc::now()) {
            self.save_user(&mut user).await?;
        }
        Ok(user)
    }

    /// Stored profile, no refill
    pub async fn profile(&self, address: Option<String>) -> Result<User> {
        let wallet = required(address, "Address required")?.to_lowercase();
        self.find_user(&wallet).await
    }

    /// Spend a heart if one is left; an empty balance is not an error
    pub async fn consume_heart(&self, req: WalletRequest) -> Result<HeartsResponse> {
        let wallet = required(req.wallet_address, "Wallet address required")?.to_lowercase();
        let _guard = self.locks.lock(&wallet).await;

        let mut user = self.find_user(&wallet).await?;
        if self.policy.consume(&mut user, Utc::now()) {
            self.save_user(&mut user).await?;
        }

        Ok(HeartsResponse {
            success: true,
            hearts_balance: user.hearts_balance,
            next_free_refill_at: user.heart_refill.next_free_refill_at,
        })
    }

    /// Spend a heart; 403 when none are left
    pub async fn consume_life(&self, req: WalletRequest) -> Result<HeartsResponse> {
        let wallet = required(req.wallet_address, "Wallet address is required")?.to_lowercase();
        let _guard = self.locks.lock(&wallet).await;

        let mut user = self.find_user(&wallet).await?;
        self.policy.consume_strict(&mut user, Utc::now())?;
        self.save_user(&mut user).await?;

        Ok(HeartsResponse {
            success: true,
            hearts_balance: user.hearts_balance,
            next_free_refill_at: user.heart_refill.next_free_refill_at,
        })
    }

    pub async fn consume_powerup(&self, req: ConsumePowerupRequest) -> Result<User> {
        let wallet = required(req.wallet_address, "Missing required fields")?.to_lowercase();
        let kind: PowerupKind = required(req.powerup_type, "Missing required fields")?.parse()?;
        let _guard = self.locks.lock(&wallet).await;

        let mut user = self.find_user(&wallet).await?;
        let balance = user.powerup_balances.get_mut(kind);
        if *balance == 0 {
            return Err(Error::Validation("Insufficient powerup balance".to_string()));
        }
        *balance -= 1;

        self.save_user(&mut user).await?;
        tracing::debug!(wallet = %wallet, powerup = kind.as_str(), "powerup consumed");
        Ok(user)
    }

    /// Record a finished game on the user profile
    pub async fn save_score(&self, req: SaveScoreRequest) -> Result<SaveScoreResponse> {
        let message = "Missing required fields";
        let wallet = required(req.wallet_address, message)?.to_lowercase();
        let game_id = required(req.game_id, message)?;
        let score = req.score.ok_or_else(Error::missing_fields)?;
        let _guard = self.locks.lock(&wallet).await;

        let mut user = self.find_user(&wallet).await?;
        let high_score = user.high_scores.entry(game_id.clone()).or_insert(score);
        if score > *high_score {
            *high_score = score;
        }
        let high_score = *high_score;
        let play_count = user.play_counts.entry(game_id).or_insert(0);
        *play_count += 1;
        let play_count = *play_count;

        self.save_user(&mut user).await?;
        Ok(SaveScoreResponse {
            success: true,
            high_score,
            play_count,
        })
    }

    /// Open a game session. Requires a heart and, for premium games, an unlock.
    pub async fn start_game(&self, game_id: &str, req: WalletRequest) -> Result<StartGameResponse> {
        let wallet = required(req.wallet_address, "Missing fields")?.to_lowercase();
        let user = self.find_user(&wallet).await?;

        if !catalog::is_known_game(game_id) {
            return Err(Error::NotFound("Invalid game".to_string()));
        }
        if user.hearts_balance == 0 {
            return Err(Error::Forbidden("No hearts remaining".to_string()));
        }
        if catalog::is_premium(game_id) && !user.has_unlocked(game_id) {
            return Err(Error::Forbidden("Premium game locked".to_string()));
        }

        let session = GameSession {
            id: Uuid::new_v4(),
            user_id: user.id,
            game_id: game_id.to_string(),
            start_time: Utc::now(),
            end_time: None,
            score: None,
            status: SessionStatus::Active,
        };
        self.sessions.insert(&session).await?;
        self.counters.games_started.fetch_add(1, Ordering::Relaxed);

        Ok(StartGameResponse {
            success: true,
            session_id: session.id,
        })
    }

    /// Close a session and fold the score into stats and the cached leaderboard
    pub async fn complete_game(
        &self,
        game_id: &str,
        req: CompleteGameRequest,
    ) -> Result<CompleteGameResponse> {
        let wallet = required(req.wallet_address, "Missing fields")?.to_lowercase();
        let score = req
            .score
            .ok_or_else(|| Error::Validation("Missing fields".to_string()))?;
        let user = self.find_user(&wallet).await?;
        let now = Utc::now();

        if let Some(session_id) = req.session_id {
            let mut session = self
                .sessions
                .get(&session_id.to_string())
                .await?
                .filter(|s| s.user_id == user.id)
                .ok_or_else(|| Error::not_found("Session"))?;
            session.end_time = Some(now);
            session.score = Some(score);
            session.status = SessionStatus::Completed;
            self.sessions.save(&session).await?;
        }

        let stats = {
            let _guard = self.locks.lock(&wallet).await;
            let mut stats = self
                .stats
                .get(&GameStats::document_id(user.id, game_id))
                .await?
                .unwrap_or_else(|| GameStats::new(user.id, game_id));
            stats.total_played = stats.total_played.saturating_add(1);
            stats.total_play_time = stats.total_play_time.saturating_add(req.time_spent);
            if score > stats.high_score {
                stats.high_score = score;
            }
            stats.updated_at = now;
            self.stats.save(&stats).await?;
            stats
        };

        {
            let _guard = self.locks.lock(&format!("leaderboard:{}", game_id)).await;
            let mut board = self
                .leaderboards
                .get(game_id)
                .await?
                .unwrap_or_else(|| Leaderboard::new(game_id));
            board.record(&user, score, now, self.config.leaderboard_capacity);
            self.leaderboards.save(&board).await?;
        }

        Ok(CompleteGameResponse {
            success: true,
            new_high_score: score == stats.high_score,
        })
    }

    /// Global ranking by money spent, or per-game ranking by high score
    pub async fn leaderboard(&self, game_id: Option<String>) -> Result<Vec<RankingRow>> {
        let users = self.users.list().await?;

        let rows = match game_id.as_deref() {
            None | Some("") | Some("global") => {
                let mut spenders: Vec<_> = users
                    .into_iter()
                    .filter(|u| u.total_spent > Decimal::ZERO)
                    .collect();
                spenders.sort_by(|a, b| b.total_spent.cmp(&a.total_spent));
                spenders
                    .into_iter()
                    .take(self.config.leaderboard_page)
                    .map(|u| RankingRow {
                        user_id: u.id,
                        score: RankScore::Currency(format!("{:.2}", u.total_spent)),
                        username: u.username,
                        avatar: u.avatar,
                        is_currency: true,
                    })
                    .collect()
            }
            Some(game) => {
                let mut scored: Vec<_> = users
                    .into_iter()
                    .filter_map(|u| u.high_scores.get(game).copied().map(|s| (s, u)))
                    .collect();
                scored.sort_by(|a, b| b.0.cmp(&a.0));
                scored
                    .into_iter()
                    .take(self.config.leaderboard_page)
                    .map(|(score, u)| RankingRow {
                        user_id: u.id,
                        username: u.username,
                        avatar: u.avatar,
                        score: RankScore::Points(score),
                        is_currency: false,
                    })
                    .collect()
            }
        };
        Ok(rows)
    }

    /// Cached per-game leaderboard, rebuilt from stats when empty
    pub async fn cached_leaderboard(&self, game_id: &str) -> Result<Vec<LeaderboardEntry>> {
        if let Some(board) = self.leaderboards.get(game_id).await? {
            if !board.entries.is_empty() {
                return Ok(board.entries);
            }
        }

        let mut stats = self.stats.find_by_key(game_id).await?;
        stats.sort_by(|a, b| b.high_score.cmp(&a.high_score));
        stats.truncate(self.config.leaderboard_page);

        let mut entries = Vec::with_capacity(stats.len());
        for stat in stats {
            let user = self.users.get(&stat.user_id.to_string()).await?;
            entries.push(LeaderboardEntry {
                user_id: stat.user_id,
                username: user
                    .as_ref()
                    .map(|u| u.username.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
                avatar: user.map(|u| u.avatar).unwrap_or_default(),
                score: stat.high_score,
                date: stat.updated_at,
            });
        }
        Ok(entries)
    }

    pub async fn purchase_hearts(&self, req: PurchaseHeartsRequest) -> Result<PurchaseResponse> {
        let tx_hash = required(req.tx_hash, "Missing required fields")?;
        let wallet = required(req.wallet_address, "Missing required fields")?.to_lowercase();
        let quantity = req.quantity.unwrap_or(1);
        if quantity == 0 {
            return Err(Error::Validation("Quantity must be at least 1".to_string()));
        }

        let order = PurchaseOrder {
            tx_hash,
            wallet,
            payment_type: PaymentType::Hearts,
            amount: self.config.heart_price * Decimal::from(quantity),
            item_id: None,
            quantity,
        };
        let policy = self.policy;
        self.settle_purchase(order, move |user| {
            policy.credit(user, quantity);
            true
        })
        .await
    }

    pub async fn purchase_powerup(&self, req: PurchasePowerupRequest) -> Result<PurchaseResponse> {
        let tx_hash = required(req.tx_hash, "Missing required fields")?;
        let wallet = required(req.wallet_address, "Missing required fields")?.to_lowercase();
        let kind: PowerupKind = required(req.powerup_type, "Missing required fields")?.parse()?;
        let quantity = req.quantity.unwrap_or(1);
        if quantity == 0 {
            return Err(Error::Validation("Quantity must be at least 1".to_string()));
        }

        let prices = &self.config.powerup_prices;
        let unit_price = match kind {
            PowerupKind::Sonar => prices.sonar,
            PowerupKind::Xray => prices.xray,
            PowerupKind::Timefreeze => prices.timefreeze,
            PowerupKind::Lucky => prices.lucky,
            PowerupKind::ExtraTime => prices.extra_time,
        };
        let payment_type = match kind {
            PowerupKind::ExtraTime => PaymentType::ExtraTime,
            _ => PaymentType::Powerup,
        };

        let order = PurchaseOrder {
            tx_hash,
            wallet,
            payment_type,
            amount: unit_price * Decimal::from(quantity),
            item_id: Some(kind.as_str().to_string()),
            quantity,
        };
        self.settle_purchase(order, move |user| {
            let balance = user.powerup_balances.get_mut(kind);
            *balance = balance.saturating_add(quantity);
            true
        })
        .await
    }

    pub async fn purchase_premium_game(&self, req: PurchasePremiumRequest) -> Result<PurchaseResponse> {
        let tx_hash = required(req.tx_hash, "Missing required fields")?;
        let wallet = required(req.wallet_address, "Missing required fields")?.to_lowercase();
        let game_id = required(req.game_id, "Missing required fields")?;
        if !catalog::is_premium(&game_id) {
            return Err(Error::Validation("Not a premium game".to_string()));
        }

        let order = PurchaseOrder {
            tx_hash,
            wallet,
            payment_type: PaymentType::PremiumGame,
            amount: self.config.premium_game_price,
            item_id: Some(game_id.clone()),
            quantity: 1,
        };
        self.settle_purchase(order, move |user| {
            if user.has_unlocked(&game_id) {
                return false;
            }
            user.premium_games_unlocked.push(game_id);
            true
        })
        .await
    }

    /// Shared purchase flow: reject replays, verify on chain, then credit
    /// exactly once. `apply` returns false when there is nothing to credit.
    async fn settle_purchase<F>(&self, order: PurchaseOrder, apply: F) -> Result<PurchaseResponse>
    where
        F: FnOnce(&mut User) -> bool + Send + 'static,
    {
        if self.payments.find_one_by_key(&order.tx_hash).await?.is_some() {
            return Err(duplicate_transaction());
        }

        match self
            .verifier
            .verify_transfer(&order.tx_hash, order.amount, &order.wallet)
            .await
        {
            Ok(TransferOutcome::Verified(transfer)) => {
                tracing::debug!(tx_hash = %order.tx_hash, value = transfer.value, "transfer verified");
            }
            Ok(TransferOutcome::Rejected(reason)) => {
                self.counters.rejected_payments.fetch_add(1, Ordering::Relaxed);
                self.record_failed_payment(&order).await;
                tracing::warn!(tx_hash = %order.tx_hash, %reason, "payment rejected");
                return Err(Error::Verification(reason));
            }
            Err(e) => {
                tracing::warn!(tx_hash = %order.tx_hash, error = %e, "payment verification unavailable");
                return Err(Error::Verification(format!("Verification error: {}", e)));
            }
        }

        // Crediting runs on its own task so a dropped request cannot stop it
        // between inserting the payment and saving the user.
        let ledger = PurchaseLedger {
            users: self.users.clone(),
            payments: self.payments.clone(),
            locks: self.locks.clone(),
            counters: self.counters.clone(),
            currency: self.config.currency.clone(),
        };
        tokio::spawn(ledger.credit(order, apply))
            .await
            .map_err(|e| Error::Internal(format!("Purchase task failed: {}", e)))?
    }

    /// Best effort; the caller already reports the rejection
    async fn record_failed_payment(&self, order: &PurchaseOrder) {
        let user_id = match self.users.find_one_by_key(&order.wallet).await {
            Ok(user) => user.map(|u| u.id),
            Err(_) => None,
        };

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            tx_hash: order.tx_hash.clone(),
            wallet_address: order.wallet.clone(),
            user_id,
            payment_type: order.payment_type,
            amount: Decimal::ZERO,
            currency: self.config.currency.clone(),
            item_id: order.item_id.clone(),
            quantity: order.quantity,
            status: PaymentStatus::Failed,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.payments.insert(&payment).await {
            tracing::warn!(tx_hash = %order.tx_hash, error = %e, "could not record failed payment");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{AcceptAllVerifier, TokenTransfer};
    use std::sync::atomic::AtomicBool;
    use crate::config::{Config, Environment};
    use crate::database::MemoryStore;
    use async_trait::async_trait;

    struct RejectAll;

    #[async_trait]
    impl ChainVerifier for RejectAll {
        async fn verify_transfer(&self, _: &str, _: Decimal, _: &str) -> Result<TransferOutcome> {
            Ok(TransferOutcome::Rejected("Transaction sender mismatch".to_string()))
        }
    }

    /// Verifies only transfers sent by `payer`
    struct PaidBy(&'static str);

    #[async_trait]
    impl ChainVerifier for PaidBy {
        async fn verify_transfer(&self, _: &str, _: Decimal, sender: &str) -> Result<TransferOutcome> {
            if sender != self.0 {
                return Ok(TransferOutcome::Rejected("Transaction sender mismatch".to_string()));
            }
            Ok(TransferOutcome::Verified(TokenTransfer {
                from: sender.to_string(),
                to: "0xtreasury".to_string(),
                value: 1,
            }))
        }
    }

    /// Reports the receipt missing until `mined` is set
    #[derive(Default)]
    struct NotYetMined {
        mined: AtomicBool,
    }

    #[async_trait]
    impl ChainVerifier for NotYetMined {
        async fn verify_transfer(&self, _: &str, _: Decimal, sender: &str) -> Result<TransferOutcome> {
            if !self.mined.load(Ordering::SeqCst) {
                return Err(Error::Verification("Transaction not found".to_string()));
            }
            Ok(TransferOutcome::Verified(TokenTransfer {
                from: sender.to_string(),
                to: "0xtreasury".to_string(),
                value: 1,
            }))
        }
    }

    fn service_with(verifier: Arc<dyn ChainVerifier>) -> EconomyService {
        let config = Config::default_for_environment(Environment::Testing);
        EconomyService::new(config.economy, Arc::new(MemoryStore::new()), verifier)
    }

    fn service() -> EconomyService {
        service_with(Arc::new(AcceptAllVerifier))
    }

    async fn register(svc: &EconomyService, wallet: &str) -> User {
        svc.register(RegisterRequest {
            wallet_address: Some(wallet.to_string()),
            username: Some("ann".to_string()),
        })
        .await
        .unwrap()
    }

    fn hearts_order(tx: &str, wallet: &str, quantity: u32) -> PurchaseHeartsRequest {
        PurchaseHeartsRequest {
            tx_hash: Some(tx.to_string()),
            wallet_address: Some(wallet.to_string()),
            quantity: Some(quantity),
        }
    }

    #[tokio::test]
    async fn test_register_lowercases_and_rejects_duplicates() {
        let svc = service();
        let user = register(&svc, "0xABCDEF").await;
        assert_eq!(user.wallet_address, "0xabcdef");
        assert_eq!(user.hearts_balance, 5);
        assert!(user.avatar.ends_with("seed=0xabcdef"));

        let err = svc
            .register(RegisterRequest {
                wallet_address: Some("0xabcdef".into()),
                username: Some("bob".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let err = svc.register(RegisterRequest::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Wallet address and username are required");
    }

    #[tokio::test]
    async fn test_tx_hash_credited_once() {
        let svc = service();
        register(&svc, "0xaa").await;

        let first = svc.purchase_hearts(hearts_order("0xtx1", "0xaa", 2)).await.unwrap();
        match first {
            PurchaseResponse::Completed { user, .. } => {
                assert_eq!(user.hearts_balance, 7);
                assert_eq!(user.total_spent, Decimal::new(4, 2));
            }
            other => panic!("unexpected {:?}", other),
        }

        let replay = svc.purchase_hearts(hearts_order("0xtx1", "0xaa", 2)).await.unwrap_err();
        assert_eq!(replay.to_string(), "Transaction already processed");

        let user = svc.profile(Some("0xAA".into())).await.unwrap();
        assert_eq!(user.hearts_balance, 7);
    }

    #[tokio::test]
    async fn test_concurrent_replays_credit_once() {
        let svc = Arc::new(service());
        register(&svc, "0xaa").await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move {
                svc.purchase_powerup(PurchasePowerupRequest {
                    tx_hash: Some("0xsame".into()),
                    wallet_address: Some("0xaa".into()),
                    powerup_type: Some("lucky".into()),
                    quantity: Some(1),
                })
                .await
                .is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        let user = svc.profile(Some("0xaa".into())).await.unwrap();
        assert_eq!(user.powerup_balances.lucky, 1);
    }

    #[tokio::test]
    async fn test_rejection_records_failed_payment() {
        let svc = service_with(Arc::new(RejectAll));
        register(&svc, "0xaa").await;

        for _ in 0..2 {
            let err = svc.purchase_hearts(hearts_order("0xbad", "0xaa", 1)).await.unwrap_err();
            assert!(matches!(err, Error::Verification(_)));
        }

        let failed = svc.payments.list().await.unwrap();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|p| p.status == PaymentStatus::Failed));
        assert!(failed.iter().all(|p| p.amount == Decimal::ZERO && p.tx_hash == "0xbad"));
        assert!(svc.payments.find_one_by_key("0xbad").await.unwrap().is_none());
        assert_eq!(svc.stats().rejected_payments, 2);
    }

    #[tokio::test]
    async fn test_foreign_claim_does_not_burn_hash() {
        let svc = service_with(Arc::new(PaidBy("0xaa")));
        register(&svc, "0xaa").await;
        register(&svc, "0xbb").await;

        let err = svc.purchase_hearts(hearts_order("0xreal", "0xbb", 1)).await.unwrap_err();
        assert_eq!(err.to_string(), "Transaction sender mismatch");

        let resp = svc.purchase_hearts(hearts_order("0xreal", "0xaa", 1)).await.unwrap();
        match resp {
            PurchaseResponse::Completed { user, .. } => assert_eq!(user.hearts_balance, 6),
            other => panic!("unexpected {:?}", other),
        }

        let replay = svc.purchase_hearts(hearts_order("0xreal", "0xaa", 1)).await.unwrap_err();
        assert!(matches!(replay, Error::Conflict(_)));
        let intruder = svc.profile(Some("0xbb".into())).await.unwrap();
        assert_eq!(intruder.hearts_balance, 5);
    }

    #[tokio::test]
    async fn test_unmined_transaction_can_be_retried() {
        let verifier = Arc::new(NotYetMined::default());
        let svc = service_with(verifier.clone());
        register(&svc, "0xaa").await;

        let err = svc.purchase_hearts(hearts_order("0xfresh", "0xaa", 3)).await.unwrap_err();
        assert!(matches!(err, Error::Verification(_)));
        assert!(err.to_string().contains("Transaction not found"));
        assert!(svc.payments.list().await.unwrap().is_empty());
        assert_eq!(svc.stats().rejected_payments, 0);

        verifier.mined.store(true, Ordering::SeqCst);
        let resp = svc.purchase_hearts(hearts_order("0xfresh", "0xaa", 3)).await.unwrap();
        assert!(matches!(resp, PurchaseResponse::Completed { .. }));

        let payment = svc.payments.find_one_by_key("0xfresh").await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Verified);
        assert_eq!(svc.stats().verified_payments, 1);
    }

    #[tokio::test]
    async fn test_premium_unlock_and_start() {
        let svc = service();
        register(&svc, "0xaa").await;
        let wallet = || WalletRequest {
            wallet_address: Some("0xaa".into()),
        };

        let locked = svc.start_game("tetris", wallet()).await.unwrap_err();
        assert_eq!(locked.to_string(), "Premium game locked");

        let premium = |tx: &str| PurchasePremiumRequest {
            tx_hash: Some(tx.into()),
            wallet_address: Some("0xaa".into()),
            game_id: Some("tetris".into()),
        };
        svc.purchase_premium_game(premium("0x1")).await.unwrap();
        let again = svc.purchase_premium_game(premium("0x2")).await.unwrap();
        assert!(matches!(again, PurchaseResponse::Unchanged { .. }));

        let started = svc.start_game("tetris", wallet()).await.unwrap();
        assert!(started.success);

        let unknown = svc.start_game("chess", wallet()).await.unwrap_err();
        assert!(matches!(unknown, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_consume_life_until_empty() {
        let svc = service();
        register(&svc, "0xaa").await;
        let req = || WalletRequest {
            wallet_address: Some("0xaa".into()),
        };

        for expected in (0..5).rev() {
            let resp = svc.consume_life(req()).await.unwrap();
            assert_eq!(resp.hearts_balance, expected);
            assert!(resp.next_free_refill_at.is_some());
        }

        let err = svc.consume_life(req()).await.unwrap_err();
        assert_eq!(err.to_string(), "No lives remaining");

        let lenient = svc.consume_heart(req()).await.unwrap();
        assert_eq!(lenient.hearts_balance, 0);

        let err = svc
            .start_game("snake", req())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No hearts remaining");
    }

    #[tokio::test]
    async fn test_powerup_consumption() {
        let svc = service();
        register(&svc, "0xaa").await;
        let consume = || ConsumePowerupRequest {
            wallet_address: Some("0xaa".into()),
            powerup_type: Some("sonar".into()),
        };

        let err = svc.consume_powerup(consume()).await.unwrap_err();
        assert_eq!(err.to_string(), "Insufficient powerup balance");

        svc.purchase_powerup(PurchasePowerupRequest {
            tx_hash: Some("0xp".into()),
            wallet_address: Some("0xaa".into()),
            powerup_type: Some("sonar".into()),
            quantity: Some(2),
        })
        .await
        .unwrap();

        let user = svc.consume_powerup(consume()).await.unwrap();
        assert_eq!(user.powerup_balances.sonar, 1);
    }

    #[tokio::test]
    async fn test_scores_and_leaderboards() {
        let svc = service();
        let ann = register(&svc, "0xaa").await;
        register(&svc, "0xbb").await;

        let save = |wallet: &str, score: i64| SaveScoreRequest {
            wallet_address: Some(wallet.into()),
            game_id: Some("snake".into()),
            score: Some(score),
        };
        svc.save_score(save("0xaa", 30)).await.unwrap();
        let resp = svc.save_score(save("0xaa", 10)).await.unwrap();
        assert_eq!(resp.high_score, 30);
        assert_eq!(resp.play_count, 2);
        svc.save_score(save("0xbb", 50)).await.unwrap();

        let rows = svc.leaderboard(Some("snake".into())).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].score, RankScore::Points(50));

        // nobody has spent anything yet
        assert!(svc.leaderboard(None).await.unwrap().is_empty());
        svc.purchase_hearts(hearts_order("0xt", "0xaa", 1)).await.unwrap();
        let global = svc.leaderboard(Some("global".into())).await.unwrap();
        assert_eq!(global[0].user_id, ann.id);
        assert_eq!(global[0].score, RankScore::Currency("0.02".into()));
    }

    #[tokio::test]
    async fn test_complete_game_updates_cache() {
        let svc = service();
        register(&svc, "0xaa").await;
        let session = svc
            .start_game(
                "snake",
                WalletRequest {
                    wallet_address: Some("0xaa".into()),
                },
            )
            .await
            .unwrap();

        let complete = |session_id: Option<Uuid>, score: i64| CompleteGameRequest {
            wallet_address: Some("0xaa".into()),
            session_id,
            score: Some(score),
            time_spent: 42,
        };
        let resp = svc
            .complete_game("snake", complete(Some(session.session_id), 120))
            .await
            .unwrap();
        assert!(resp.new_high_score);

        let resp = svc.complete_game("snake", complete(None, 80)).await.unwrap();
        assert!(!resp.new_high_score);

        let entries = svc.cached_leaderboard("snake").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].score, 120);

        let missing = svc
            .complete_game("snake", complete(Some(Uuid::new_v4()), 1))
            .await
            .unwrap_err();
        assert!(matches!(missing, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_play_time_saturates() {
        let svc = service();
        let user = register(&svc, "0xaa").await;

        for _ in 0..2 {
            svc.complete_game(
                "snake",
                CompleteGameRequest {
                    wallet_address: Some("0xaa".into()),
                    session_id: None,
                    score: Some(10),
                    time_spent: u64::MAX,
                },
            )
            .await
            .unwrap();
        }

        let stats = svc
            .stats
            .get(&GameStats::document_id(user.id, "snake"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.total_played, 2);
        assert_eq!(stats.total_play_time, u64::MAX);
    }
}
