//! Match Service Implementation
//!
//! Persists matches and bets, serializes work on each match through a
//! per-match lock, broadcasts match events and runs settlement when a match
//! completes.

use super::engine::{self, NewMatch};
use super::types::*;
use crate::config::MatchConfig;
use crate::database::{DocumentStore, KeyedLocks, Repository};
use crate::error::{Error, Result};
use crate::services::economy::{User, UserId};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Payout hook invoked once a match completes
#[async_trait]
pub trait Settlement: Send + Sync {
    async fn settle(&self, completed: &Match) -> Result<()>;
}

/// Records the payout that the escrow contract is expected to perform
#[derive(Debug, Default)]
pub struct LogSettlement;

#[async_trait]
impl Settlement for LogSettlement {
    async fn settle(&self, completed: &Match) -> Result<()> {
        let winner_wallet = completed
            .winner_id
            .and_then(|w| completed.players.iter().find(|p| p.user_id == w))
            .map(|p| p.wallet_address.as_str());

        match winner_wallet {
            Some(wallet) => tracing::info!(
                match_id = %completed.id,
                on_chain_match_id = ?completed.on_chain_match_id,
                stake = %completed.stake_amount,
                winner = wallet,
                "match settled: pay out to winner"
            ),
            None => tracing::info!(
                match_id = %completed.id,
                on_chain_match_id = ?completed.on_chain_match_id,
                stake = %completed.stake_amount,
                "match settled: draw, refund stakes"
            ),
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MatchCounters {
    total_matches: AtomicU64,
    moves_applied: AtomicU64,
    completed_matches: AtomicU64,
    cancelled_matches: AtomicU64,
    bets_placed: AtomicU64,
}

/// Match Service
pub struct MatchService {
    config: MatchConfig,
    matches: Repository<Match>,
    bets: Repository<Bet>,
    users: Repository<User>,
    locks: KeyedLocks,
    settlement: Arc<dyn Settlement>,
    event_tx: broadcast::Sender<MatchEvent>,
    counters: MatchCounters,
}

fn parse_id<T: std::str::FromStr<Err = Error>>(value: Option<String>) -> Result<T> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(Error::missing_fields)?
        .trim()
        .parse()
}

impl MatchService {
    pub fn new(config: MatchConfig, store: Arc<dyn DocumentStore>, settlement: Arc<dyn Settlement>) -> Self {
        let (event_tx, _rx) = broadcast::channel(config.event_buffer.max(1));

        Self {
            config,
            matches: Repository::new(store.clone()),
            bets: Repository::new(store.clone()),
            users: Repository::new(store),
            locks: KeyedLocks::new(),
            settlement,
            event_tx,
            counters: MatchCounters::default(),
        }
    }

    /// Subscribe to match events
    pub fn subscribe_events(&self) -> broadcast::Receiver<MatchEvent> {
        self.event_tx.subscribe()
    }

    pub fn stats(&self) -> MatchStats {
        MatchStats {
            total_matches: self.counters.total_matches.load(Ordering::Relaxed),
            moves_applied: self.counters.moves_applied.load(Ordering::Relaxed),
            completed_matches: self.counters.completed_matches.load(Ordering::Relaxed),
            cancelled_matches: self.counters.cancelled_matches.load(Ordering::Relaxed),
            bets_placed: self.counters.bets_placed.load(Ordering::Relaxed),
        }
    }

    fn publish(&self, event: MatchEvent) {
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }

    async fn load(&self, id: MatchId) -> Result<Match> {
        self.matches
            .get(&id.to_string())
            .await?
            .ok_or_else(|| Error::not_found("Match"))
    }

    async fn load_user(&self, id: UserId) -> Result<User> {
        self.users
            .get(&id.to_string())
            .await?
            .ok_or_else(|| Error::not_found("User"))
    }

    pub async fn create_match(&self, req: CreateMatchRequest) -> Result<Match> {
        let creator_id: UserId = parse_id(req.user_id)?;
        let game_type: GameType = req.game_type.ok_or_else(Error::missing_fields)?.parse()?;
        let stake_amount = req.stake_amount.ok_or_else(Error::missing_fields)?;

        let creator = self.load_user(creator_id).await?;
        let m = engine::create(
            NewMatch {
                game_type,
                stake_amount,
                creator: &creator,
                tx_hash: req.tx_hash,
                on_chain_match_id: req.on_chain_match_id,
            },
            Utc::now(),
        )?;
        self.matches.insert(&m).await?;

        self.counters.total_matches.fetch_add(1, Ordering::Relaxed);
        tracing::info!(match_id = %m.id, creator = %creator.id, stake = %m.stake_amount, "match created");
        self.publish(MatchEvent::MatchCreated {
            match_id: m.id,
            creator: creator.id,
        });
        Ok(m)
    }

    pub async fn join_match(&self, req: JoinMatchRequest) -> Result<Match> {
        let match_id: MatchId = parse_id(req.match_id)?;
        let joiner_id: UserId = parse_id(req.user_id)?;

        let _guard = self.locks.lock(&match_id.to_string()).await;
        let mut m = self.load(match_id).await?;
        engine::ensure_joinable(&m)?;
        let joiner = self.load_user(joiner_id).await?;

        engine::join(&mut m, &joiner, Utc::now())?;
        self.matches.save(&m).await?;

        tracing::info!(match_id = %m.id, player = %joiner.id, "player joined match");
        self.publish(MatchEvent::PlayerJoined {
            match_id: m.id,
            player: joiner.id,
        });
        Ok(m)
    }

    pub async fn get_match(&self, id: &str) -> Result<Match> {
        self.load(id.parse()?).await
    }

    /// Matches with the given status, or waiting and active ones; newest first
    pub async fn list_matches(&self, status: Option<String>) -> Result<Vec<Match>> {
        let statuses = match status.filter(|s| !s.is_empty()) {
            Some(s) => vec![s.parse::<MatchStatus>()?],
            None => vec![MatchStatus::Waiting, MatchStatus::Active],
        };

        let mut found = Vec::new();
        for status in statuses {
            found.extend(self.matches.find_by_key(status.as_str()).await?);
        }
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    pub async fn make_move(&self, id: &str, req: MoveRequest) -> Result<Match> {
        let match_id: MatchId = id.parse()?;

        let _guard = self.locks.lock(&match_id.to_string()).await;
        let mut m = self.load(match_id).await?;
        engine::ensure_movable(&m)?;

        let actor = req
            .user_id
            .and_then(|u| u.trim().parse::<UserId>().ok())
            .ok_or(Error::NotAPlayer)?;
        let column = req.column.ok_or(Error::InvalidColumn)?;

        let outcome = engine::apply_move(&mut m, actor, column, Utc::now())?;
        self.matches.save(&m).await?;

        self.counters.moves_applied.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            match_id = %m.id,
            player = %actor,
            row = outcome.placement.row,
            column = outcome.placement.column,
            "move applied"
        );
        self.publish(MatchEvent::MoveMade {
            match_id: m.id,
            player: actor,
            placement: outcome.placement,
        });

        if outcome.completed {
            self.on_completed(&m).await;
        }
        Ok(m)
    }

    pub async fn cancel_match(&self, id: &str, req: CancelMatchRequest) -> Result<Match> {
        let match_id: MatchId = id.parse()?;
        let actor = req
            .user_id
            .and_then(|u| u.trim().parse::<UserId>().ok())
            .ok_or_else(|| Error::Forbidden("Only the match creator can cancel".to_string()))?;

        let _guard = self.locks.lock(&match_id.to_string()).await;
        let mut m = self.load(match_id).await?;
        engine::cancel(&mut m, actor, Utc::now())?;
        self.matches.save(&m).await?;

        self.counters.cancelled_matches.fetch_add(1, Ordering::Relaxed);
        tracing::info!(match_id = %m.id, "match cancelled");
        self.publish(MatchEvent::MatchCancelled { match_id: m.id });
        Ok(m)
    }

    /// Force a winner. `presented_token` must equal the configured resolver
    /// token; with no token configured the operation is disabled.
    pub async fn resolve_match(
        &self,
        req: ResolveMatchRequest,
        presented_token: Option<&str>,
    ) -> Result<ResolveResponse> {
        match (self.config.resolver_token.as_deref(), presented_token) {
            (Some(expected), Some(given)) if expected == given => {}
            (None, _) => return Err(Error::Forbidden("Match resolution is disabled".to_string())),
            _ => return Err(Error::Forbidden("Invalid resolver token".to_string())),
        }

        let match_id: MatchId = parse_id(req.match_id)?;
        let winner: UserId = req
            .winner_id
            .filter(|w| !w.trim().is_empty())
            .ok_or_else(Error::missing_fields)?
            .trim()
            .parse()
            .map_err(|_| Error::Validation("Winner must be a match player".to_string()))?;

        let _guard = self.locks.lock(&match_id.to_string()).await;
        let mut m = self.load(match_id).await?;
        if !engine::resolve(&mut m, winner, Utc::now())? {
            return Ok(ResolveResponse {
                match_: m,
                message: Some("Match already resolved".to_string()),
            });
        }

        self.matches.save(&m).await?;
        tracing::info!(match_id = %m.id, winner = %winner, "match resolved");
        self.on_completed(&m).await;

        Ok(ResolveResponse {
            match_: m,
            message: None,
        })
    }

    pub async fn place_bet(&self, req: PlaceBetRequest) -> Result<Bet> {
        let match_id: MatchId = parse_id(req.match_id)?;
        let user_id: UserId = parse_id(req.user_id)?;
        let predicted: String = req
            .predicted_winner_id
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(Error::missing_fields)?;

        let _guard = self.locks.lock(&match_id.to_string()).await;
        let m = self.load(match_id).await?;
        let user = self.load_user(user_id).await?;
        let predicted_winner = match predicted.trim().parse::<UserId>() {
            Ok(id) => self.users.get(&id.to_string()).await?,
            Err(_) => None,
        }
        .ok_or_else(|| Error::not_found("Predicted winner"))?;

        let amount = req.amount.unwrap_or(Decimal::ZERO);
        if amount <= Decimal::ZERO {
            return Err(Error::Validation("Bet amount must be positive".to_string()));
        }
        let tx_hash = req
            .tx_hash
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(Error::missing_fields)?;
        if !m.is_player(predicted_winner.id) {
            return Err(Error::Validation(
                "Predicted winner is not a player in this match".to_string(),
            ));
        }
        if m.status.is_finished() {
            return Err(Error::InvalidState("Match already finished".to_string()));
        }

        let bet = Bet {
            id: Uuid::new_v4(),
            match_id: m.id,
            user_id: user.id,
            wallet_address: user.wallet_address.clone(),
            predicted_winner_id: predicted_winner.id,
            amount,
            status: BetStatus::Placed,
            tx_hash,
            created_at: Utc::now(),
        };
        self.bets.insert(&bet).await?;

        self.counters.bets_placed.fetch_add(1, Ordering::Relaxed);
        tracing::info!(match_id = %m.id, bet_id = %bet.id, amount = %bet.amount, "bet placed");
        self.publish(MatchEvent::BetPlaced {
            match_id: m.id,
            bet_id: bet.id,
        });
        Ok(bet)
    }

    pub async fn bets_for(&self, match_id: MatchId) -> Result<Vec<Bet>> {
        self.bets.find_by_key(&match_id.to_string()).await
    }

    /// Settle bets and run the payout hook. Failures are logged; the match
    /// stays completed.
    async fn on_completed(&self, m: &Match) {
        self.counters.completed_matches.fetch_add(1, Ordering::Relaxed);
        self.publish(MatchEvent::MatchCompleted {
            match_id: m.id,
            winner: m.winner_id,
        });

        match self.bets_for(m.id).await {
            Ok(bets) => {
                for bet in engine::settle_bets(bets, m.winner_id) {
                    if let Err(e) = self.bets.save(&bet).await {
                        tracing::error!(bet_id = %bet.id, error = %e, "failed to settle bet");
                    }
                }
            }
            Err(e) => tracing::error!(match_id = %m.id, error = %e, "failed to load bets"),
        }

        if let Err(e) = self.settlement.settle(m).await {
            tracing::error!(match_id = %m.id, error = %e, "settlement hook failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Environment};
    use crate::database::MemoryStore;
    use crate::services::economy::{HeartRefill, PowerupBalances};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    #[derive(Default)]
    struct RecordingSettlement {
        settled: Mutex<Vec<MatchId>>,
    }

    #[async_trait]
    impl Settlement for RecordingSettlement {
        async fn settle(&self, completed: &Match) -> Result<()> {
            self.settled.lock().push(completed.id);
            Err(Error::Network("escrow unreachable".to_string()))
        }
    }

    struct Fixture {
        service: MatchService,
        settlement: Arc<RecordingSettlement>,
        a: User,
        b: User,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let users: Repository<User> = Repository::new(store.clone());
        let now = Utc::now();
        let make = |name: &str| User {
            id: UserId::new(),
            wallet_address: format!("0x{}", name),
            username: name.to_string(),
            avatar: String::new(),
            hearts_balance: 5,
            premium_games_unlocked: vec![],
            powerup_balances: PowerupBalances::default(),
            total_spent: Decimal::ZERO,
            heart_refill: HeartRefill::default(),
            high_scores: Default::default(),
            play_counts: Default::default(),
            created_at: now,
            updated_at: now,
        };
        let (a, b) = (make("a"), make("b"));
        users.insert(&a).await.unwrap();
        users.insert(&b).await.unwrap();

        let settlement = Arc::new(RecordingSettlement::default());
        let config = Config::default_for_environment(Environment::Testing).matches;
        Fixture {
            service: MatchService::new(config, store, settlement.clone()),
            settlement,
            a,
            b,
        }
    }

    async fn started(f: &Fixture) -> Match {
        let m = f
            .service
            .create_match(CreateMatchRequest {
                user_id: Some(f.a.id.to_string()),
                game_type: Some("connect-four".into()),
                stake_amount: Some(dec!(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        f.service
            .join_match(JoinMatchRequest {
                match_id: Some(m.id.to_string()),
                user_id: Some(f.b.id.to_string()),
                tx_hash: None,
            })
            .await
            .unwrap()
    }

    fn mv(user: &User, column: i64) -> MoveRequest {
        MoveRequest {
            user_id: Some(user.id.to_string()),
            column: Some(column),
        }
    }

    #[tokio::test]
    async fn test_win_settles_bets_despite_hook_failure() {
        let f = fixture().await;
        let m = started(&f).await;
        let id = m.id.to_string();
        let mut events = f.service.subscribe_events();

        let bet = f
            .service
            .place_bet(PlaceBetRequest {
                match_id: Some(id.clone()),
                user_id: Some(f.b.id.to_string()),
                predicted_winner_id: Some(f.b.id.to_string()),
                amount: Some(dec!(0.5)),
                tx_hash: Some("0xbet".into()),
            })
            .await
            .unwrap();

        for _ in 0..3 {
            f.service.make_move(&id, mv(&f.a, 3)).await.unwrap();
            f.service.make_move(&id, mv(&f.b, 0)).await.unwrap();
        }
        let done = f.service.make_move(&id, mv(&f.a, 3)).await.unwrap();
        assert_eq!(done.status, MatchStatus::Completed);
        assert_eq!(done.winner_id, Some(f.a.id));

        let stored = f.service.get_match(&id).await.unwrap();
        assert_eq!(stored.status, MatchStatus::Completed);
        assert_eq!(f.settlement.settled.lock().as_slice(), &[m.id]);

        let bets = f.service.bets_for(m.id).await.unwrap();
        assert_eq!(bets[0].id, bet.id);
        assert_eq!(bets[0].status, BetStatus::Lost);

        let first = events.recv().await.unwrap();
        assert!(matches!(first, MatchEvent::BetPlaced { .. }));
    }

    #[tokio::test]
    async fn test_resolve_requires_token() {
        let f = fixture().await;
        let m = started(&f).await;
        let req = || ResolveMatchRequest {
            match_id: Some(m.id.to_string()),
            winner_id: Some(f.b.id.to_string()),
        };

        let err = f.service.resolve_match(req(), None).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        let err = f.service.resolve_match(req(), Some("wrong")).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let resolved = f
            .service
            .resolve_match(req(), Some("test-resolver-token"))
            .await
            .unwrap();
        assert_eq!(resolved.match_.winner_id, Some(f.b.id));
        assert!(resolved.message.is_none());

        let again = f
            .service
            .resolve_match(
                ResolveMatchRequest {
                    match_id: Some(m.id.to_string()),
                    winner_id: Some(f.a.id.to_string()),
                },
                Some("test-resolver-token"),
            )
            .await
            .unwrap();
        assert_eq!(again.match_.winner_id, Some(f.b.id));
        assert_eq!(again.message.as_deref(), Some("Match already resolved"));
    }

    #[tokio::test]
    async fn test_listing_defaults_to_open_matches() {
        let f = fixture().await;
        let first = started(&f).await;
        let waiting = f
            .service
            .create_match(CreateMatchRequest {
                user_id: Some(f.a.id.to_string()),
                game_type: Some("2048-duel".into()),
                stake_amount: Some(dec!(3)),
                ..Default::default()
            })
            .await
            .unwrap();
        let cancelled = f
            .service
            .create_match(CreateMatchRequest {
                user_id: Some(f.b.id.to_string()),
                game_type: Some("connect-four".into()),
                stake_amount: Some(dec!(0)),
                ..Default::default()
            })
            .await
            .unwrap();
        f.service
            .cancel_match(
                &cancelled.id.to_string(),
                CancelMatchRequest {
                    user_id: Some(f.b.id.to_string()),
                },
            )
            .await
            .unwrap();

        let open = f.service.list_matches(None).await.unwrap();
        let ids: Vec<_> = open.iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id) && ids.contains(&waiting.id));
        assert!(open[0].created_at >= open[1].created_at);

        let cancelled_only = f.service.list_matches(Some("cancelled".into())).await.unwrap();
        assert_eq!(cancelled_only.len(), 1);
        assert!(f.service.list_matches(Some("bogus".into())).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let f = fixture().await;
        let err = f.service.get_match("not-a-uuid").await.unwrap_err();
        assert_eq!(err.to_string(), "Match not found");

        let err = f
            .service
            .create_match(CreateMatchRequest {
                user_id: Some(UserId::new().to_string()),
                game_type: Some("connect-four".into()),
                stake_amount: Some(dec!(1)),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User not found");
    }
}
