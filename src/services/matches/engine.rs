//! Match state machine
//!
//! Pure transitions over [`Match`] records: `waiting -> active -> completed`
//! and `waiting -> cancelled`. Nothing here touches storage; every rejected
//! transition leaves the match untouched.

use super::types::*;
use crate::error::{Error, Result};
use crate::gaming::{BoardState, Placement, Seat, COLS};
use crate::services::economy::{User, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Result of an accepted move
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    pub placement: Placement,
    pub completed: bool,
    pub winner: Option<UserId>,
}

pub struct NewMatch<'a> {
    pub game_type: GameType,
    pub stake_amount: Decimal,
    pub creator: &'a User,
    pub tx_hash: Option<String>,
    pub on_chain_match_id: Option<u64>,
}

fn player(user: &User) -> MatchPlayer {
    MatchPlayer {
        user_id: user.id,
        wallet_address: user.wallet_address.clone(),
        status: PlayerStatus::Ready,
        score: None,
    }
}

/// A waiting match with the creator seated as player 1
pub fn create(params: NewMatch<'_>, now: DateTime<Utc>) -> Result<Match> {
    if params.stake_amount < Decimal::ZERO {
        return Err(Error::Validation("Stake amount cannot be negative".to_string()));
    }

    Ok(Match {
        id: MatchId::new(),
        game_type: params.game_type,
        players: vec![player(params.creator)],
        stake_amount: params.stake_amount,
        status: MatchStatus::Waiting,
        winner_id: None,
        game_state: None,
        on_chain_match_id: params.on_chain_match_id,
        tx_hash: params.tx_hash,
        start_time: None,
        end_time: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn ensure_joinable(m: &Match) -> Result<()> {
    if m.status != MatchStatus::Waiting || m.players.len() >= 2 {
        return Err(Error::InvalidState("Match not available".to_string()));
    }
    Ok(())
}

/// Seat the second player and start the game
pub fn join(m: &mut Match, joiner: &User, now: DateTime<Utc>) -> Result<()> {
    ensure_joinable(m)?;
    if m.is_player(joiner.id) {
        return Err(Error::InvalidState("Cannot play against yourself".to_string()));
    }

    m.players.push(player(joiner));
    for p in &mut m.players {
        p.status = PlayerStatus::Playing;
    }
    m.status = MatchStatus::Active;
    m.start_time = Some(now);
    if m.game_type.supports_moves() {
        m.game_state = Some(BoardState::default());
    }
    m.updated_at = now;
    Ok(())
}

/// Checks that come before any per-player validation
pub fn ensure_movable(m: &Match) -> Result<()> {
    if m.status != MatchStatus::Active {
        return Err(Error::InvalidState("Match not active".to_string()));
    }
    if !m.game_type.supports_moves() {
        return Err(Error::InvalidState(
            "Moves are not supported for this game type".to_string(),
        ));
    }
    Ok(())
}

/// Validate and apply a Connect Four drop
pub fn apply_move(m: &mut Match, actor: UserId, column: i64, now: DateTime<Utc>) -> Result<MoveOutcome> {
    ensure_movable(m)?;

    let seat = m
        .seat_of(actor)
        .and_then(Seat::from_index)
        .ok_or(Error::NotAPlayer)?;

    let mut state = m.game_state.clone().unwrap_or_default();
    if seat != state.current_player {
        return Err(Error::OutOfTurn);
    }

    let column = usize::try_from(column)
        .ok()
        .filter(|c| *c < COLS)
        .ok_or(Error::InvalidColumn)?;
    let placement = state.board.drop_piece(column, seat)?;

    let outcome = if state.board.is_winning_placement(&placement) {
        MoveOutcome {
            placement,
            completed: true,
            winner: Some(actor),
        }
    } else if state.board.is_full() {
        MoveOutcome {
            placement,
            completed: true,
            winner: None,
        }
    } else {
        state.current_player = seat.other();
        MoveOutcome {
            placement,
            completed: false,
            winner: None,
        }
    };

    m.game_state = Some(state);
    if outcome.completed {
        finish(m, outcome.winner, now);
    }
    m.updated_at = now;
    Ok(outcome)
}

fn finish(m: &mut Match, winner: Option<UserId>, now: DateTime<Utc>) {
    m.status = MatchStatus::Completed;
    m.winner_id = winner;
    m.end_time = Some(now);
    m.updated_at = now;
}

/// Force completion with a named winner. Returns false when the match was
/// already completed and nothing changed.
pub fn resolve(m: &mut Match, winner: UserId, now: DateTime<Utc>) -> Result<bool> {
    match m.status {
        MatchStatus::Completed => return Ok(false),
        MatchStatus::Cancelled => {
            return Err(Error::InvalidState(
                "Cancelled matches cannot be resolved".to_string(),
            ))
        }
        MatchStatus::Waiting | MatchStatus::Active => {}
    }

    if !m.is_player(winner) {
        return Err(Error::Validation("Winner must be a match player".to_string()));
    }

    finish(m, Some(winner), now);
    Ok(true)
}

/// Withdraw a match nobody has joined yet
pub fn cancel(m: &mut Match, actor: UserId, now: DateTime<Utc>) -> Result<()> {
    if m.creator() != Some(actor) {
        return Err(Error::Forbidden(
            "Only the match creator can cancel".to_string(),
        ));
    }
    if m.status != MatchStatus::Waiting {
        return Err(Error::InvalidState(
            "Only waiting matches can be cancelled".to_string(),
        ));
    }

    m.status = MatchStatus::Cancelled;
    m.end_time = Some(now);
    m.updated_at = now;
    Ok(())
}

/// Mark placed bets won, lost, or refunded on a draw. Returns the bets that
/// changed.
pub fn settle_bets(bets: Vec<Bet>, winner: Option<UserId>) -> Vec<Bet> {
    bets.into_iter()
        .filter(|b| b.status == BetStatus::Placed)
        .map(|mut bet| {
            bet.status = match winner {
                Some(w) if bet.predicted_winner_id == w => BetStatus::Won,
                Some(_) => BetStatus::Lost,
                None => BetStatus::Refunded,
            };
            bet
        })
        .collect()
}
