//! Stateless computer-opponent endpoints
//!
//! The client sends the current board and the seat the computer plays; the
//! response carries the suggested cell (Tic-Tac-Toe, 0..9 row-major) or
//! column (Connect Four, 0..7).

use crate::api::{ApiJson, AppState};
use crate::error::{Error, Result};
use crate::gaming::{connect_four_move, tic_tac_toe_move, Board, Difficulty, Grid, Mark, Seat};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicTacToeMoveRequest {
    pub board: Grid,
    pub player: Mark,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectFourMoveRequest {
    pub board: Board,
    pub player: Seat,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MoveSuggestion {
    #[serde(rename = "move")]
    pub position: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/ai/tic-tac-toe/move", post(tic_tac_toe))
        .route("/api/ai/connect-four/move", post(connect_four))
}

pub fn suggest_tic_tac_toe(req: &TicTacToeMoveRequest) -> Result<MoveSuggestion> {
    if req.board.winner().is_some() {
        return Err(Error::InvalidState("Game is already over".to_string()));
    }
    tic_tac_toe_move(&req.board, req.player, req.difficulty, &mut rand::thread_rng())
        .map(|position| MoveSuggestion { position })
        .ok_or_else(|| Error::InvalidState("Board is full".to_string()))
}

pub fn suggest_connect_four(req: &ConnectFourMoveRequest) -> Result<MoveSuggestion> {
    if req.board.winner().is_some() {
        return Err(Error::InvalidState("Game is already over".to_string()));
    }
    connect_four_move(&req.board, req.player, req.difficulty, &mut rand::thread_rng())
        .map(|position| MoveSuggestion { position })
        .ok_or_else(|| Error::InvalidState("Board is full".to_string()))
}

async fn tic_tac_toe(ApiJson(req): ApiJson<TicTacToeMoveRequest>) -> Result<Json<MoveSuggestion>> {
    let suggestion = suggest_tic_tac_toe(&req)?;
    tracing::debug!(difficulty = ?req.difficulty, cell = suggestion.position, "tic-tac-toe move suggested");
    Ok(Json(suggestion))
}

async fn connect_four(ApiJson(req): ApiJson<ConnectFourMoveRequest>) -> Result<Json<MoveSuggestion>> {
    let suggestion = suggest_connect_four(&req)?;
    tracing::debug!(difficulty = ?req.difficulty, column = suggestion.position, "connect-four move suggested");
    Ok(Json(suggestion))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hard_tic_tac_toe_takes_the_win() {
        let req: TicTacToeMoveRequest = serde_json::from_value(json!({
            "board": ["O", "O", null, "X", "X", null, null, null, null],
            "player": "O",
            "difficulty": "hard"
        }))
        .unwrap();
        assert_eq!(suggest_tic_tac_toe(&req).unwrap().position, 2);
    }

    #[test]
    fn test_medium_connect_four_blocks() {
        let mut rows = vec![vec![0u8; 7]; 6];
        rows[5][0] = 1;
        rows[5][1] = 1;
        rows[5][2] = 1;
        rows[5][6] = 2;
        rows[4][6] = 2;
        let req: ConnectFourMoveRequest = serde_json::from_value(json!({
            "board": rows,
            "player": 2,
            "difficulty": "medium"
        }))
        .unwrap();
        // seat two has no immediate win, so it must block column 3
        assert_eq!(suggest_connect_four(&req).unwrap().position, 3);
    }

    #[test]
    fn test_decided_connect_four_is_rejected() {
        let mut rows = vec![vec![0u8; 7]; 6];
        for column in 0..4 {
            rows[5][column] = 1;
        }
        rows[4][0] = 2;
        rows[4][1] = 2;
        rows[4][2] = 2;
        let req: ConnectFourMoveRequest = serde_json::from_value(json!({
            "board": rows,
            "player": 2,
            "difficulty": "easy"
        }))
        .unwrap();
        let err = suggest_connect_four(&req).unwrap_err();
        assert_eq!(err.to_string(), "Game is already over");
    }

    #[test]
    fn test_full_board_is_rejected() {
        let req: TicTacToeMoveRequest = serde_json::from_value(json!({
            "board": ["X", "O", "X", "X", "O", "O", "O", "X", "X"],
            "player": "O"
        }))
        .unwrap();
        assert!(matches!(suggest_tic_tac_toe(&req), Err(Error::InvalidState(_))));
        assert_eq!(serde_json::to_value(MoveSuggestion { position: 4 }).unwrap(), json!({ "move": 4 }));
    }
}
