//! Computer opponents for the single-player board games
//!
//! Three tiers per game: a random legal move, a one-ply win/block lookahead,
//! and either exhaustive minimax (Tic-Tac-Toe) or a center-column preference
//! (Connect Four).

use super::connect_four::{Board, Seat, COLS};
use super::tic_tac_toe::{Grid, Mark};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// Pick a cell for `ai` on a Tic-Tac-Toe grid, or `None` if the grid is full
pub fn tic_tac_toe_move<R: Rng + ?Sized>(
    grid: &Grid,
    ai: Mark,
    difficulty: Difficulty,
    rng: &mut R,
) -> Option<usize> {
    let empty = grid.empty_cells();
    if empty.is_empty() {
        return None;
    }

    match difficulty {
        Difficulty::Easy => empty.choose(rng).copied(),
        Difficulty::Medium => completing_cell(grid, &empty, ai)
            .or_else(|| completing_cell(grid, &empty, ai.other()))
            .or_else(|| empty.choose(rng).copied()),
        Difficulty::Hard => {
            let mut scratch = *grid;
            let mut best: Option<(i32, usize)> = None;
            for &cell in &empty {
                scratch.place(cell, ai);
                let score = minimax(&mut scratch, ai, 0, false);
                scratch.clear(cell);
                if best.map_or(true, |(best_score, _)| score > best_score) {
                    best = Some((score, cell));
                }
            }
            best.map(|(_, cell)| cell)
        }
    }
}

/// First empty cell that wins immediately for `mark`
fn completing_cell(grid: &Grid, empty: &[usize], mark: Mark) -> Option<usize> {
    empty.iter().copied().find(|&cell| {
        let mut test = *grid;
        test.place(cell, mark);
        test.winner() == Some(mark)
    })
}

fn minimax(grid: &mut Grid, ai: Mark, depth: i32, maximizing: bool) -> i32 {
    match grid.winner() {
        Some(mark) if mark == ai => return 10 - depth,
        Some(_) => return depth - 10,
        None if grid.is_full() => return 0,
        None => {}
    }

    let mover = if maximizing { ai } else { ai.other() };
    let mut scores = Vec::new();
    for cell in grid.empty_cells() {
        grid.place(cell, mover);
        scores.push(minimax(grid, ai, depth + 1, !maximizing));
        grid.clear(cell);
    }

    if maximizing {
        scores.into_iter().max().unwrap_or(0)
    } else {
        scores.into_iter().min().unwrap_or(0)
    }
}

/// Pick a column for `ai` on a Connect Four board, or `None` if the board is full
pub fn connect_four_move<R: Rng + ?Sized>(
    board: &Board,
    ai: Seat,
    difficulty: Difficulty,
    rng: &mut R,
) -> Option<usize> {
    let open = board.open_columns();
    if open.is_empty() {
        return None;
    }

    if difficulty == Difficulty::Easy {
        return open.choose(rng).copied();
    }

    if let Some(column) = winning_column(board, &open, ai).or_else(|| winning_column(board, &open, ai.other())) {
        return Some(column);
    }

    match difficulty {
        Difficulty::Hard => {
            let center: Vec<usize> = open
                .iter()
                .copied()
                .filter(|&c| (2..=COLS - 3).contains(&c))
                .collect();
            center.choose(rng).or_else(|| open.choose(rng)).copied()
        }
        _ => open.choose(rng).copied(),
    }
}

/// First open column where dropping a `seat` piece wins
fn winning_column(board: &Board, open: &[usize], seat: Seat) -> Option<usize> {
    open.iter().copied().find(|&column| {
        let mut test = board.clone();
        test.drop_piece(column, seat)
            .map(|placement| test.is_winning_placement(&placement))
            .unwrap_or(false)
    })
}
