//! Connect Four board rules
//!
//! A 6x7 grid with gravity-drop placement. Row 0 is the top row, so a piece
//! dropped into a column lands on the highest-numbered empty row. Win
//! detection is incremental: only lines through the just-placed cell are
//! scanned.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const ROWS: usize = 6;
pub const COLS: usize = 7;

/// Pieces in a row needed to win
pub const CONNECT: usize = 4;

/// The four line directions as (row delta, column delta)
const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (-1, 1)];

/// Seat at the table. Seat one always moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Seat {
    One,
    Two,
}

impl Seat {
    pub fn other(self) -> Seat {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }

    /// Seat for a zero-based index into a match's player list
    pub fn from_index(index: usize) -> Option<Seat> {
        match index {
            0 => Some(Seat::One),
            1 => Some(Seat::Two),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Seat::One => 0,
            Seat::Two => 1,
        }
    }
}

impl From<Seat> for u8 {
    fn from(seat: Seat) -> u8 {
        match seat {
            Seat::One => 1,
            Seat::Two => 2,
        }
    }
}

impl TryFrom<u8> for Seat {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Seat::One),
            2 => Ok(Seat::Two),
            other => Err(format!("invalid seat {}", other)),
        }
    }
}

/// A single board cell, stored as 0 (empty), 1 or 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Cell {
    #[default]
    Empty,
    Taken(Seat),
}

impl From<Cell> for u8 {
    fn from(cell: Cell) -> u8 {
        match cell {
            Cell::Empty => 0,
            Cell::Taken(seat) => seat.into(),
        }
    }
}

impl TryFrom<u8> for Cell {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Cell::Empty),
            other => Seat::try_from(other).map(Cell::Taken),
        }
    }
}

/// Result of dropping a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub row: usize,
    pub column: usize,
    pub seat: Seat,
}

/// Connect Four grid
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [[Cell; COLS]; ROWS],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, row: usize, column: usize) -> Cell {
        self.cells[row][column]
    }

    /// Lowest empty row in `column`, or `None` when the column is full
    pub fn landing_row(&self, column: usize) -> Option<usize> {
        if column >= COLS {
            return None;
        }
        (0..ROWS).rev().find(|&row| self.cells[row][column] == Cell::Empty)
    }

    pub fn is_column_full(&self, column: usize) -> bool {
        self.landing_row(column).is_none()
    }

    pub fn is_full(&self) -> bool {
        (0..COLS).all(|column| self.is_column_full(column))
    }

    /// Columns that can still take a piece, left to right
    pub fn open_columns(&self) -> Vec<usize> {
        (0..COLS).filter(|&c| !self.is_column_full(c)).collect()
    }

    /// Drop a piece for `seat` into `column`.
    ///
    /// The board is left untouched when the column is out of range or full.
    pub fn drop_piece(&mut self, column: usize, seat: Seat) -> Result<Placement> {
        if column >= COLS {
            return Err(Error::InvalidColumn);
        }
        let row = self.landing_row(column).ok_or(Error::ColumnFull)?;
        self.cells[row][column] = Cell::Taken(seat);
        Ok(Placement { row, column, seat })
    }

    /// True when the piece at `placement` completes a line of four or more
    pub fn is_winning_placement(&self, placement: &Placement) -> bool {
        let target = Cell::Taken(placement.seat);
        if self.get(placement.row, placement.column) != target {
            return false;
        }

        DIRECTIONS.iter().any(|&(dr, dc)| {
            let run = 1
                + self.count_run(placement.row, placement.column, dr, dc, target)
                + self.count_run(placement.row, placement.column, -dr, -dc, target);
            run >= CONNECT
        })
    }

    /// The seat owning any line of four on the board
    pub fn winner(&self) -> Option<Seat> {
        (0..ROWS)
            .flat_map(|row| (0..COLS).map(move |column| (row, column)))
            .find_map(|(row, column)| match self.cells[row][column] {
                Cell::Taken(seat) if self.is_winning_placement(&Placement { row, column, seat }) => {
                    Some(seat)
                }
                _ => None,
            })
    }

    /// Contiguous `target` cells starting next to (row, column) in one direction
    fn count_run(&self, row: usize, column: usize, dr: isize, dc: isize, target: Cell) -> usize {
        let mut count = 0;
        let mut r = row as isize + dr;
        let mut c = column as isize + dc;
        while r >= 0 && r < ROWS as isize && c >= 0 && c < COLS as isize {
            if self.cells[r as usize][c as usize] != target {
                break;
            }
            count += 1;
            r += dr;
            c += dc;
        }
        count
    }
}

/// Persisted match board: the grid plus whose turn it is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
    pub board: Board,
    pub current_player: Seat,
}

impl Default for BoardState {
    fn default() -> Self {
        Self {
            board: Board::new(),
            current_player: Seat::One,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn play(board: &mut Board, moves: &[(usize, Seat)]) -> Placement {
        let mut last = None;
        for &(column, seat) in moves {
            last = Some(board.drop_piece(column, seat).unwrap());
        }
        last.unwrap()
    }

    #[test]
    fn test_gravity_drop() {
        let mut board = Board::new();
        let first = board.drop_piece(3, Seat::One).unwrap();
        assert_eq!(first.row, ROWS - 1);
        let second = board.drop_piece(3, Seat::Two).unwrap();
        assert_eq!(second.row, ROWS - 2);
        assert_eq!(board.get(ROWS - 1, 3), Cell::Taken(Seat::One));
    }

    #[test]
    fn test_full_column_rejected_without_mutation() {
        let mut board = Board::new();
        for i in 0..ROWS {
            let seat = if i % 2 == 0 { Seat::One } else { Seat::Two };
            board.drop_piece(0, seat).unwrap();
        }
        let before = board.clone();
        assert!(matches!(board.drop_piece(0, Seat::One), Err(Error::ColumnFull)));
        assert_eq!(board, before);
        assert!(matches!(board.drop_piece(COLS, Seat::One), Err(Error::InvalidColumn)));
    }

    #[test]
    fn test_vertical_win() {
        let mut board = Board::new();
        let last = play(&mut board, &[(3, Seat::One), (3, Seat::One), (3, Seat::One)]);
        assert!(!board.is_winning_placement(&last));
        let last = board.drop_piece(3, Seat::One).unwrap();
        assert!(board.is_winning_placement(&last));
    }

    #[test]
    fn test_winner_scan() {
        let mut board = Board::new();
        play(&mut board, &[(0, Seat::One), (1, Seat::Two), (2, Seat::Two), (3, Seat::Two)]);
        assert_eq!(board.winner(), None);
        board.drop_piece(4, Seat::Two).unwrap();
        assert_eq!(board.winner(), Some(Seat::Two));
    }

    #[test]
    fn test_horizontal_win_from_middle() {
        let mut board = Board::new();
        play(&mut board, &[(0, Seat::Two), (1, Seat::Two), (3, Seat::Two)]);
        let last = board.drop_piece(2, Seat::Two).unwrap();
        assert!(board.is_winning_placement(&last));
    }

    #[test]
    fn test_diagonal_wins() {
        // Rising diagonal: (5,0) (4,1) (3,2) (2,3)
        let mut board = Board::new();
        play(
            &mut board,
            &[
                (1, Seat::Two),
                (2, Seat::Two),
                (2, Seat::Two),
                (3, Seat::Two),
                (3, Seat::Two),
                (3, Seat::Two),
                (0, Seat::One),
                (1, Seat::One),
                (2, Seat::One),
            ],
        );
        let last = board.drop_piece(3, Seat::One).unwrap();
        assert!(board.is_winning_placement(&last));

        // Falling diagonal: (2,3) (3,4) (4,5) (5,6)
        let mut board = Board::new();
        play(
            &mut board,
            &[
                (5, Seat::Two),
                (4, Seat::Two),
                (4, Seat::Two),
                (3, Seat::Two),
                (3, Seat::Two),
                (3, Seat::Two),
                (6, Seat::One),
                (5, Seat::One),
                (4, Seat::One),
            ],
        );
        let last = board.drop_piece(3, Seat::One).unwrap();
        assert!(board.is_winning_placement(&last));
    }

    #[test]
    fn test_three_in_a_row_is_not_a_win() {
        let mut board = Board::new();
        let last = play(&mut board, &[(0, Seat::One), (1, Seat::One), (2, Seat::One)]);
        assert!(!board.is_winning_placement(&last));
        let last = board.drop_piece(4, Seat::One).unwrap();
        assert!(!board.is_winning_placement(&last));
    }

    #[test]
    fn test_board_state_json_shape() {
        let mut state = BoardState::default();
        state.board.drop_piece(6, Seat::Two).unwrap();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["currentPlayer"], 1);
        assert_eq!(json["board"][5][6], 2);
        assert_eq!(json["board"][0][0], 0);

        let back: BoardState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    proptest! {
        #[test]
        fn prop_pieces_stack_without_gaps(columns in proptest::collection::vec(0usize..COLS, 0..60)) {
            let mut board = Board::new();
            let mut seat = Seat::One;
            for column in columns {
                if board.drop_piece(column, seat).is_ok() {
                    seat = seat.other();
                }
            }
            for column in 0..COLS {
                let mut seen_piece = false;
                for row in 0..ROWS {
                    let taken = board.get(row, column) != Cell::Empty;
                    prop_assert!(!(seen_piece && !taken), "gap under a piece in column {}", column);
                    seen_piece |= taken;
                }
            }
        }
    }
}
