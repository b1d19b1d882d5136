//! Board games and computer opponents
//!
//! - `connect_four`: 6x7 gravity board with incremental win detection, used
//!   by wagering matches and the single-player opponent
//! - `tic_tac_toe`: 3x3 grid
//! - `ai`: difficulty-tiered move selection for both boards
//! - `catalog`: the single-player game list and premium set

pub mod ai;
pub mod catalog;
pub mod connect_four;
pub mod tic_tac_toe;

pub use ai::{connect_four_move, tic_tac_toe_move, Difficulty};
pub use connect_four::{Board, BoardState, Cell, Placement, Seat, COLS, ROWS};
pub use tic_tac_toe::{Grid, Mark};
