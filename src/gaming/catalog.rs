//! Game catalog: which single-player games exist and which are premium

/// All playable game ids
pub const GAMES: [&str; 16] = [
    "2048",
    "breakout",
    "connect-four",
    "f1-racing",
    "flappy-bird",
    "memory",
    "mine-hunter",
    "minesweeper",
    "simon-says",
    "snake",
    "solitaire",
    "sudoku",
    "tetris",
    "tic-tac-toe",
    "whack-a-mole",
    "word-search",
];

/// Games that must be unlocked with a purchase before starting
pub const PREMIUM_GAMES: [&str; 5] = ["tetris", "f1-racing", "breakout", "solitaire", "connect-four"];

pub fn is_known_game(game_id: &str) -> bool {
    GAMES.contains(&game_id)
}

pub fn is_premium(game_id: &str) -> bool {
    PREMIUM_GAMES.contains(&game_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_premium_games_are_known() {
        for game in PREMIUM_GAMES {
            assert!(is_known_game(game), "{} missing from catalog", game);
        }
        assert!(!is_premium("snake"));
        assert!(!is_known_game("chess"));
    }
}
