//! # Connect 4
//!
//! Players take turns dropping pieces into columns, trying to get
//! `line_size` pieces in a row (horizontally, vertically, or diagonally).
//!
//! ## Rules
//! - Pieces fall to the lowest free cell of the column
//! - First player to complete a line wins
//! - The game is a draw if the board fills up with no winner
//!
//! Moves are column indices wrapped in [`Move`].

use crate::game::GameState;
use crate::node::{Color, Move};
use std::fmt;

/// Directions checked from the last piece: right, down, and both diagonals.
const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// The complete state of a Connect 4 game.
///
/// The board is row-major with row 0 at the top; 1 marks Black (first
/// player) pieces, -1 White pieces, 0 empty cells.
#[derive(Debug, Clone)]
pub struct Connect4State {
    board: Vec<i8>,
    to_play: Color,
    width: usize,
    height: usize,
    line_size: usize,
    /// Last move made, if any (row, column)
    last_move: Option<(usize, usize)>,
    winner: Option<Color>,
    pieces: usize,
}

fn piece(color: Color) -> i8 {
    match color {
        Color::Black => 1,
        Color::White => -1,
    }
}

impl fmt::Display for Connect4State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.height {
            for c in 0..self.width {
                let symbol = match self.board[r * self.width + c] {
                    1 => "X",
                    -1 => "O",
                    _ => ".",
                };
                write!(f, "{} ", symbol)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl Connect4State {
    /// Creates an empty board.
    pub fn new(width: usize, height: usize, line_size: usize) -> Self {
        Self {
            board: vec![0; width * height],
            to_play: Color::Black,
            width,
            height,
            line_size,
            last_move: None,
            winner: None,
            pieces: 0,
        }
    }

    /// The standard 7x6 board with four in a row.
    pub fn standard() -> Self {
        Self::new(7, 6, 4)
    }

    pub fn line_size(&self) -> usize {
        self.line_size
    }

    pub fn winner(&self) -> Option<Color> {
        self.winner
    }

    /// Piece at (row, column): 1, -1 or 0.
    pub fn cell(&self, row: usize, col: usize) -> i8 {
        self.board[row * self.width + col]
    }

    /// A move is legal if the column exists and its top cell is empty.
    pub fn is_legal(&self, mv: Move) -> bool {
        let col = mv.0 as usize;
        col < self.width && self.board[col] == 0 && self.winner.is_none()
    }

    /// Length of the run through (row, col) along one direction.
    fn run_length(&self, row: usize, col: usize, (dr, dc): (isize, isize)) -> usize {
        let owner = self.cell(row, col);
        let mut length = 1;
        for sign in [1isize, -1] {
            let (mut r, mut c) = (row as isize, col as isize);
            loop {
                r += sign * dr;
                c += sign * dc;
                if r < 0 || c < 0 || r >= self.height as isize || c >= self.width as isize {
                    break;
                }
                if self.cell(r as usize, c as usize) != owner {
                    break;
                }
                length += 1;
            }
        }
        length
    }
}

impl GameState for Connect4State {
    fn legal_moves(&self) -> Vec<Move> {
        if self.winner.is_some() {
            return Vec::new();
        }
        (0..self.width)
            .filter(|&c| self.board[c] == 0)
            .map(|c| Move(c as u32))
            .collect()
    }

    fn apply_move(&mut self, mv: Move) {
        let col = mv.0 as usize;
        for r in (0..self.height).rev() {
            let idx = r * self.width + col;
            if self.board[idx] == 0 {
                self.board[idx] = piece(self.to_play);
                self.last_move = Some((r, col));
                self.pieces += 1;
                if DIRECTIONS
                    .iter()
                    .any(|&d| self.run_length(r, col, d) >= self.line_size)
                {
                    self.winner = Some(self.to_play);
                }
                self.to_play = self.to_play.opponent();
                return;
            }
        }
    }

    fn is_terminal(&self) -> bool {
        self.winner.is_some() || self.pieces == self.board.len()
    }

    fn to_play(&self) -> Color {
        self.to_play
    }

    fn final_score(&self) -> f64 {
        match self.winner {
            Some(color) if color == self.to_play => 1.0,
            Some(_) => 0.0,
            None => 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(game: &mut Connect4State, cols: &[u32]) {
        for &c in cols {
            game.apply_move(Move(c));
        }
    }

    #[test]
    fn test_new_game() {
        let game = Connect4State::standard();
        assert_eq!(game.to_play(), Color::Black);
        assert_eq!(game.line_size(), 4);
        assert!(!game.is_terminal());
        assert_eq!(game.legal_moves().len(), 7);
    }

    #[test]
    fn test_apply_move() {
        let mut game = Connect4State::standard();
        game.apply_move(Move(3));
        assert_eq!(game.cell(5, 3), 1);
        assert_eq!(game.to_play(), Color::White);
        game.apply_move(Move(3));
        assert_eq!(game.cell(4, 3), -1);
        assert_eq!(game.to_play(), Color::Black);
    }

    #[test]
    fn test_win_condition_horizontal() {
        let mut game = Connect4State::standard();
        play(&mut game, &[0, 0, 1, 1, 2, 2, 3]);
        assert_eq!(game.winner(), Some(Color::Black));
        assert!(game.is_terminal());
        assert!(game.legal_moves().is_empty());
        assert_eq!(game.final_score(), 0.0);
    }

    #[test]
    fn test_win_condition_vertical() {
        let mut game = Connect4State::standard();
        play(&mut game, &[0, 1, 0, 1, 0, 1, 0]);
        assert_eq!(game.winner(), Some(Color::Black));
    }

    #[test]
    fn test_win_condition_diagonal() {
        let mut game = Connect4State::standard();
        play(&mut game, &[0, 1, 1, 2, 2, 3, 2, 3, 3, 0, 3]);
        assert_eq!(game.winner(), Some(Color::Black));
        assert!(game.is_terminal());
    }

    #[test]
    fn test_full_board_is_draw() {
        let mut game = Connect4State::new(2, 2, 3);
        play(&mut game, &[0, 1, 0, 1]);
        assert!(game.is_terminal());
        assert_eq!(game.winner(), None);
        assert_eq!(game.final_score(), 0.5);
    }
}
