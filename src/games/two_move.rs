//! # Two-Move Game
//!
//! A synthetic game of exactly two plies: the first player picks one of two
//! moves, the second player answers with one of two moves, and a payoff
//! table gives the first player's result. The minimax value is known in
//! closed form, so the game is used to check that the search converges.
//!
//! ```text
//!              root (first player)
//!             /                  \
//!         Move(0)              Move(1)
//!         /     \              /     \
//!      0.7       0.6        1.0       0.0     <- default payoffs
//! ```
//!
//! With the default table, `Move(0)` is optimal with value 0.6.

use crate::game::GameState;
use crate::node::{Color, Move};

#[derive(Debug, Clone, PartialEq)]
pub struct TwoMoveState {
    /// `payoffs[first][second]`, from the first player's point of view.
    payoffs: [[f64; 2]; 2],
    moves: Vec<Move>,
}

impl Default for TwoMoveState {
    fn default() -> Self {
        Self::with_payoffs([[0.7, 0.6], [1.0, 0.0]])
    }
}

impl TwoMoveState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payoffs(payoffs: [[f64; 2]; 2]) -> Self {
        Self {
            payoffs,
            moves: Vec::with_capacity(2),
        }
    }

    /// The optimal first move and its minimax value.
    pub fn optimal(&self) -> (Move, f64) {
        let value = |row: &[f64; 2]| row[0].min(row[1]);
        let (a, b) = (value(&self.payoffs[0]), value(&self.payoffs[1]));
        if a >= b {
            (Move(0), a)
        } else {
            (Move(1), b)
        }
    }
}

impl GameState for TwoMoveState {
    fn legal_moves(&self) -> Vec<Move> {
        if self.is_terminal() {
            Vec::new()
        } else {
            vec![Move(0), Move(1)]
        }
    }

    fn apply_move(&mut self, mv: Move) {
        self.moves.push(Move(mv.0.min(1)));
    }

    fn is_terminal(&self) -> bool {
        self.moves.len() >= 2
    }

    fn to_play(&self) -> Color {
        if self.moves.len() % 2 == 0 {
            Color::Black
        } else {
            Color::White
        }
    }

    /// After two plies the first player is to move again.
    fn final_score(&self) -> f64 {
        match self.moves.as_slice() {
            [first, second, ..] => self.payoffs[first.0 as usize][second.0 as usize],
            _ => 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_optimum() {
        let game = TwoMoveState::new();
        assert_eq!(game.optimal(), (Move(0), 0.6));
    }

    #[test]
    fn test_payoff_after_two_plies() {
        let mut game = TwoMoveState::new();
        assert_eq!(game.to_play(), Color::Black);
        game.apply_move(Move(1));
        assert_eq!(game.to_play(), Color::White);
        assert!(!game.is_terminal());
        game.apply_move(Move(0));
        assert!(game.is_terminal());
        assert!(game.legal_moves().is_empty());
        assert_eq!(game.to_play(), Color::Black);
        assert_eq!(game.final_score(), 1.0);
    }
}
