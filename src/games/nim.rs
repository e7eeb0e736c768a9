//! # Nim
//!
//! A single heap of stones. Each turn the player to move takes between 1
//! and `max_take` stones; whoever takes the last stone wins. A position is
//! lost for the player to move iff `stones % (max_take + 1) == 0`, which
//! makes Nim a convenient oracle for checking search results.

use crate::game::GameState;
use crate::node::{Color, Move};

/// Single-heap Nim. `Move(k)` takes `k` stones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NimState {
    stones: u32,
    max_take: u32,
    to_play: Color,
}

impl NimState {
    pub fn new(stones: u32, max_take: u32) -> Self {
        Self {
            stones,
            max_take: max_take.max(1),
            to_play: Color::Black,
        }
    }

    pub fn stones(&self) -> u32 {
        self.stones
    }

    /// Moves that leave the opponent in a lost position.
    pub fn winning_moves(&self) -> Vec<Move> {
        self.legal_moves()
            .into_iter()
            .filter(|mv| (self.stones - mv.0) % (self.max_take + 1) == 0)
            .collect()
    }
}

impl GameState for NimState {
    fn legal_moves(&self) -> Vec<Move> {
        (1..=self.max_take.min(self.stones)).map(Move).collect()
    }

    fn apply_move(&mut self, mv: Move) {
        self.stones -= mv.0.min(self.stones);
        self.to_play = self.to_play.opponent();
    }

    fn is_terminal(&self) -> bool {
        self.stones == 0
    }

    fn to_play(&self) -> Color {
        self.to_play
    }

    /// The previous player took the last stone.
    fn final_score(&self) -> f64 {
        0.0
    }
}
