//! # Game Wrapper
//!
//! Lets the command line tools pick a game at runtime while the search
//! stays generic over [`GameState`]. Each variant holds the complete state
//! of one game and every trait method dispatches with a `match`, so no trait
//! objects are involved.
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │    UctSearch    │◄──►│   GameWrapper    │◄──►│  Connect4State  │
//! │                 │    │                  │    │  NimState       │
//! │                 │    │                  │    │  TwoMoveState   │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//! ```

use crate::game::GameState;
use crate::games::connect4::Connect4State;
use crate::games::nim::NimState;
use crate::games::two_move::TwoMoveState;
use crate::node::{Color, Move};
use rand::Rng;
use std::fmt;

/// Game selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum GameKind {
    Connect4,
    Nim,
    TwoMove,
}

/// Wrapper enum for all included games.
#[derive(Debug, Clone)]
pub enum GameWrapper {
    Connect4(Connect4State),
    Nim(NimState),
    TwoMove(TwoMoveState),
}

impl GameWrapper {
    /// The starting position of a game with its default parameters.
    pub fn new(kind: GameKind) -> Self {
        match kind {
            GameKind::Connect4 => GameWrapper::Connect4(Connect4State::standard()),
            GameKind::Nim => GameWrapper::Nim(NimState::new(21, 3)),
            GameKind::TwoMove => GameWrapper::TwoMove(TwoMoveState::new()),
        }
    }

    pub fn kind(&self) -> GameKind {
        match self {
            GameWrapper::Connect4(_) => GameKind::Connect4,
            GameWrapper::Nim(_) => GameKind::Nim,
            GameWrapper::TwoMove(_) => GameKind::TwoMove,
        }
    }
}

macro_rules! impl_game_dispatch {
    ($($variant:ident),*) => {
        impl GameState for GameWrapper {
            fn legal_moves(&self) -> Vec<Move> {
                match self {
                    $(GameWrapper::$variant(g) => g.legal_moves(),)*
                }
            }

            fn apply_move(&mut self, mv: Move) {
                match self {
                    $(GameWrapper::$variant(g) => g.apply_move(mv),)*
                }
            }

            fn is_terminal(&self) -> bool {
                match self {
                    $(GameWrapper::$variant(g) => g.is_terminal(),)*
                }
            }

            fn to_play(&self) -> Color {
                match self {
                    $(GameWrapper::$variant(g) => g.to_play(),)*
                }
            }

            fn final_score(&self) -> f64 {
                match self {
                    $(GameWrapper::$variant(g) => g.final_score(),)*
                }
            }

            fn playout_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Move> {
                match self {
                    $(GameWrapper::$variant(g) => g.playout_move(rng),)*
                }
            }
        }
    };
}

impl_game_dispatch!(Connect4, Nim, TwoMove);

impl fmt::Display for GameWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameWrapper::Connect4(g) => write!(f, "{}", g),
            GameWrapper::Nim(g) => writeln!(f, "{} stones, {:?} to play", g.stones(), g.to_play()),
            GameWrapper::TwoMove(g) => writeln!(f, "two-move game, {:?} to play", g.to_play()),
        }
    }
}
