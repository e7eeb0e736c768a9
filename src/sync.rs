//! Hooks for cooperating search processes.
//!
//! A distributed run installs a [`RunSynchronizer`] that broadcasts search
//! events and agrees on the abort flag, the chosen move and the root value
//! across processes. Single-process searches use [`NoopSynchronizer`].

use crate::game::GameInfo;
use crate::node::Move;

/// Search event hooks. Every method has a do-nothing default.
pub trait RunSynchronizer: Send + Sync {
    fn on_search_start(&self) {}

    fn on_search_end(&self) {}

    fn on_thread_start(&self, _thread_id: usize) {}

    fn on_thread_end(&self, _thread_id: usize) {}

    /// Called by a worker after each finished game.
    fn on_iteration(&self, _game_index: u64, _thread_id: usize, _info: &GameInfo) {}

    /// Combines the local abort flag with the other processes' flags.
    fn synchronize_user_abort(&self, aborted: bool) -> bool {
        aborted
    }

    /// Agrees on the move returned by the search.
    fn synchronize_move(&self, mv: Move) -> Move {
        mv
    }

    /// Agrees on the root value returned by the search.
    fn synchronize_value(&self, value: f64) -> f64 {
        value
    }
}

/// Synchronizer of a single-process search.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSynchronizer;

impl RunSynchronizer for NoopSynchronizer {}
