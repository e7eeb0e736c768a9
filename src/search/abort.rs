//! Abort logic.
//!
//! Workers claim game indices from a shared [`AbortChecker`], which enforces
//! the game budget exactly. Everything that needs the clock or a walk over
//! the root children runs only every `check_interval` games per worker.

use crate::config::{EarlyAbortParam, MoveSelect, SearchConfig};
use crate::node::{Node, NodeId};
use crate::sync::RunSynchronizer;
use crate::tree::SearchTree;
use log::{debug, trace};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The game budget was used up.
    MaxGames,
    /// The time budget was used up.
    MaxTime,
    /// The abort handle was set, here or in a cooperating process.
    External,
    /// The root value passed the early-abort threshold.
    EarlyAbort,
    /// The most visited move cannot be overtaken in the remaining budget.
    Unbeatable,
    /// The root position is solved.
    Proven,
}

impl AbortReason {
    /// Stopped before the budget was used up because the outcome was
    /// already clear.
    pub fn is_early(self) -> bool {
        matches!(
            self,
            AbortReason::EarlyAbort | AbortReason::Unbeatable | AbortReason::Proven
        )
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AbortReason::MaxGames => "max games",
            AbortReason::MaxTime => "max time",
            AbortReason::External => "user abort",
            AbortReason::EarlyAbort => "early abort",
            AbortReason::Unbeatable => "move cannot change",
            AbortReason::Proven => "root proven",
        };
        f.write_str(text)
    }
}

/// Whether the root value is past the early-abort threshold.
pub(crate) fn early_abort_condition(root: &Node, param: &EarlyAbortParam) -> bool {
    root.has_mean()
        && root.move_count() > param.min_games
        && 1.0 - root.mean() > param.threshold
}

/// Abort state shared by the controller and all workers of one round.
pub(crate) struct AbortChecker {
    start: Instant,
    max_games: u64,
    max_time: Option<Duration>,
    early_abort: Option<EarlyAbortParam>,
    count_abort: bool,
    games: AtomicU64,
    aborted: AtomicBool,
    reason: Mutex<Option<AbortReason>>,
    prune_requested: AtomicBool,
    warned_full: AtomicBool,
    external: Arc<AtomicBool>,
    sync: Arc<dyn RunSynchronizer>,
}

impl AbortChecker {
    /// # Arguments
    /// * `start` - Start of the whole search; the time budget counts from here
    /// * `max_games` - Games this round may still play
    pub(crate) fn new(
        config: &SearchConfig,
        start: Instant,
        max_games: u64,
        max_time: Option<Duration>,
        early_abort: Option<EarlyAbortParam>,
        external: Arc<AtomicBool>,
        sync: Arc<dyn RunSynchronizer>,
    ) -> Self {
        Self {
            start,
            max_games,
            max_time,
            early_abort,
            count_abort: config.move_select == MoveSelect::Count,
            games: AtomicU64::new(0),
            aborted: AtomicBool::new(false),
            reason: Mutex::new(None),
            prune_requested: AtomicBool::new(false),
            warned_full: AtomicBool::new(false),
            external,
            sync,
        }
    }

    /// Claims the index of the next game, or `None` if the round is over.
    pub(crate) fn start_game(&self) -> Option<u64> {
        if self.is_aborted() {
            return None;
        }
        let index = self.games.fetch_add(1, Ordering::Relaxed);
        if index >= self.max_games {
            self.abort(AbortReason::MaxGames);
            return None;
        }
        Some(index)
    }

    /// Time since the start of the search.
    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Games claimed so far, capped at the budget.
    pub(crate) fn games(&self) -> u64 {
        self.games.load(Ordering::Relaxed).min(self.max_games)
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Stops the round. The first reason is kept.
    pub(crate) fn abort(&self, reason: AbortReason) {
        let mut current = self.reason.lock();
        if current.is_none() {
            trace!("abort: {}", reason);
            *current = Some(reason);
        }
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// Stops the round without a reason, e.g. after a worker failure.
    pub(crate) fn halt(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    pub(crate) fn reason(&self) -> Option<AbortReason> {
        *self.reason.lock()
    }

    /// Games in flight when a hard abort hits are dropped; after a budget
    /// abort or a prune request they still count.
    pub(crate) fn discard_running_games(&self) -> bool {
        matches!(
            self.reason(),
            Some(AbortReason::MaxTime) | Some(AbortReason::External)
        )
    }

    /// Stops the round so the controller can prune the full tree.
    pub(crate) fn request_prune(&self) {
        if !self.prune_requested.swap(true, Ordering::Relaxed) {
            debug!("tree full, requesting prune");
        }
        self.halt();
    }

    pub(crate) fn prune_requested(&self) -> bool {
        self.prune_requested.load(Ordering::Relaxed)
    }

    /// Returns `true` the first time it is called in a round.
    pub(crate) fn first_full_warning(&self) -> bool {
        !self.warned_full.swap(true, Ordering::Relaxed)
    }

    /// Time and external checks; cheap enough for the controller's wait loop.
    pub(crate) fn check_time(&self) {
        if self.sync.synchronize_user_abort(self.external.load(Ordering::Relaxed)) {
            self.abort(AbortReason::External);
            return;
        }
        if let Some(max_time) = self.max_time {
            if self.start.elapsed() >= max_time {
                self.abort(AbortReason::MaxTime);
            }
        }
    }

    /// The full periodic check run by the workers.
    pub(crate) fn check(&self, tree: &SearchTree) {
        if self.is_aborted() {
            return;
        }
        self.check_time();
        if self.is_aborted() {
            return;
        }
        let root = tree.root();
        if root.is_proven() {
            self.abort(AbortReason::Proven);
            return;
        }
        if let Some(param) = &self.early_abort {
            if self.past_reduced_budget(param) && early_abort_condition(root, param) {
                self.abort(AbortReason::EarlyAbort);
                return;
            }
        }
        if self.count_abort && self.move_cannot_change(tree) {
            self.abort(AbortReason::Unbeatable);
        }
    }

    /// At least `1 / reduction_factor` of the game or time budget is spent.
    fn past_reduced_budget(&self, param: &EarlyAbortParam) -> bool {
        let games = self.games() as f64;
        if self.max_games != u64::MAX && games >= self.max_games as f64 / param.reduction_factor {
            return true;
        }
        match self.max_time {
            Some(max_time) => {
                self.start.elapsed().as_secs_f64() >= max_time.as_secs_f64() / param.reduction_factor
            }
            None => false,
        }
    }

    /// Upper bound on the games still to come, from the game budget and
    /// the current game rate.
    fn remaining_games(&self) -> f64 {
        let games = self.games();
        let mut remaining = if self.max_games == u64::MAX {
            f64::INFINITY
        } else {
            (self.max_games - games) as f64
        };
        if let Some(max_time) = self.max_time {
            let elapsed = self.start.elapsed().as_secs_f64();
            if elapsed > 0.0 && games > 0 {
                let rate = games as f64 / elapsed;
                let left = (max_time.as_secs_f64() - elapsed).max(0.0);
                remaining = remaining.min(rate * left);
            }
        }
        remaining
    }

    /// The leading root child is ahead of the runner-up by more than the
    /// remaining games.
    fn move_cannot_change(&self, tree: &SearchTree) -> bool {
        let remaining = self.remaining_games();
        if !remaining.is_finite() {
            return false;
        }
        let mut first = 0.0;
        let mut second = 0.0;
        for (_, child) in tree.children(NodeId::ROOT) {
            let count = child.move_count();
            if count > first {
                second = first;
                first = count;
            } else if count > second {
                second = count;
            }
        }
        first - second > remaining
    }
}
