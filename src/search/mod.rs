//! # Search Controller
//!
//! [`UctSearch`] owns the shared [`SearchTree`], a pool of long-lived
//! workers and the configuration snapshot they run with. A search is one or
//! more rounds: the controller expands the root, hands every worker the same
//! [`SearchJob`](worker::SearchJob) and collects their statistics when the
//! round ends. A round that stopped because the tree is full is followed by
//! a prune and another round with the remaining budget.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use uct::config::SearchConfig;
//! use uct::game::SimulatorFactory;
//! use uct::games::nim::NimState;
//! use uct::search::UctSearch;
//!
//! let config = SearchConfig::default().with_threads(4).with_max_games(10_000);
//! let mut search = UctSearch::new(config, Arc::new(SimulatorFactory::<NimState>::new()))?;
//! let result = search.search(&NimState::new(21, 3))?;
//! println!("best move: {:?}", result.best_move);
//! # Ok::<(), uct::error::SearchError>(())
//! ```

mod abort;
mod policy;
mod worker;

pub use abort::AbortReason;

use crate::config::SearchConfig;
use crate::error::{SearchError, TreeError};
use crate::game::{GameState, ThreadState, ThreadStateFactory};
use crate::node::{Move, MoveInfo, NodeId, ProvenType};
use crate::stats::{ChildStat, SearchStat};
use crate::sync::{NoopSynchronizer, RunSynchronizer};
use crate::tree::SearchTree;
use abort::{early_abort_condition, AbortChecker};
use log::{debug, error, info, warn};
use parking_lot::{ReentrantMutex, RwLock, RwLockReadGuard};
use policy::Policy;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};
use worker::{SearchJob, Worker, WorkerCommand, WorkerEvent};

/// How often the controller wakes up while workers search.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on threshold doublings when pruning a full tree.
const MAX_PRUNE_STEPS: usize = 32;

/// Outcome of one search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// `None` if the root has no legal moves.
    pub best_move: Option<Move>,
    /// Value of the position for the player to move at the root.
    pub value: f64,
    /// Games added to the tree.
    pub games: u64,
    pub elapsed: Duration,
    pub abort_reason: Option<AbortReason>,
    /// The search stopped, or had its budget reduced, because the result
    /// was already clear.
    pub early_abort: bool,
    /// Principal variation from the root.
    pub sequence: Vec<Move>,
}

/// Stops a running search from another thread.
#[derive(Debug, Clone)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

struct WorkerPool<G> {
    /// Keeps the worker threads alive.
    _pool: ThreadPool,
    commands: Vec<Sender<WorkerCommand<G>>>,
    events: Receiver<WorkerEvent>,
}

/// Multi-threaded UCT search over positions of type `G`.
pub struct UctSearch<G: GameState> {
    config: Arc<SearchConfig>,
    tree: Arc<RwLock<SearchTree>>,
    /// Copy target for pruning and subtree extraction.
    spare: Option<SearchTree>,
    factory: Arc<dyn ThreadStateFactory<G>>,
    sync: Arc<dyn RunSynchronizer>,
    pool: Option<WorkerPool<G>>,
    root_state: Box<dyn ThreadState<G>>,
    external_abort: Arc<AtomicBool>,
    structural: Arc<ReentrantMutex<()>>,
    /// The tree belongs to the next root; set by `advance_root` and
    /// `import_tree`, consumed by the next search.
    reuse_tree: bool,
    stat: SearchStat,
    moves: Vec<MoveInfo>,
}

impl<G: GameState> UctSearch<G> {
    /// Validates `config`, allocates the tree and starts the workers.
    pub fn new(config: SearchConfig, factory: Arc<dyn ThreadStateFactory<G>>) -> Result<Self, SearchError> {
        Self::with_synchronizer(config, factory, Arc::new(NoopSynchronizer))
    }

    pub fn with_synchronizer(
        config: SearchConfig,
        factory: Arc<dyn ThreadStateFactory<G>>,
        sync: Arc<dyn RunSynchronizer>,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        let tree = SearchTree::new(config.num_threads, config.nodes_per_allocator());
        let root_state = factory.create(config.num_threads, seed.wrapping_add(config.num_threads as u64));
        let mut search = Self {
            config: Arc::new(config),
            tree: Arc::new(RwLock::new(tree)),
            spare: None,
            factory,
            sync,
            pool: None,
            root_state,
            external_abort: Arc::new(AtomicBool::new(false)),
            structural: Arc::new(ReentrantMutex::new(())),
            reuse_tree: false,
            stat: SearchStat::default(),
            moves: Vec::new(),
        };
        search.start_workers(seed)?;
        Ok(search)
    }

    fn start_workers(&mut self, seed: u64) -> Result<(), SearchError> {
        let threads = self.config.num_threads;
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("uct-worker-{}", i))
            .build()
            .map_err(|e| SearchError::ThreadPool(e.to_string()))?;
        let (event_tx, event_rx) = mpsc::channel();
        let mut commands = Vec::with_capacity(threads);
        for id in 0..threads {
            let (command_tx, command_rx) = mpsc::channel();
            let worker = Worker::new(
                id,
                Arc::clone(&self.config),
                self.factory.create(id, seed.wrapping_add(id as u64)),
                Arc::clone(&self.sync),
                Arc::clone(&self.structural),
            );
            let events = event_tx.clone();
            pool.spawn(move || worker.run(command_rx, events));
            commands.push(command_tx);
        }
        debug!("started {} search workers", threads);
        self.pool = Some(WorkerPool {
            _pool: pool,
            commands,
            events: event_rx,
        });
        Ok(())
    }

    fn stop_workers(&mut self) {
        if let Some(pool) = self.pool.take() {
            for command in &pool.commands {
                let _ = command.send(WorkerCommand::Shutdown);
            }
        }
    }

    /// Replaces the configuration, restarting the workers. The tree is
    /// kept unless the thread count or node capacity changed.
    pub fn reconfigure(&mut self, config: SearchConfig) -> Result<(), SearchError> {
        config.validate()?;
        self.stop_workers();
        let reshape = config.num_threads != self.config.num_threads
            || config.nodes_per_allocator() != self.config.nodes_per_allocator();
        if reshape {
            self.tree
                .write()
                .set_capacity(config.num_threads, config.nodes_per_allocator());
            self.spare = None;
            debug!(
                "tree resized to {} allocators of {} nodes",
                config.num_threads,
                config.nodes_per_allocator()
            );
        }
        let seed = config.seed.unwrap_or_else(rand::random);
        self.root_state = self
            .factory
            .create(config.num_threads, seed.wrapping_add(config.num_threads as u64));
        self.config = Arc::new(config);
        self.start_workers(seed)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Searches `root` with the configured game and time budget.
    pub fn search(&mut self, root: &G) -> Result<SearchResult, SearchError> {
        let (max_games, max_time) = (self.config.max_games, self.config.max_time);
        self.search_with(root, max_games, max_time, &[])
    }

    /// Searches `root` with an explicit budget.
    ///
    /// The tree of the previous search is kept only after
    /// [`advance_root`](Self::advance_root) or
    /// [`import_tree`](Self::import_tree); otherwise the search starts from
    /// an empty tree.
    ///
    /// # Arguments
    /// * `root_filter` - Moves not to consider at the root. A non-empty
    ///   filter discards a reused tree.
    pub fn search_with(
        &mut self,
        root: &G,
        max_games: u64,
        max_time: Option<Duration>,
        root_filter: &[Move],
    ) -> Result<SearchResult, SearchError> {
        let start = Instant::now();
        self.external_abort.store(false, Ordering::Relaxed);
        self.sync.on_search_start();
        self.stat.clear();
        debug!(
            "search: {} threads, max games {}, max time {:?}, {} nodes",
            self.config.num_threads, max_games, max_time, self.config.max_nodes
        );

        let (mut max_games, mut max_time) = (max_games, max_time);
        let mut reduced = false;
        let mut unexpanded_root_move = None;
        {
            let mut tree = self.tree.write();
            let reuse = std::mem::take(&mut self.reuse_tree);
            if !reuse || (!root_filter.is_empty() && tree.root().has_children()) {
                tree.clear();
            }
            tree.set_root_color(root.to_play());
            self.root_state.start_search(root);
            if !tree.root().has_children() && !tree.root().is_proven() {
                let proven = self.root_state.generate_all_moves(&mut self.moves);
                self.moves.retain(|info| !root_filter.contains(&info.mv));
                if !self.moves.is_empty() {
                    let n = self.moves.len();
                    match (0..tree.allocator_count()).find(|&i| tree.has_capacity(i, n)) {
                        Some(allocator) => {
                            tree.create_children(allocator, NodeId::ROOT, &self.moves)?;
                            debug!("expanded root: {} moves", n);
                        }
                        None => {
                            warn!(
                                "no allocator can hold the {} root moves, searching the root as a leaf",
                                n
                            );
                            unexpanded_root_move = highest_prior(&self.moves);
                        }
                    }
                } else if proven != ProvenType::None {
                    tree.root().set_proven(proven);
                }
            } else {
                debug!("reusing tree: {} nodes", tree.node_count());
            }
            if let Some(param) = &self.config.early_abort {
                if early_abort_condition(tree.root(), param) {
                    reduced = true;
                    if max_games != u64::MAX {
                        max_games = (max_games as f64 / param.reduction_factor) as u64;
                    }
                    max_time = max_time.map(|t| t.div_f64(param.reduction_factor));
                    debug!("early abort condition holds, budget reduced to {} games", max_games);
                }
            }
        }

        let mut games = 0u64;
        let reason = loop {
            let checker = Arc::new(AbortChecker::new(
                &self.config,
                start,
                max_games.saturating_sub(games),
                max_time,
                if reduced { None } else { self.config.early_abort },
                Arc::clone(&self.external_abort),
                Arc::clone(&self.sync),
            ));
            self.run_round(root, &checker)?;
            games += checker.games();
            let reason = checker.reason();
            if reason.is_none() && checker.prune_requested() {
                self.prune_tree()?;
                continue;
            }
            break reason;
        };
        self.stat.time = start.elapsed();

        let tree = self.tree.read();
        if self.config.check_consistency {
            if let Err(e) = tree.check_consistency() {
                error!("search tree inconsistent after search: {}", e);
                return Err(e.into());
            }
        }
        let policy = Policy::new(&self.config);
        let best = policy.best_child(&tree, NodeId::ROOT);
        let best_move = best
            .map(|id| tree.node(id).mv())
            .or(unexpanded_root_move)
            .map(|mv| self.sync.synchronize_move(mv));
        let value = self.sync.synchronize_value(root_value(&tree, best));
        let sequence = policy.principal_variation(&tree, self.config.max_game_length);
        drop(tree);
        self.sync.on_search_end();

        let result = SearchResult {
            best_move,
            value,
            games: self.stat.games,
            elapsed: start.elapsed(),
            abort_reason: reason,
            early_abort: reduced || reason.is_some_and(AbortReason::is_early),
            sequence,
        };
        debug!(
            "search finished: {} games in {:.3}s ({}), best {:?}, value {:.3}",
            result.games,
            result.elapsed.as_secs_f64(),
            reason.map_or_else(|| "no reason".to_string(), |r| r.to_string()),
            result.best_move,
            result.value
        );
        Ok(result)
    }

    /// Runs the workers until `checker` stops them and merges their
    /// statistics.
    fn run_round(&mut self, root: &G, checker: &Arc<AbortChecker>) -> Result<(), SearchError> {
        let pool = self.pool.as_ref().ok_or(SearchError::WorkerLost)?;
        let barrier = Arc::new(Barrier::new(pool.commands.len() + 1));
        let job = Arc::new(SearchJob {
            root: root.clone(),
            tree: Arc::clone(&self.tree),
            checker: Arc::clone(checker),
            barrier: Arc::clone(&barrier),
        });
        for command in &pool.commands {
            command
                .send(WorkerCommand::Search(Arc::clone(&job)))
                .map_err(|_| SearchError::WorkerLost)?;
        }
        barrier.wait();

        let mut pending = pool.commands.len();
        let mut failure: Option<TreeError> = None;
        let mut last_report = Instant::now();
        while pending > 0 {
            match pool.events.recv_timeout(POLL_INTERVAL) {
                Ok(WorkerEvent::Finished { thread_id, result }) => {
                    pending -= 1;
                    match result {
                        Ok(stat) => self.stat.merge(&stat),
                        Err(e) => {
                            error!("worker {} failed: {}", thread_id, e);
                            checker.halt();
                            failure.get_or_insert(e);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    checker.check_time();
                    if let Some(interval) = self.config.report_interval {
                        if last_report.elapsed() >= interval {
                            last_report = Instant::now();
                            self.report_progress(checker);
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    checker.halt();
                    return Err(SearchError::WorkerLost);
                }
            }
        }
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn report_progress(&self, checker: &AbortChecker) {
        let tree = self.tree.read();
        let policy = Policy::new(&self.config);
        let best = policy.best_child(&tree, NodeId::ROOT);
        let elapsed = checker.elapsed().as_secs_f64();
        info!(
            "{} games, {:.0} games/s, value {:.3}, best {}",
            checker.games(),
            checker.games() as f64 / elapsed.max(1e-9),
            root_value(&tree, best),
            best.map_or_else(|| "-".to_string(), |id| tree.node(id).mv().to_string())
        );
    }

    /// Copies the tree without its low-count branches and swaps the copy in.
    /// The threshold doubles until the copy fills at most half the tree.
    fn prune_tree(&mut self) -> Result<(), SearchError> {
        let mut tree = self.tree.write();
        let mut target = take_spare(&mut self.spare, &tree);
        let mut min_count = self.config.prune_min_count.max(1.0);
        let mut steps = 1;
        let truncated = loop {
            let truncated = tree.copy_prune_low_count(&mut target, min_count, true, None);
            let fits = !truncated && target.node_count() <= tree.max_nodes() / 2;
            if fits || steps >= MAX_PRUNE_STEPS {
                break truncated;
            }
            min_count *= 2.0;
            steps += 1;
        };
        if truncated {
            warn!("pruned tree copy truncated at min count {}", min_count);
        }
        debug!(
            "pruned tree from {} to {} nodes (min count {})",
            tree.node_count(),
            target.node_count(),
            min_count
        );
        tree.swap(&mut target)?;
        self.spare = Some(target);
        Ok(())
    }

    /// Moves the root down along `sequence`, keeping the subtree below it.
    ///
    /// The next search continues from the kept subtree; an empty
    /// `sequence` resumes the current root.
    ///
    /// # Returns
    /// `false` if the path is not in the tree; the tree is cleared then.
    pub fn advance_root(&mut self, sequence: &[Move]) -> Result<bool, SearchError> {
        let mut tree = self.tree.write();
        self.reuse_tree = true;
        let mut node = NodeId::ROOT;
        for &mv in sequence {
            let next = tree
                .children(node)
                .find(|(_, child)| child.mv() == mv)
                .map(|(id, _)| id);
            match next {
                Some(id) => node = id,
                None => {
                    debug!("no subtree for {:?}, clearing tree", sequence);
                    tree.clear();
                    return Ok(false);
                }
            }
        }
        if node.is_root() {
            return Ok(true);
        }
        let mut target = take_spare(&mut self.spare, &tree);
        if tree.extract_subtree(&mut target, node, None) {
            warn!("subtree extraction truncated");
        }
        tree.swap(&mut target)?;
        self.spare = Some(target);
        debug!("advanced root, reusing {} nodes", tree.node_count());
        Ok(true)
    }

    /// Drops the whole tree.
    pub fn clear_tree(&mut self) {
        self.tree.write().clear();
    }

    /// One row per root child, in move generation order.
    pub fn root_child_stats(&self) -> Vec<ChildStat> {
        let tree = self.tree.read();
        tree.children(NodeId::ROOT)
            .map(|(_, child)| ChildStat {
                mv: child.mv(),
                count: child.move_count(),
                mean: child.has_mean().then(|| child.mean()),
                rave_count: child.rave_count(),
                rave_value: child.has_rave_value().then(|| child.rave_value()),
                prior: child.prior(),
                proven: child.proven(),
            })
            .collect()
    }

    /// The move the search would play now.
    pub fn best_move(&self) -> Option<Move> {
        let tree = self.tree.read();
        Policy::new(&self.config)
            .best_child(&tree, NodeId::ROOT)
            .map(|id| tree.node(id).mv())
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(Arc::clone(&self.external_abort))
    }

    /// Read access to the tree. Do not hold it across a call to `search`.
    pub fn tree(&self) -> RwLockReadGuard<'_, SearchTree> {
        self.tree.read()
    }

    /// Statistics of the last search.
    pub fn statistics(&self) -> &SearchStat {
        &self.stat
    }

    /// Snapshot of the tree without branches below `min_count` games.
    pub fn export_tree(&self, min_count: f64) -> SearchTree {
        let tree = self.tree.read();
        let mut copy = SearchTree::new(tree.allocator_count(), tree.capacity_per_allocator());
        if tree.copy_prune_low_count(&mut copy, min_count, true, None) {
            warn!("tree export truncated");
        }
        copy
    }

    /// Replaces the tree with a snapshot of the same shape. The next search
    /// continues from it.
    pub fn import_tree(&mut self, mut snapshot: SearchTree) -> Result<(), SearchError> {
        self.tree.write().swap(&mut snapshot)?;
        self.reuse_tree = true;
        Ok(())
    }

    pub fn check_consistency(&self) -> Result<(), TreeError> {
        self.tree.read().check_consistency()
    }
}

impl<G: GameState> Drop for UctSearch<G> {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

/// Move with the highest prior, first one on ties.
fn highest_prior(moves: &[MoveInfo]) -> Option<Move> {
    moves
        .iter()
        .fold(None::<&MoveInfo>, |best, info| match best {
            Some(b) if b.prior >= info.prior => best,
            _ => Some(info),
        })
        .map(|info| info.mv)
}

/// Reuses `spare` as a copy target if it has the shape of `tree`.
fn take_spare(spare: &mut Option<SearchTree>, tree: &SearchTree) -> SearchTree {
    match spare.take() {
        Some(spare)
            if spare.allocator_count() == tree.allocator_count()
                && spare.capacity_per_allocator() == tree.capacity_per_allocator() =>
        {
            spare
        }
        _ => SearchTree::new(tree.allocator_count(), tree.capacity_per_allocator()),
    }
}

/// Value for the player to move at the root.
fn root_value(tree: &SearchTree, best: Option<NodeId>) -> f64 {
    let root = tree.root();
    match root.proven() {
        ProvenType::Win => return 1.0,
        ProvenType::Loss => return 0.0,
        ProvenType::None => {}
    }
    match best.map(|id| tree.node(id)) {
        Some(child) if child.has_mean() => child.mean(),
        _ if root.has_mean() => 1.0 - root.mean(),
        _ => 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MoveSelect;
    use crate::game::SimulatorFactory;
    use crate::games::connect4::Connect4State;
    use crate::games::nim::NimState;
    use crate::games::two_move::TwoMoveState;

    fn nim_search(config: SearchConfig) -> UctSearch<NimState> {
        UctSearch::new(config, Arc::new(SimulatorFactory::<NimState>::new())).unwrap()
    }

    fn connect4_search(config: SearchConfig) -> UctSearch<Connect4State> {
        UctSearch::new(config, Arc::new(SimulatorFactory::<Connect4State>::new())).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = UctSearch::<NimState>::new(
            SearchConfig::for_testing().with_threads(0),
            Arc::new(SimulatorFactory::<NimState>::new()),
        );
        assert!(matches!(result, Err(SearchError::Config(_))));
    }

    #[test]
    fn test_plays_exact_game_budget() {
        let mut search =
            connect4_search(SearchConfig::for_testing().with_move_select(MoveSelect::Value));
        let result = search.search(&Connect4State::standard()).unwrap();
        assert_eq!(result.games, 1000);
        assert_eq!(result.abort_reason, Some(AbortReason::MaxGames));
        assert!(!result.early_abort);
        assert_eq!(search.tree().root().move_count(), 1000.0);
        let visits: f64 = search.root_child_stats().iter().map(|c| c.count).sum();
        assert_eq!(visits, 1000.0);
        assert!(!result.sequence.is_empty());
    }

    #[test]
    fn test_finds_winning_nim_move() {
        let mut search = nim_search(SearchConfig::for_testing().with_max_games(5000));
        let state = NimState::new(10, 3);
        let result = search.search(&state).unwrap();
        assert!(state.winning_moves().contains(&result.best_move.unwrap()));
        assert!(result.value > 0.5);
    }

    #[test]
    fn test_root_filter_excludes_moves() {
        let mut search = nim_search(SearchConfig::for_testing().with_max_games(200));
        let result = search
            .search_with(&NimState::new(10, 3), 200, None, &[Move(2)])
            .unwrap();
        let moves: Vec<Move> = search.root_child_stats().iter().map(|c| c.mv).collect();
        assert_eq!(moves, vec![Move(1), Move(3)]);
        assert_ne!(result.best_move, Some(Move(2)));
    }

    #[test]
    fn test_terminal_root_has_no_move() {
        let mut search = nim_search(SearchConfig::for_testing().with_max_games(10));
        let result = search.search(&NimState::new(0, 3)).unwrap();
        assert_eq!(result.best_move, None);
        assert_eq!(result.value, 0.0);
        assert!(search.tree().root().is_proven());
    }

    #[test]
    fn test_external_abort_stops_search() {
        let mut search = connect4_search(SearchConfig::for_testing().with_max_games(u64::MAX));
        let handle = search.abort_handle();
        let search_thread = std::thread::spawn(move || {
            let result = search.search(&Connect4State::standard());
            (search, result)
        });
        std::thread::sleep(Duration::from_millis(50));
        handle.abort();
        let (search, result) = search_thread.join().unwrap();
        let result = result.unwrap();
        assert_eq!(result.abort_reason, Some(AbortReason::External));
        assert!(result.best_move.is_some());
        assert!(search.statistics().games > 0);
    }

    #[test]
    fn test_time_budget_stops_search() {
        let config = SearchConfig::for_testing()
            .with_move_select(MoveSelect::Value)
            .with_max_games(u64::MAX)
            .with_max_time(Duration::from_millis(100));
        let mut search = connect4_search(config);
        let result = search.search(&Connect4State::standard()).unwrap();
        assert_eq!(result.abort_reason, Some(AbortReason::MaxTime));
        assert!(result.elapsed < Duration::from_secs(5));
        assert!(result.best_move.is_some());
    }

    #[test]
    fn test_new_position_starts_from_empty_tree() {
        let mut search = nim_search(SearchConfig::for_testing().with_max_games(2000));
        let first = NimState::new(10, 3);
        let result = search.search(&first).unwrap();
        assert!(first.winning_moves().contains(&result.best_move.unwrap()));

        let second = NimState::new(9, 3);
        let result = search.search(&second).unwrap();
        assert_eq!(result.best_move, Some(Move(1)));
        assert_eq!(search.tree().root().move_count(), result.games as f64);
    }

    #[test]
    fn test_resumes_tree_only_when_asked() {
        let config = SearchConfig::for_testing()
            .with_move_select(MoveSelect::Value)
            .with_max_games(300);
        let mut search = connect4_search(config);
        let game = Connect4State::standard();
        search.search(&game).unwrap();
        search.search(&game).unwrap();
        assert_eq!(search.tree().root().move_count(), 300.0);

        assert!(search.advance_root(&[]).unwrap());
        search.search(&game).unwrap();
        assert_eq!(search.tree().root().move_count(), 600.0);
    }

    #[test]
    fn test_root_too_large_for_any_allocator_is_searched_as_leaf() {
        let config = SearchConfig::for_testing()
            .with_threads(4)
            .with_max_nodes(8)
            .with_move_select(MoveSelect::Value)
            .with_max_games(50);
        let mut search = connect4_search(config);
        let game = Connect4State::standard();
        let result = search.search(&game).unwrap();
        assert_eq!(result.games, 50);
        assert!(game.legal_moves().contains(&result.best_move.unwrap()));
        let tree = search.tree();
        assert!(!tree.root().has_children());
        assert_eq!(tree.root().move_count(), 50.0);
    }

    #[test]
    fn test_prunes_full_tree_and_finishes_budget() {
        let config = SearchConfig::for_testing()
            .with_move_select(MoveSelect::Value)
            .with_max_nodes(200)
            .with_max_games(3000)
            .with_prune_full_tree(true, 2.0);
        let mut search = connect4_search(config);
        let result = search.search(&Connect4State::standard()).unwrap();
        assert_eq!(result.abort_reason, Some(AbortReason::MaxGames));
        assert_eq!(result.games, 3000);
        assert!(search.tree().node_count() <= 200);
        search.check_consistency().unwrap();
    }

    #[test]
    fn test_advance_root_reuses_subtree() {
        let mut search = UctSearch::<TwoMoveState>::new(
            SearchConfig::for_testing().with_max_games(200),
            Arc::new(SimulatorFactory::<TwoMoveState>::new()),
        )
        .unwrap();
        search.search(&TwoMoveState::new()).unwrap();
        let before = search
            .root_child_stats()
            .into_iter()
            .find(|c| c.mv == Move(0))
            .unwrap();
        assert!(search.advance_root(&[Move(0)]).unwrap());
        assert_eq!(search.tree().root().move_count(), before.count);
        search.check_consistency().unwrap();

        assert!(!search.advance_root(&[Move(1), Move(1), Move(1)]).unwrap());
        assert!(!search.tree().root().has_children());
    }

    #[test]
    fn test_reconfigure_resizes_tree() {
        let config = SearchConfig::for_testing()
            .with_move_select(MoveSelect::Value)
            .with_max_games(100);
        let mut search = connect4_search(config.clone());
        search.search(&Connect4State::standard()).unwrap();
        search.reconfigure(config.with_threads(2)).unwrap();
        assert_eq!(search.tree().allocator_count(), 2);
        assert!(!search.tree().root().has_children());
        let result = search.search(&Connect4State::standard()).unwrap();
        assert_eq!(result.games, 100);
    }

    #[test]
    fn test_export_and_import() {
        let mut search = connect4_search(SearchConfig::for_testing().with_max_games(500));
        search.search(&Connect4State::standard()).unwrap();
        let count = search.tree().root().move_count();
        let best = search.best_move();

        let snapshot = search.export_tree(0.0);
        assert_eq!(snapshot.root().move_count(), count);
        search.clear_tree();
        assert_eq!(search.best_move(), None);
        search.import_tree(snapshot).unwrap();
        assert_eq!(search.tree().root().move_count(), count);
        assert_eq!(search.best_move(), best);
        search.check_consistency().unwrap();
    }
}
