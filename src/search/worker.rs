//! Search workers.
//!
//! Each worker runs a long-lived loop on the search thread pool and waits
//! for commands on its own channel. A [`WorkerCommand::Search`] makes it
//! play games against the shared tree until the round's [`AbortChecker`]
//! says stop; it then reports its statistics on the shared event channel.
//!
//! One game is: select a path from the root, expand the frontier node, run
//! the playouts, then update the nodes of the path. Without `lock_free`,
//! selection and update run under the structural lock; expansion never
//! does and is serialized per node by its expansion claim.

use super::abort::AbortChecker;
use super::policy::Policy;
use crate::config::SearchConfig;
use crate::error::TreeError;
use crate::game::{GameInfo, LeafValue, ThreadState};
use crate::node::{Move, MoveInfo, NodeId, ProvenType};
use crate::stats::SearchStat;
use crate::sync::RunSynchronizer;
use crate::tree::SearchTree;
use log::{trace, warn};
use parking_lot::{ReentrantMutex, RwLock};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Barrier};
use std::time::Instant;

/// Everything a worker needs for one search round.
pub(crate) struct SearchJob<G> {
    pub(crate) root: G,
    pub(crate) tree: Arc<RwLock<SearchTree>>,
    pub(crate) checker: Arc<AbortChecker>,
    /// Shared with the controller; released once every worker is ready.
    pub(crate) barrier: Arc<Barrier>,
}

pub(crate) enum WorkerCommand<G> {
    Search(Arc<SearchJob<G>>),
    Shutdown,
}

pub(crate) enum WorkerEvent {
    Finished {
        thread_id: usize,
        result: Result<SearchStat, TreeError>,
    },
}

pub(crate) struct Worker<G> {
    id: usize,
    config: Arc<SearchConfig>,
    state: Box<dyn ThreadState<G>>,
    sync: Arc<dyn RunSynchronizer>,
    structural: Arc<ReentrantMutex<()>>,
    info: GameInfo,
    moves: Vec<MoveInfo>,
    first_play: HashMap<Move, usize>,
    stat: SearchStat,
}

impl<G> Worker<G> {
    pub(crate) fn new(
        id: usize,
        config: Arc<SearchConfig>,
        state: Box<dyn ThreadState<G>>,
        sync: Arc<dyn RunSynchronizer>,
        structural: Arc<ReentrantMutex<()>>,
    ) -> Self {
        Self {
            id,
            config,
            state,
            sync,
            structural,
            info: GameInfo::default(),
            moves: Vec::new(),
            first_play: HashMap::new(),
            stat: SearchStat::default(),
        }
    }

    /// Worker main loop. Returns on shutdown or when the controller is gone.
    pub(crate) fn run(mut self, commands: Receiver<WorkerCommand<G>>, events: Sender<WorkerEvent>) {
        while let Ok(command) = commands.recv() {
            match command {
                WorkerCommand::Search(job) => {
                    let result = self.search(&job);
                    let event = WorkerEvent::Finished {
                        thread_id: self.id,
                        result,
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                WorkerCommand::Shutdown => break,
            }
        }
        trace!("worker {} stopped", self.id);
    }

    fn search(&mut self, job: &SearchJob<G>) -> Result<SearchStat, TreeError> {
        job.barrier.wait();
        let start = Instant::now();
        self.stat.clear();
        self.sync.on_thread_start(self.id);
        let result = {
            let tree = job.tree.read();
            self.state.start_search(&job.root);
            self.play_games(&tree, &job.checker)
        };
        self.stat.time = start.elapsed();
        self.sync.on_thread_end(self.id);
        result.map(|()| std::mem::take(&mut self.stat))
    }

    fn play_games(&mut self, tree: &SearchTree, checker: &AbortChecker) -> Result<(), TreeError> {
        let config = Arc::clone(&self.config);
        let policy = Policy::new(&config);
        let mut since_check = 0;
        while let Some(game_index) = checker.start_game() {
            if let Err(e) = self.play_game(tree, checker, &policy, game_index) {
                checker.halt();
                return Err(e);
            }
            since_check += 1;
            if since_check >= config.check_interval {
                since_check = 0;
                checker.check(tree);
            }
        }
        Ok(())
    }

    fn play_game(
        &mut self,
        tree: &SearchTree,
        checker: &AbortChecker,
        policy: &Policy<'_>,
        game_index: u64,
    ) -> Result<(), TreeError> {
        self.info.clear(self.config.number_playouts);
        self.state.game_start();
        let structural = Arc::clone(&self.structural);
        {
            let _guard = (!self.config.lock_free).then(|| structural.lock());
            self.select(tree, policy, game_index);
        }
        let leaf = self.info.nodes.last().copied().unwrap_or(NodeId::ROOT);
        self.expand(tree, checker, leaf)?;
        let leaf_proven = tree.node(leaf).proven();
        self.play_playouts(leaf_proven);
        let in_tree = self.info.in_tree_sequence.len();
        self.state.take_back_in_tree(in_tree);

        let discarded = !self.info.failed && checker.discard_running_games();
        {
            let _guard = (!self.config.lock_free).then(|| structural.lock());
            if self.info.failed || discarded {
                self.remove_virtual_loss(tree);
            } else {
                self.update_values(tree);
                if self.config.rave {
                    self.update_rave(tree);
                }
                if leaf_proven != ProvenType::None {
                    propagate_proven(tree, &self.info.nodes);
                }
            }
        }
        if discarded {
            return Ok(());
        }
        if !self.info.failed {
            self.sync.on_iteration(game_index, self.id, &self.info);
        }
        self.stat.record(&self.info);
        Ok(())
    }

    /// Descends from the root until a node without children or a proven
    /// node is reached, adding virtual loss along the way.
    fn select(&mut self, tree: &SearchTree, policy: &Policy<'_>, game_index: u64) {
        let mut current = NodeId::ROOT;
        self.info.nodes.push(current);
        loop {
            let node = tree.node(current);
            if node.is_proven() || !node.has_children() {
                return;
            }
            if self.info.in_tree_sequence.len() >= self.config.max_game_length {
                return;
            }
            let depth = self.info.in_tree_sequence.len();
            let Some(child_id) = policy.select_child(tree, current, game_index, depth) else {
                return;
            };
            let child = tree.node(child_id);
            if self.config.virtual_loss {
                child.add_virtual_loss();
            }
            let mv = child.mv();
            self.state.execute(mv);
            self.info.in_tree_sequence.push(mv);
            self.info.nodes.push(child_id);
            current = child_id;
        }
    }

    /// Materializes the children of the frontier node.
    ///
    /// Skipped below the expand threshold, when another worker holds the
    /// node's expansion claim, and when this worker's allocator is full; in
    /// all these cases the node is evaluated as a leaf.
    fn expand(&mut self, tree: &SearchTree, checker: &AbortChecker, id: NodeId) -> Result<(), TreeError> {
        let node = tree.node(id);
        if node.has_children() || node.is_proven() {
            return Ok(());
        }
        if !id.is_root() && node.move_count() < self.config.expand_threshold {
            return Ok(());
        }
        if !node.try_begin_expansion() {
            return Ok(());
        }
        if node.has_children() {
            node.end_expansion();
            return Ok(());
        }
        let proven = self.state.generate_all_moves(&mut self.moves);
        let result = if self.moves.is_empty() {
            if proven != ProvenType::None {
                trace!("worker {}: {:?} is terminal ({:?})", self.id, id, proven);
                node.set_proven(proven);
            }
            Ok(())
        } else {
            match tree.create_children(self.id, id, &self.moves) {
                Ok(()) => {
                    trace!("worker {}: expanded {:?} ({} children)", self.id, id, self.moves.len());
                    Ok(())
                }
                Err(TreeError::CapacityExceeded { .. }) => {
                    if self.config.prune_full_tree && tree.node_count() > 0 {
                        checker.request_prune();
                    } else if checker.first_full_warning() {
                        warn!(
                            "search tree full ({} nodes), evaluating leaves without expansion",
                            tree.max_nodes()
                        );
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };
        node.end_expansion();
        result
    }

    /// Runs `number_playouts` playouts from the leaf and stores their
    /// values from the root player's point of view.
    fn play_playouts(&mut self, leaf_proven: ProvenType) {
        let in_tree = self.info.in_tree_sequence.len();
        for p in 0..self.config.number_playouts {
            self.info.sequence[p].extend_from_slice(&self.info.in_tree_sequence);
            self.info.skip_rave_update[p].resize(in_tree, false);
            let mut aborted = false;
            let value = match leaf_proven {
                ProvenType::Win => 1.0,
                ProvenType::Loss => 0.0,
                ProvenType::None => {
                    self.state.start_playout();
                    let mut length = in_tree;
                    while let Some(next) = self.state.generate_playout_move() {
                        if length >= self.config.max_game_length {
                            aborted = true;
                            break;
                        }
                        self.state.execute_playout(next.mv);
                        self.info.sequence[p].push(next.mv);
                        self.info.skip_rave_update[p].push(next.skip_rave_update);
                        length += 1;
                    }
                    let value = if aborted {
                        Some(0.5)
                    } else {
                        match self.state.evaluate() {
                            LeafValue::Value(v) => Some(v),
                            LeafValue::Failed => None,
                        }
                    };
                    self.state.end_playout();
                    self.state.take_back_playout(length - in_tree);
                    match value {
                        Some(v) => v,
                        None => {
                            self.info.failed = true;
                            return;
                        }
                    }
                }
            };
            // The evaluated position has the root player to move after an
            // even number of moves.
            let length = self.info.sequence[p].len();
            self.info.eval[p] = if length % 2 == 0 { value } else { 1.0 - value };
            self.info.aborted[p] = aborted;
        }
    }

    fn remove_virtual_loss(&self, tree: &SearchTree) {
        if !self.config.virtual_loss {
            return;
        }
        for &id in self.info.nodes.iter().skip(1) {
            tree.node(id).remove_virtual_loss();
        }
    }

    /// Adds the game result to every node of the path. Nodes at even depth
    /// (the root included) store the inverse of the root player's value.
    fn update_values(&self, tree: &SearchTree) {
        let single = self.config.update_multiple_playouts_as_single || self.info.eval.len() == 1;
        for (depth, &id) in self.info.nodes.iter().enumerate() {
            let node = tree.node(id);
            let perspective = |v: f64| if depth % 2 == 0 { 1.0 - v } else { v };
            if single {
                node.add_game_result(perspective(self.info.mean_eval()), 1.0);
                node.inc_pos_count(1.0);
            } else {
                for &v in &self.info.eval {
                    node.add_game_result(perspective(v), 1.0);
                }
                node.inc_pos_count(self.info.eval.len() as f64);
            }
            if depth > 0 && self.config.virtual_loss {
                node.remove_virtual_loss();
            }
        }
    }

    /// All-moves update: every child of a path node whose move was later
    /// played by the same player gets the game result, weighted by how
    /// early the move occurred if `weight_rave_updates` is set.
    fn update_rave(&mut self, tree: &SearchTree) {
        for p in 0..self.info.eval.len() {
            let sequence = &self.info.sequence[p];
            let skip = &self.info.skip_rave_update[p];
            let length = sequence.len();
            let root_value = self.info.eval[p];
            for (i, &id) in self.info.nodes.iter().enumerate() {
                if i >= length {
                    break;
                }
                if !tree.node(id).has_children() {
                    continue;
                }
                let value = if i % 2 == 0 { root_value } else { 1.0 - root_value };
                self.first_play.clear();
                for j in (i..length).step_by(2) {
                    if !skip[j] {
                        self.first_play.entry(sequence[j]).or_insert(j);
                    }
                }
                for (_, child) in tree.children(id) {
                    if let Some(&j) = self.first_play.get(&child.mv()) {
                        let weight = if self.config.weight_rave_updates {
                            2.0 - (j - i) as f64 / (length - i) as f64
                        } else {
                            1.0
                        };
                        child.add_rave_value(value, weight);
                    }
                }
            }
        }
    }
}

/// Propagates proven status from the end of `path` towards the root.
///
/// A node is a win for its player to move if some child is a loss for the
/// opponent, and a loss if every child is a win. Stops at the first node
/// whose status cannot be decided.
pub(crate) fn propagate_proven(tree: &SearchTree, path: &[NodeId]) {
    for &id in path.iter().rev().skip(1) {
        let node = tree.node(id);
        if !node.has_children() {
            break;
        }
        let mut all_win = true;
        let mut any_loss = false;
        for (_, child) in tree.children(id) {
            match child.proven() {
                ProvenType::Loss => {
                    any_loss = true;
                    break;
                }
                ProvenType::Win => {}
                ProvenType::None => all_win = false,
            }
        }
        let status = if any_loss {
            ProvenType::Win
        } else if all_win {
            ProvenType::Loss
        } else {
            break;
        };
        node.set_proven(status);
    }
}
