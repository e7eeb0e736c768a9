//! # Simulator Contract and Thread States
//!
//! The search never looks inside a game. It talks to one [`ThreadState`] per
//! worker, which walks a private copy of the game in lock-step with the
//! shared tree:
//!
//! ```text
//!   game_start ─► execute (in tree) ... ─► generate_all_moves (expand)
//!        ─► start_playout ─► generate_playout_move / execute_playout ...
//!        ─► evaluate ─► end_playout ─► take_back_playout ─► take_back_in_tree
//! ```
//!
//! Most games only need to implement [`GameState`]; [`SimulatorState`]
//! adapts any `GameState` into a `ThreadState` with random playouts and an
//! optional [`Evaluator`] for priors and leaf values.

use crate::evaluator::Evaluator;
use crate::node::{Color, Move, MoveInfo, NodeId, ProvenType};
use log::trace;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::marker::PhantomData;
use std::sync::Arc;

/// Rules of a two-player game, as seen by the search.
/// `Send` and `Sync` are required because every worker keeps its own copy.
pub trait GameState: Clone + Send + Sync + 'static {
    /// All legal moves of the player to move. Empty iff the game is over.
    fn legal_moves(&self) -> Vec<Move>;

    /// Applies a legal move for the player to move.
    fn apply_move(&mut self, mv: Move);

    fn is_terminal(&self) -> bool;

    fn to_play(&self) -> Color;

    /// Value of a finished game in `[0, 1]` for the player to move.
    fn final_score(&self) -> f64;

    /// Move of the default rollout policy, `None` if the game is over.
    fn playout_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Move> {
        let moves = self.legal_moves();
        if moves.is_empty() {
            None
        } else {
            Some(moves[rng.random_range(0..moves.len())])
        }
    }
}

/// Game-theoretic status of a finished game for the player to move.
pub fn proven_from_score(score: f64) -> ProvenType {
    if score >= 1.0 {
        ProvenType::Win
    } else if score <= 0.0 {
        ProvenType::Loss
    } else {
        ProvenType::None
    }
}

/// Result of evaluating the end position of a playout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LeafValue {
    /// Value in `[0, 1]` for the player to move.
    Value(f64),
    /// The evaluator could not produce a value; the game is discarded.
    Failed,
}

/// One move of the playout policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayoutMove {
    pub mv: Move,
    /// Do not use this move for all-moves (RAVE) updates.
    pub skip_rave_update: bool,
}

impl PlayoutMove {
    pub fn new(mv: Move) -> Self {
        Self {
            mv,
            skip_rave_update: false,
        }
    }
}

/// Record of one game of one worker.
#[derive(Debug, Clone, Default)]
pub struct GameInfo {
    /// Tree nodes visited, root first.
    pub nodes: Vec<NodeId>,
    /// Moves played inside the tree.
    pub in_tree_sequence: Vec<Move>,
    /// Per playout: in-tree moves followed by playout moves.
    pub sequence: Vec<Vec<Move>>,
    /// Per playout: parallel to `sequence`.
    pub skip_rave_update: Vec<Vec<bool>>,
    /// Per playout: value for the player to move at the root.
    pub eval: Vec<f64>,
    /// Per playout: the game hit the length limit before it ended.
    pub aborted: Vec<bool>,
    /// The evaluator failed; the game carries no result.
    pub failed: bool,
}

impl GameInfo {
    pub fn clear(&mut self, number_playouts: usize) {
        self.nodes.clear();
        self.in_tree_sequence.clear();
        self.sequence.resize_with(number_playouts, Vec::new);
        self.skip_rave_update.resize_with(number_playouts, Vec::new);
        for seq in &mut self.sequence {
            seq.clear();
        }
        for skip in &mut self.skip_rave_update {
            skip.clear();
        }
        self.eval.clear();
        self.eval.resize(number_playouts, 0.0);
        self.aborted.clear();
        self.aborted.resize(number_playouts, false);
        self.failed = false;
    }

    /// Mean evaluation over all playouts.
    pub fn mean_eval(&self) -> f64 {
        if self.eval.is_empty() {
            0.5
        } else {
            self.eval.iter().sum::<f64>() / self.eval.len() as f64
        }
    }

    /// Number of moves of the longest playout.
    pub fn game_length(&self) -> usize {
        self.sequence
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(self.in_tree_sequence.len())
    }
}

/// Per-worker simulation context. Owned exclusively by one worker.
pub trait ThreadState<G>: Send {
    /// Called once per search with the root position.
    fn start_search(&mut self, root: &G);

    /// Resets the simulation to the root position.
    fn game_start(&mut self);

    /// Plays a move inside the tree.
    fn execute(&mut self, mv: Move);

    /// Fills `moves` with the children of the current position.
    ///
    /// # Returns
    /// The proven status of the current position if the game is over
    /// (then `moves` stays empty).
    fn generate_all_moves(&mut self, moves: &mut Vec<MoveInfo>) -> ProvenType;

    fn start_playout(&mut self);

    /// Next playout move, `None` when the playout is finished.
    fn generate_playout_move(&mut self) -> Option<PlayoutMove>;

    fn execute_playout(&mut self, mv: Move);

    /// Value of the current position for the player to move.
    fn evaluate(&mut self) -> LeafValue;

    fn end_playout(&mut self);

    /// Undoes the last `n` playout moves.
    fn take_back_playout(&mut self, n: usize);

    /// Undoes the last `n` in-tree moves.
    fn take_back_in_tree(&mut self, n: usize);
}

/// Creates the thread states of the workers.
pub trait ThreadStateFactory<G>: Send + Sync {
    fn create(&self, thread_id: usize, seed: u64) -> Box<dyn ThreadState<G>>;
}

/// [`ThreadState`] over any [`GameState`].
///
/// Without an evaluator, leaves are scored by random playouts. With one,
/// expansion asks it for priors and the leaf value, and no playout moves
/// are generated.
pub struct SimulatorState<G: GameState> {
    thread_id: usize,
    root: Option<G>,
    state: Option<G>,
    leaf: Option<G>,
    rng: Xoshiro256PlusPlus,
    evaluator: Option<Arc<dyn Evaluator<G>>>,
    cached_value: Option<f64>,
}

impl<G: GameState> SimulatorState<G> {
    pub fn new(thread_id: usize, seed: u64, evaluator: Option<Arc<dyn Evaluator<G>>>) -> Self {
        Self {
            thread_id,
            root: None,
            state: None,
            leaf: None,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            evaluator,
            cached_value: None,
        }
    }

    /// Current position; `None` before the first search.
    pub fn state(&self) -> Option<&G> {
        self.state.as_ref()
    }

    fn state_mut(&mut self) -> Option<&mut G> {
        self.cached_value = None;
        self.state.as_mut()
    }
}

impl<G: GameState> ThreadState<G> for SimulatorState<G> {
    fn start_search(&mut self, root: &G) {
        self.root = Some(root.clone());
        self.game_start();
    }

    fn game_start(&mut self) {
        self.state = self.root.clone();
        self.leaf = None;
        self.cached_value = None;
    }

    fn execute(&mut self, mv: Move) {
        if let Some(state) = self.state_mut() {
            state.apply_move(mv);
        }
    }

    fn generate_all_moves(&mut self, moves: &mut Vec<MoveInfo>) -> ProvenType {
        moves.clear();
        let Some(state) = self.state.as_ref() else {
            return ProvenType::None;
        };
        if state.is_terminal() {
            return proven_from_score(state.final_score());
        }
        let legal = state.legal_moves();
        let uniform = 1.0 / legal.len().max(1) as f64;
        match self.evaluator.as_ref().map(|e| e.evaluate(state)) {
            Some(Ok(evaluation)) => {
                moves.extend(
                    legal
                        .iter()
                        .map(|&mv| MoveInfo::with_prior(mv, evaluation.prior_of(mv))),
                );
                self.cached_value = Some(evaluation.value);
            }
            Some(Err(e)) => {
                trace!("thread {}: expansion without priors: {}", self.thread_id, e);
                moves.extend(legal.iter().map(|&mv| MoveInfo::with_prior(mv, uniform)));
            }
            None => {
                moves.extend(legal.iter().map(|&mv| MoveInfo::with_prior(mv, uniform)));
            }
        }
        ProvenType::None
    }

    fn start_playout(&mut self) {
        self.leaf = self.state.clone();
    }

    fn generate_playout_move(&mut self) -> Option<PlayoutMove> {
        if self.evaluator.is_some() {
            return None;
        }
        let state = self.state.as_ref()?;
        if state.is_terminal() {
            return None;
        }
        state.playout_move(&mut self.rng).map(PlayoutMove::new)
    }

    fn execute_playout(&mut self, mv: Move) {
        if let Some(state) = self.state_mut() {
            state.apply_move(mv);
        }
    }

    fn evaluate(&mut self) -> LeafValue {
        let Some(state) = self.state.as_ref() else {
            return LeafValue::Failed;
        };
        if state.is_terminal() {
            return LeafValue::Value(state.final_score());
        }
        if let Some(value) = self.cached_value {
            return LeafValue::Value(value);
        }
        match self.evaluator.as_ref().map(|e| e.evaluate(state)) {
            Some(Ok(evaluation)) => LeafValue::Value(evaluation.value),
            Some(Err(e)) => {
                trace!("thread {}: evaluation failed: {}", self.thread_id, e);
                LeafValue::Failed
            }
            None => LeafValue::Value(0.5),
        }
    }

    fn end_playout(&mut self) {}

    fn take_back_playout(&mut self, n: usize) {
        if n > 0 {
            self.state = self.leaf.clone();
        }
    }

    fn take_back_in_tree(&mut self, n: usize) {
        if n > 0 {
            self.state = self.root.clone();
            self.cached_value = None;
        }
    }
}

/// Creates [`SimulatorState`]s, optionally sharing one evaluator.
pub struct SimulatorFactory<G: GameState> {
    evaluator: Option<Arc<dyn Evaluator<G>>>,
    _game: PhantomData<fn() -> G>,
}

impl<G: GameState> Default for SimulatorFactory<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: GameState> SimulatorFactory<G> {
    pub fn new() -> Self {
        Self {
            evaluator: None,
            _game: PhantomData,
        }
    }

    pub fn with_evaluator(evaluator: Arc<dyn Evaluator<G>>) -> Self {
        Self {
            evaluator: Some(evaluator),
            _game: PhantomData,
        }
    }
}

impl<G: GameState> ThreadStateFactory<G> for SimulatorFactory<G> {
    fn create(&self, thread_id: usize, seed: u64) -> Box<dyn ThreadState<G>> {
        Box::new(SimulatorState::new(thread_id, seed, self.evaluator.clone()))
    }
}
