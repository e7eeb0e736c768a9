//! Search configuration.
//!
//! A [`SearchConfig`] is captured as an immutable snapshot when the worker
//! pool starts. Changing it requires
//! [`UctSearch::reconfigure`](crate::search::UctSearch::reconfigure), which
//! stops the workers, validates the new values and restarts the pool.

use crate::error::ConfigError;
use crate::node::MAX_ALLOCATORS;
use std::time::Duration;

/// Criterion for choosing the final move at the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MoveSelect {
    /// Highest mean value.
    Value,
    /// Most visits.
    Count,
    /// Highest lower confidence bound, `mean - bound`.
    Bound,
    /// Mean blended with the prior.
    PriorBlend,
    /// The selection estimate without exploration bonus.
    Estimate,
}

/// Value estimate used in the selection formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ValueEstimate {
    /// Raw mean of the child.
    Mean,
    /// Mean blended with the all-moves (RAVE) value.
    Rave,
    /// Mean blended with the prior by a decaying pseudo-count.
    PriorBlend,
}

/// Exploration bonus added to the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BoundKind {
    None,
    /// `C * sqrt(ln(parent) / child)`
    Ucb,
    /// `C * prior * sqrt(parent) / (1 + child)`
    Puct,
}

/// Parameters of the early-abort heuristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarlyAbortParam {
    /// Root value above which the outcome is considered decided.
    pub threshold: f64,
    /// Games needed at the root before the threshold is trusted.
    pub min_games: f64,
    /// The game budget is divided by this factor when the heuristic fires.
    pub reduction_factor: f64,
}

impl Default for EarlyAbortParam {
    fn default() -> Self {
        Self {
            threshold: 0.9,
            min_games: 1000.0,
            reduction_factor: 3.0,
        }
    }
}

/// Configuration for the parallel UCT search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Number of worker threads, and allocators.
    pub num_threads: usize,

    /// Total node capacity, split evenly across the allocators.
    pub max_nodes: usize,

    /// Playouts started from each frontier node.
    pub number_playouts: usize,

    /// Average the playouts of one game into a single update instead of
    /// adding each result.
    pub update_multiple_playouts_as_single: bool,

    /// Longest game (in-tree plus playout moves) a worker simulates.
    pub max_game_length: usize,

    /// Default game budget of a search.
    pub max_games: u64,

    /// Default time budget of a search.
    pub max_time: Option<Duration>,

    pub move_select: MoveSelect,
    pub estimate: ValueEstimate,
    pub bound: BoundKind,

    /// Exploration constant `C` of the bound.
    pub exploration_constant: f64,

    /// Maintain all-moves-as-first (RAVE) statistics.
    pub rave: bool,
    /// RAVE weight when a child has no visits. Larger trusts RAVE longer.
    pub rave_weight_initial: f64,
    /// RAVE count at which the RAVE weight has decayed to one half.
    pub rave_weight_final: f64,
    /// Weight RAVE updates so that moves closer to the node count more.
    pub weight_rave_updates: bool,

    /// Pseudo-count given to the prior in the prior blend.
    pub prior_weight: f64,
    /// Visit count over which the prior pseudo-count decays by half.
    pub prior_decay: f64,

    /// Selection value of unvisited children.
    pub first_play_urgency: f64,

    pub virtual_loss: bool,

    /// Update statistics without the structural lock. See
    /// [`AtomicStatistics`](crate::value::AtomicStatistics) for the bound on
    /// lost updates.
    pub lock_free: bool,

    pub early_abort: Option<EarlyAbortParam>,

    /// Bias correction constant; 0 disables the term.
    pub bias_term_constant: f64,
    /// The bias term is used in every n-th game.
    pub bias_term_frequency: u64,
    /// Deepest tree level receiving the bias term; 0 means every level.
    pub bias_term_depth: usize,

    /// Visits a frontier node needs before it is expanded.
    pub expand_threshold: f64,

    /// Games between two abort checks of one worker.
    pub check_interval: u64,

    /// Prune the tree instead of stopping expansion when it is full.
    pub prune_full_tree: bool,
    /// Initial visit threshold when pruning a full tree.
    pub prune_min_count: f64,

    /// Interval of the progress log line; `None` disables it.
    pub report_interval: Option<Duration>,

    /// Verify the tree structure after every search.
    pub check_consistency: bool,

    /// Seed of the per-worker random generators; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_threads: 1,
            max_nodes: 1_000_000,
            number_playouts: 1,
            update_multiple_playouts_as_single: true,
            max_game_length: 1000,
            max_games: u64::MAX,
            max_time: None,
            move_select: MoveSelect::Count,
            estimate: ValueEstimate::Mean,
            bound: BoundKind::Ucb,
            exploration_constant: 0.7,
            rave: false,
            rave_weight_initial: 0.9,
            rave_weight_final: 20_000.0,
            weight_rave_updates: true,
            prior_weight: 10.0,
            prior_decay: 100.0,
            first_play_urgency: 10_000.0,
            virtual_loss: true,
            lock_free: false,
            early_abort: None,
            bias_term_constant: 0.0,
            bias_term_frequency: 1,
            bias_term_depth: 0,
            expand_threshold: 1.0,
            check_interval: 100,
            prune_full_tree: true,
            prune_min_count: 16.0,
            report_interval: Some(Duration::from_secs(10)),
            check_consistency: cfg!(debug_assertions),
            seed: None,
        }
    }
}

impl SearchConfig {
    /// Create a small, deterministic config for testing.
    pub fn for_testing() -> Self {
        Self {
            max_nodes: 100_000,
            max_games: 1000,
            report_interval: None,
            check_consistency: true,
            check_interval: 10,
            seed: Some(1),
            ..Self::default()
        }
    }

    /// Create a config for AlphaZero-style search driven by evaluator priors.
    pub fn for_evaluator() -> Self {
        Self {
            estimate: ValueEstimate::Mean,
            bound: BoundKind::Puct,
            exploration_constant: 1.25,
            first_play_urgency: 0.5,
            number_playouts: 1,
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, n: usize) -> Self {
        self.num_threads = n;
        self
    }

    pub fn with_max_nodes(mut self, n: usize) -> Self {
        self.max_nodes = n;
        self
    }

    pub fn with_max_games(mut self, n: u64) -> Self {
        self.max_games = n;
        self
    }

    pub fn with_max_time(mut self, t: Duration) -> Self {
        self.max_time = Some(t);
        self
    }

    pub fn with_number_playouts(mut self, n: usize) -> Self {
        self.number_playouts = n;
        self
    }

    pub fn with_move_select(mut self, select: MoveSelect) -> Self {
        self.move_select = select;
        self
    }

    pub fn with_estimate(mut self, estimate: ValueEstimate) -> Self {
        self.estimate = estimate;
        self
    }

    pub fn with_bound(mut self, bound: BoundKind, c: f64) -> Self {
        self.bound = bound;
        self.exploration_constant = c;
        self
    }

    /// Enables RAVE and selects the RAVE blend as estimate.
    pub fn with_rave(mut self, initial: f64, final_weight: f64) -> Self {
        self.rave = true;
        self.estimate = ValueEstimate::Rave;
        self.rave_weight_initial = initial;
        self.rave_weight_final = final_weight;
        self
    }

    pub fn with_first_play_urgency(mut self, fpu: f64) -> Self {
        self.first_play_urgency = fpu;
        self
    }

    pub fn with_virtual_loss(mut self, enabled: bool) -> Self {
        self.virtual_loss = enabled;
        self
    }

    pub fn with_lock_free(mut self, enabled: bool) -> Self {
        self.lock_free = enabled;
        self
    }

    pub fn with_early_abort(mut self, param: EarlyAbortParam) -> Self {
        self.early_abort = Some(param);
        self
    }

    pub fn with_bias_term(mut self, constant: f64, frequency: u64, depth: usize) -> Self {
        self.bias_term_constant = constant;
        self.bias_term_frequency = frequency;
        self.bias_term_depth = depth;
        self
    }

    pub fn with_expand_threshold(mut self, threshold: f64) -> Self {
        self.expand_threshold = threshold;
        self
    }

    pub fn with_prune_full_tree(mut self, enabled: bool, min_count: f64) -> Self {
        self.prune_full_tree = enabled;
        self.prune_min_count = min_count;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Nodes available to each allocator.
    pub fn nodes_per_allocator(&self) -> usize {
        self.max_nodes / self.num_threads.max(1)
    }

    /// Rejects configurations the search cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if self.num_threads > MAX_ALLOCATORS {
            return Err(ConfigError::TooManyThreads(self.num_threads));
        }
        if self.max_nodes < self.num_threads {
            return Err(ConfigError::InsufficientCapacity {
                max_nodes: self.max_nodes,
                threads: self.num_threads,
            });
        }
        if self.number_playouts == 0 {
            return Err(ConfigError::ZeroPlayouts);
        }
        if self.max_game_length == 0 {
            return Err(ConfigError::ZeroGameLength);
        }
        if self.check_interval == 0 {
            return Err(ConfigError::ZeroCheckInterval);
        }
        check_non_negative("exploration_constant", self.exploration_constant)?;
        check_non_negative("prior_weight", self.prior_weight)?;
        check_positive("prior_decay", self.prior_decay)?;
        check_non_negative("expand_threshold", self.expand_threshold)?;
        check_non_negative("bias_term_constant", self.bias_term_constant)?;
        check_positive("prune_min_count", self.prune_min_count)?;
        if self.first_play_urgency.is_nan() {
            return Err(ConfigError::InvalidParameter {
                name: "first_play_urgency",
                value: self.first_play_urgency,
            });
        }
        if self.bias_term_frequency == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "bias_term_frequency",
                value: 0.0,
            });
        }
        if self.rave {
            check_positive("rave_weight_initial", self.rave_weight_initial)?;
            check_positive("rave_weight_final", self.rave_weight_final)?;
        }
        if let Some(param) = &self.early_abort {
            if !(param.threshold > 0.0 && param.threshold <= 1.0) {
                return Err(ConfigError::InvalidParameter {
                    name: "early_abort.threshold",
                    value: param.threshold,
                });
            }
            check_non_negative("early_abort.min_games", param.min_games)?;
            if !(param.reduction_factor >= 1.0) {
                return Err(ConfigError::InvalidParameter {
                    name: "early_abort.reduction_factor",
                    value: param.reduction_factor,
                });
            }
        }
        Ok(())
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SearchConfig::default();
        assert_eq!(config.num_threads, 1);
        assert!(config.validate().is_ok());
        assert!(SearchConfig::for_testing().validate().is_ok());
        assert!(SearchConfig::for_evaluator().validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = SearchConfig::default()
            .with_threads(4)
            .with_max_nodes(4000)
            .with_bound(BoundKind::Puct, 1.5)
            .with_rave(0.5, 1000.0);
        assert_eq!(config.num_threads, 4);
        assert_eq!(config.nodes_per_allocator(), 1000);
        assert_eq!(config.bound, BoundKind::Puct);
        assert!((config.exploration_constant - 1.5).abs() < 1e-12);
        assert!(config.rave);
        assert_eq!(config.estimate, ValueEstimate::Rave);
    }

    #[test]
    fn test_rejects_zero_threads() {
        let config = SearchConfig::default().with_threads(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroThreads));
    }

    #[test]
    fn test_rejects_insufficient_capacity() {
        let config = SearchConfig::default().with_threads(8).with_max_nodes(4);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InsufficientCapacity {
                max_nodes: 4,
                threads: 8
            })
        );
        let config = SearchConfig::default().with_max_nodes(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let config = SearchConfig::default().with_number_playouts(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroPlayouts));

        let config = SearchConfig::default().with_bound(BoundKind::Ucb, -1.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter {
                name: "exploration_constant",
                ..
            })
        ));

        let config = SearchConfig::default().with_early_abort(EarlyAbortParam {
            reduction_factor: 0.5,
            ..EarlyAbortParam::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter {
                name: "early_abort.reduction_factor",
                ..
            })
        ));

        let config = SearchConfig::default().with_threads(MAX_ALLOCATORS + 1);
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooManyThreads(MAX_ALLOCATORS + 1))
        );
    }
}
