//! Error types for configuration, tree structure, evaluation and search.

use thiserror::Error;

/// Rejected configuration, reported before any worker thread starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("number of threads must be at least 1")]
    ZeroThreads,

    #[error("node capacity must be at least 1 per thread (max_nodes={max_nodes}, threads={threads})")]
    InsufficientCapacity { max_nodes: usize, threads: usize },

    #[error("number of playouts per game must be at least 1")]
    ZeroPlayouts,

    #[error("maximum game length must be at least 1")]
    ZeroGameLength,

    #[error("check interval must be at least 1")]
    ZeroCheckInterval,

    #[error("invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("too many threads: {0} (at most {max})", max = crate::node::MAX_ALLOCATORS)]
    TooManyThreads(usize),
}

/// Structural errors of the search tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    #[error("allocator capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded { requested: usize, available: usize },

    #[error("tree inconsistent: {0}")]
    Inconsistent(String),

    #[error("trees differ in shape (allocators or capacity)")]
    ShapeMismatch,

    #[error("node is not a child of the given parent")]
    NotAChild,

    #[error("node has no children")]
    NotExpanded,
}

/// Failure reported by an external evaluator for a single position.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("evaluation failed: {0}")]
    Failed(String),

    #[error("evaluation timed out")]
    Timeout,

    #[error("evaluator disconnected")]
    Disconnected,
}

/// Errors returned by the search controller.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("a search worker stopped responding")]
    WorkerLost,

    #[error("cannot start worker pool: {0}")]
    ThreadPool(String),
}
