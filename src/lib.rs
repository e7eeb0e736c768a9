//! # Parallel UCT Search
//!
//! A multi-threaded Monte Carlo Tree Search engine. Worker threads share one
//! arena-allocated search tree and repeatedly select a path with a UCT
//! policy, expand the frontier node, score it with playouts or an external
//! evaluator, and add the result to every node of the path.
//!
//! ## Architecture
//! ```text
//! ┌──────────────┐  commands   ┌──────────────┐  games   ┌──────────────┐
//! │  UctSearch   │────────────►│ Worker × N   │─────────►│ ThreadState  │
//! │ (controller) │◄────────────│ (rayon pool) │          │ (simulator)  │
//! └──────┬───────┘   events    └──────┬───────┘          └──────────────┘
//!        │                            │ read/update
//!        ▼                            ▼
//! ┌──────────────────────────────────────────────┐
//! │ SearchTree: root + one NodeAllocator/worker  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//! - [`value`]: running mean accumulators
//! - [`node`], [`allocator`], [`tree`]: the search tree and its arena
//! - [`search`]: controller, workers, selection policy and abort logic
//! - [`game`], [`evaluator`]: simulator and evaluator contracts
//! - [`games`], [`game_wrapper`]: demonstration games

pub mod allocator;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod game;
pub mod game_wrapper;
pub mod games;
pub mod node;
pub mod search;
pub mod stats;
pub mod sync;
pub mod tree;
pub mod value;

pub use config::{BoundKind, EarlyAbortParam, MoveSelect, SearchConfig, ValueEstimate};
pub use error::{ConfigError, EvalError, SearchError, TreeError};
pub use game::{GameState, SimulatorFactory, ThreadState, ThreadStateFactory};
pub use node::{Color, Move, NodeId, ProvenType};
pub use search::{AbortHandle, AbortReason, SearchResult, UctSearch};
pub use tree::SearchTree;
