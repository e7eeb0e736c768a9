//! # Demonstration Games
//!
//! Small games implementing [`GameState`](crate::game::GameState), used by
//! the command line tools, the benchmark and the tests.
//!
//! ## Included Games
//! - **Connect 4**: gravity-based connection game with configurable board
//! - **Nim**: single-heap Nim, whose winning moves are known in closed form
//! - **Two-Move**: two-ply synthetic game with a payoff table
//!
//! ## Adding New Games
//! To add a new game, create a new module, implement `GameState` for its
//! state type and add a variant to
//! [`GameWrapper`](crate::game_wrapper::GameWrapper).

pub mod connect4;
pub mod nim;
pub mod two_move;
