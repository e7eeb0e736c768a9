//! Full searches on games with known solutions.

use std::sync::Arc;
use uct::game_wrapper::{GameKind, GameWrapper};
use uct::games::connect4::Connect4State;
use uct::games::two_move::TwoMoveState;
use uct::{GameState, Move, MoveSelect, SearchConfig, SimulatorFactory, UctSearch};

#[test]
fn test_two_move_game_converges_to_minimax_move() {
    let config = SearchConfig::for_testing()
        .with_threads(1)
        .with_max_games(1000)
        .with_move_select(MoveSelect::Value)
        .with_seed(7);
    let mut search =
        UctSearch::new(config, Arc::new(SimulatorFactory::<TwoMoveState>::new())).unwrap();
    let game = TwoMoveState::new();
    let (optimal_move, optimal_value) = game.optimal();

    let result = search.search(&game).unwrap();
    assert_eq!(result.games, 1000);
    assert_eq!(result.best_move, Some(optimal_move));
    assert!(
        (result.value - optimal_value).abs() < 0.1,
        "value {} too far from {}",
        result.value,
        optimal_value
    );

    let stats = search.root_child_stats();
    let total: f64 = stats.iter().map(|c| c.count).sum();
    let best = stats.iter().find(|c| c.mv == optimal_move).unwrap();
    assert!(
        best.count >= 0.9 * total,
        "optimal move got {} of {} visits",
        best.count,
        total
    );
}

#[test]
fn test_finds_immediate_connect4_win() {
    let mut game = Connect4State::standard();
    for col in [0, 0, 1, 1, 2, 6] {
        game.apply_move(Move(col));
    }
    let config = SearchConfig::for_testing().with_threads(2).with_max_games(2000);
    let mut search =
        UctSearch::new(config, Arc::new(SimulatorFactory::<Connect4State>::new())).unwrap();

    let result = search.search(&game).unwrap();
    assert_eq!(result.best_move, Some(Move(3)));
    assert!(result.value > 0.9);
}

#[test]
fn test_rave_search_on_wrapped_game() {
    let config = SearchConfig::for_testing()
        .with_threads(2)
        .with_max_games(2000)
        .with_rave(0.9, 20_000.0);
    let mut search =
        UctSearch::new(config, Arc::new(SimulatorFactory::<GameWrapper>::new())).unwrap();
    let game = GameWrapper::new(GameKind::Connect4);

    let result = search.search(&game).unwrap();
    assert!(result.best_move.is_some());
    assert!(!result.sequence.is_empty());
    assert!(search
        .root_child_stats()
        .iter()
        .all(|c| c.rave_value.is_some()));
}

#[test]
fn test_self_play_reuses_tree_until_game_end() {
    let config = SearchConfig::for_testing()
        .with_threads(2)
        .with_max_games(300);
    let mut search =
        UctSearch::new(config, Arc::new(SimulatorFactory::<GameWrapper>::new())).unwrap();
    let mut game = GameWrapper::new(GameKind::Nim);

    let mut moves = 0;
    while !game.is_terminal() {
        let mv = search.search(&game).unwrap().best_move.unwrap();
        assert!(game.legal_moves().contains(&mv));
        game.apply_move(mv);
        search.advance_root(&[mv]).unwrap();
        moves += 1;
        assert!(moves <= 21);
    }
    search.check_consistency().unwrap();
}
