//! Multi-threaded searches: agreement with single-threaded runs and tree
//! consistency under concurrent updates.

use std::sync::Arc;
use uct::games::connect4::Connect4State;
use uct::{MoveSelect, NodeId, SearchConfig, SearchTree, SimulatorFactory, UctSearch};

const GAMES: u64 = 4000;

fn run(threads: usize, lock_free: bool) -> UctSearch<Connect4State> {
    let config = SearchConfig::for_testing()
        .with_threads(threads)
        .with_max_games(GAMES)
        .with_move_select(MoveSelect::Value)
        .with_lock_free(lock_free)
        .with_seed(11);
    let mut search =
        UctSearch::new(config, Arc::new(SimulatorFactory::<Connect4State>::new())).unwrap();
    let result = search.search(&Connect4State::standard()).unwrap();
    assert_eq!(result.games, GAMES);
    search
}

fn assert_no_virtual_loss(tree: &SearchTree, id: NodeId) {
    for (child_id, child) in tree.children(id) {
        assert_eq!(child.virtual_loss_count(), 0, "virtual loss left on {:?}", child_id);
        assert_no_virtual_loss(tree, child_id);
    }
}

#[test]
fn test_lock_free_root_counts_agree_across_thread_counts() {
    let single = run(1, true);
    let parallel = run(8, true);

    let single_count = single.tree().root().move_count();
    let parallel_count = parallel.tree().root().move_count();
    assert_eq!(single_count, GAMES as f64);
    let relative = (single_count - parallel_count).abs() / single_count;
    assert!(
        relative < 0.1,
        "root counts differ: {} vs {}",
        single_count,
        parallel_count
    );
    for count in [single_count, parallel_count] {
        assert!(count > 0.0 && count <= GAMES as f64);
    }

    single.check_consistency().unwrap();
    parallel.check_consistency().unwrap();
    assert_no_virtual_loss(&parallel.tree(), NodeId::ROOT);
}

#[test]
fn test_locked_updates_are_exact() {
    let search = run(4, false);
    let tree = search.tree();
    assert_eq!(tree.root().move_count(), GAMES as f64);
    let visits: f64 = tree.children(NodeId::ROOT).map(|(_, c)| c.move_count()).sum();
    assert_eq!(visits, GAMES as f64);
    assert_no_virtual_loss(&tree, NodeId::ROOT);
    tree.check_consistency().unwrap();
}

