use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use uct::game_wrapper::{GameKind, GameWrapper};
use uct::stats::SearchStat;
use uct::{SearchConfig, SimulatorFactory, UctSearch};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Game to search (default: connect4)
    #[arg(long, value_enum, default_value_t = GameKind::Connect4)]
    game: GameKind,

    /// Search duration in seconds per run (default: 5)
    #[arg(long, default_value_t = 5)]
    duration: u64,

    /// Thread counts to compare, comma separated (default: 1,2,4,8)
    #[arg(long, value_delimiter = ',', default_values_t = vec![1, 2, 4, 8])]
    threads: Vec<usize>,

    /// Max nodes (default: 10,000,000)
    #[arg(long, default_value_t = 10_000_000)]
    max_nodes: usize,

    /// Run without the structural lock.
    #[arg(long, default_value_t = false, action = clap::ArgAction::SetTrue)]
    lock_free: bool,

    /// Seed for reproducible runs
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    println!("Parallel UCT Search - Benchmark Tool");
    println!("====================================");
    println!("Game: {:?}", args.game);
    println!("Duration: {} seconds", args.duration);
    println!("Threads: {:?}", args.threads);
    println!("Lock Free: {}", args.lock_free);
    println!("Max Nodes: {}", args.max_nodes);
    println!("------------------------------------");

    #[cfg(debug_assertions)]
    println!("WARNING: Running in debug mode. Performance will be significantly lower.\nUse --release for accurate benchmarks.\n");

    let game = GameWrapper::new(args.game);
    let mut baseline = None;
    for &threads in &args.threads {
        let config = SearchConfig::default()
            .with_threads(threads)
            .with_max_nodes(args.max_nodes)
            .with_max_time(Duration::from_secs(args.duration))
            .with_lock_free(args.lock_free)
            .with_seed(args.seed);
        let mut search = UctSearch::new(config, Arc::new(SimulatorFactory::<GameWrapper>::new()))?;

        println!("\nRunning with {} threads...", threads);
        let result = search.search(&game)?;
        let memory = search.tree().max_memory_touched();
        let gps = print_stats(&format!("{} threads", threads), search.statistics(), memory);
        let base = *baseline.get_or_insert(gps);
        if base > 0.0 {
            println!("  Speedup: {:.2}x", gps / base);
        }
        if let Some(mv) = result.best_move {
            println!("  Best Move: {} (value {:.3})", mv, result.value);
        }
    }
    Ok(())
}

fn print_stats(name: &str, stats: &SearchStat, memory: usize) -> f64 {
    let secs = stats.time.as_secs_f64();
    let gps = stats.games_per_second();

    println!("{} Results:", name);
    println!("  Games: {}", stats.games);
    println!("  Time: {:.3}s", secs);
    println!("  GPS: {:.0} games/sec", gps);
    println!("  Game Length: {}", stats.game_length);
    println!("  Memory Touched: {:.1} MB", memory as f64 / (1024.0 * 1024.0));
    gps
}
