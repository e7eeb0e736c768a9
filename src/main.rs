//! # UCT Search Command Line Tool
//!
//! Runs the parallel UCT search on one of the included games, either as a
//! single analysis of the starting position or as a self-play game in which
//! the tree is kept between moves.
//!
//! ## Usage
//! ```text
//! uct-search --game connect4 --num-threads 8 --games 200000
//! uct-search --game nim --self-play --select value
//! RUST_LOG=debug uct-search --time-secs 5
//! ```
//!
//! Run with `cargo run --release` for best performance.

use anyhow::{bail, Context};
use clap::Parser;
use colored::Colorize;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use uct::game_wrapper::{GameKind, GameWrapper};
use uct::{
    BoundKind, EarlyAbortParam, GameState, MoveSelect, SearchConfig, SearchResult,
    SimulatorFactory, UctSearch,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Game to search
    #[arg(short, long, value_enum, default_value_t = GameKind::Connect4)]
    game: GameKind,

    /// Number of search threads (default: number of CPUs)
    #[arg(short, long)]
    num_threads: Option<usize>,

    /// Maximum number of games per search
    #[arg(short = 'i', long, default_value_t = 100_000)]
    games: u64,

    /// Time limit per search in seconds
    #[arg(short, long)]
    time_secs: Option<f64>,

    /// Maximum number of tree nodes
    #[arg(short, long, default_value_t = 1_000_000)]
    max_nodes: usize,

    /// Criterion for the final move
    #[arg(long, value_enum, default_value_t = MoveSelect::Count)]
    select: MoveSelect,

    /// Exploration bound used during selection
    #[arg(long, value_enum, default_value_t = BoundKind::Ucb)]
    bound: BoundKind,

    /// Exploration constant
    #[arg(short = 'e', long, default_value_t = 0.7)]
    exploration_constant: f64,

    /// Blend all-moves (RAVE) statistics into the estimate
    #[arg(long, action = clap::ArgAction::SetTrue)]
    rave: bool,

    /// Update statistics without the structural lock
    #[arg(long, action = clap::ArgAction::SetTrue)]
    lock_free: bool,

    /// Disable virtual loss
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_virtual_loss: bool,

    /// Stop early once the root value exceeds this threshold
    #[arg(long)]
    early_abort: Option<f64>,

    /// Seconds between progress lines (0 disables them)
    #[arg(long, default_value_t = 10)]
    report_interval_secs: u64,

    /// Seed for the worker random generators
    #[arg(long)]
    seed: Option<u64>,

    /// Play a complete game against itself
    #[arg(long, action = clap::ArgAction::SetTrue)]
    self_play: bool,
}

impl Args {
    fn config(&self) -> SearchConfig {
        let mut config = SearchConfig::default()
            .with_threads(self.num_threads.unwrap_or_else(num_cpus::get))
            .with_max_nodes(self.max_nodes)
            .with_max_games(self.games)
            .with_move_select(self.select)
            .with_bound(self.bound, self.exploration_constant)
            .with_lock_free(self.lock_free)
            .with_virtual_loss(!self.no_virtual_loss);
        if let Some(secs) = self.time_secs {
            config = config.with_max_time(Duration::from_secs_f64(secs));
        }
        if self.rave {
            let (initial, final_weight) = (config.rave_weight_initial, config.rave_weight_final);
            config = config.with_rave(initial, final_weight);
        }
        if let Some(threshold) = self.early_abort {
            config = config.with_early_abort(EarlyAbortParam {
                threshold,
                ..EarlyAbortParam::default()
            });
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config.report_interval =
            (self.report_interval_secs > 0).then(|| Duration::from_secs(self.report_interval_secs));
        config
    }
}

fn print_result(search: &UctSearch<GameWrapper>, result: &SearchResult) -> io::Result<()> {
    println!("{}", "Root children".bold());
    println!("{:>6} {:>9} {:>6} {:>6} {:>5}", "Move", "Count", "Value", "Rave", "Prior");
    for child in search.root_child_stats() {
        let line = child.to_string();
        if Some(child.mv) == result.best_move {
            println!("{}", line.green());
        } else {
            println!("{}", line);
        }
    }
    println!();
    println!("{}", "Statistics".bold());
    search.statistics().write_report(&mut io::stdout())?;
    let reason = result
        .abort_reason
        .map_or_else(|| "-".to_string(), |r| r.to_string());
    println!("Abort       {}{}", reason, if result.early_abort { " (early)" } else { "" });
    let sequence: Vec<String> = result.sequence.iter().map(|m| m.to_string()).collect();
    println!("Sequence    {}", sequence.join(" "));
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = args.config();

    #[cfg(debug_assertions)]
    println!("{}", "WARNING: debug build, use --release for realistic speed.".yellow());

    println!(
        "{} {:?} with {} threads, {} nodes",
        "Searching".bold(),
        args.game,
        config.num_threads,
        config.max_nodes
    );
    let mut search = UctSearch::new(config, Arc::new(SimulatorFactory::<GameWrapper>::new()))
        .context("cannot start search")?;
    let mut game = GameWrapper::new(args.game);

    if !args.self_play {
        let result = search.search(&game).context("search failed")?;
        print_result(&search, &result)?;
        if let Some(mv) = result.best_move {
            println!(
                "{} {} (value {:.3})",
                "Best move:".bold(),
                mv.to_string().green().bold(),
                result.value
            );
        }
        return Ok(());
    }

    let mut ply = 0;
    while !game.is_terminal() {
        let result = search.search(&game).context("search failed")?;
        let Some(mv) = result.best_move else {
            bail!("no move found in a non-terminal position");
        };
        ply += 1;
        println!(
            "{:>3}. {:?} plays {} (value {:.3}, {} games)",
            ply,
            game.to_play(),
            mv.to_string().green(),
            result.value,
            result.games
        );
        game.apply_move(mv);
        search.advance_root(&[mv]).context("cannot reuse tree")?;
        print!("{}", game);
    }
    println!("{} score for {:?}: {:.1}", "Game over,".bold(), game.to_play(), game.final_score());
    Ok(())
}
