//! # Search Statistics
//!
//! [`SearchStat`] aggregates per-game counters. Each worker keeps its own
//! copy and ships it to the controller, which merges the copies, so the hot
//! loop never shares counters between threads.
//!
//! [`ChildStat`] is one row of the root child table returned by
//! [`UctSearch::root_child_stats`](crate::search::UctSearch::root_child_stats).

use crate::game::GameInfo;
use crate::node::{Move, ProvenType};
use crate::value::{Statistics, StatisticsExt};
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

/// Aggregate counters of a search.
#[derive(Debug, Clone, Default)]
pub struct SearchStat {
    /// Games whose result was added to the tree.
    pub games: u64,
    /// Games discarded because the evaluator failed.
    pub failed: u64,
    /// Total moves per game (in tree plus playout).
    pub game_length: StatisticsExt,
    /// Moves played inside the tree per game.
    pub moves_in_tree: StatisticsExt,
    /// Fraction of playouts cut off at the game length limit.
    pub aborted: Statistics<f64>,
    pub time: Duration,
}

impl SearchStat {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Counts one finished game.
    pub fn record(&mut self, info: &GameInfo) {
        if info.failed {
            self.failed += 1;
            return;
        }
        self.games += 1;
        self.game_length.add(info.game_length() as f64);
        self.moves_in_tree.add(info.in_tree_sequence.len() as f64);
        for &aborted in &info.aborted {
            self.aborted.add(if aborted { 1.0 } else { 0.0 });
        }
    }

    /// Adds the counters of another (worker) statistic.
    pub fn merge(&mut self, other: &SearchStat) {
        self.games += other.games;
        self.failed += other.failed;
        self.game_length.merge(&other.game_length);
        self.moves_in_tree.merge(&other.moves_in_tree);
        self.aborted.merge(&other.aborted);
    }

    pub fn games_per_second(&self) -> f64 {
        let secs = self.time.as_secs_f64();
        if secs > 0.0 {
            self.games as f64 / secs
        } else {
            0.0
        }
    }

    /// Writes one `Key value` line per counter.
    pub fn write_report<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Count       {}", self.games)?;
        writeln!(out, "Failed      {}", self.failed)?;
        writeln!(out, "GameLen     {}", self.game_length)?;
        writeln!(out, "InTree      {}", self.moves_in_tree)?;
        writeln!(
            out,
            "Aborted     {:.0}%",
            self.aborted.mean_or(0.0) * 100.0
        )?;
        writeln!(out, "Time        {:.3}", self.time.as_secs_f64())?;
        writeln!(out, "GamesPerSec {:.1}", self.games_per_second())
    }
}

/// Statistics of one child of the root.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildStat {
    pub mv: Move,
    pub count: f64,
    /// Mean value for the player to move at the root; `None` if unvisited.
    pub mean: Option<f64>,
    pub rave_count: f64,
    pub rave_value: Option<f64>,
    pub prior: f64,
    /// Status from the point of view of the player to move in the child.
    pub proven: ProvenType,
}

impl fmt::Display for ChildStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6} {:>9.0}", self.mv.to_string(), self.count)?;
        match self.mean {
            Some(mean) => write!(f, " {:>6.3}", mean)?,
            None => write!(f, " {:>6}", "-")?,
        }
        match self.rave_value {
            Some(rave) => write!(f, " {:>6.3} ({:.0})", rave, self.rave_count)?,
            None => write!(f, " {:>6}", "-")?,
        }
        write!(f, " {:>5.3}", self.prior)?;
        match self.proven {
            ProvenType::None => Ok(()),
            ProvenType::Win => write!(f, " proven-win"),
            ProvenType::Loss => write!(f, " proven-loss"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(in_tree: usize, playout: usize, aborted: bool) -> GameInfo {
        let mut info = GameInfo::default();
        info.clear(1);
        info.in_tree_sequence = (0..in_tree as u32).map(Move).collect();
        info.sequence[0] = (0..(in_tree + playout) as u32).map(Move).collect();
        info.aborted[0] = aborted;
        info
    }

    #[test]
    fn test_record_and_merge() {
        let mut a = SearchStat::default();
        let mut b = SearchStat::default();
        a.record(&game(2, 8, false));
        b.record(&game(4, 16, true));
        let mut failed = game(1, 0, false);
        failed.failed = true;
        b.record(&failed);

        a.merge(&b);
        assert_eq!(a.games, 2);
        assert_eq!(a.failed, 1);
        assert!((a.game_length.mean() - 15.0).abs() < 1e-12);
        assert!((a.moves_in_tree.mean() - 3.0).abs() < 1e-12);
        assert!((a.aborted.mean() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_report_lines() {
        let mut stat = SearchStat::default();
        stat.record(&game(1, 3, false));
        stat.time = Duration::from_millis(500);
        let mut out = Vec::new();
        stat.write_report(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.lines().any(|l| l.starts_with("Count") && l.ends_with(" 1")));
        assert!(text.contains("GamesPerSec 2.0"));
        assert_eq!(text.lines().count(), 7);
    }

    #[test]
    fn test_child_stat_display() {
        let stat = ChildStat {
            mv: Move(3),
            count: 120.0,
            mean: Some(0.625),
            rave_count: 0.0,
            rave_value: None,
            prior: 0.25,
            proven: ProvenType::Loss,
        };
        let text = stat.to_string();
        assert!(text.contains("0.625"));
        assert!(text.ends_with("proven-loss"));
    }
}
