//! Rank-stamped progress logging with verbosity levels.

use std::time::Instant;

/// How much progress output a run emits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// No output.
    Silent,
    /// Phase transitions and batch summaries.
    #[default]
    Info,
    /// Per-transfer detail.
    Debug,
}

/// Writes `[elapsed, rank N] message` lines to stderr.
///
/// Every cooperating process logs through its own instance, so interleaved
/// output from a multi-rank run stays attributable.
#[derive(Debug)]
pub struct RankLogger {
    rank: usize,
    verbosity: Verbosity,
    start: Instant,
}

impl RankLogger {
    pub fn new(rank: usize, verbosity: Verbosity) -> Self {
        Self { rank, verbosity, start: Instant::now() }
    }

    #[inline]
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn info(&self, message: &str) {
        self.log(Verbosity::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(Verbosity::Debug, message);
    }

    fn log(&self, level: Verbosity, message: &str) {
        if level <= self.verbosity {
            let elapsed = self.start.elapsed().as_secs_f64();
            eprintln!("[{elapsed:8.1}s, rank {}] {message}", self.rank);
        }
    }
}
