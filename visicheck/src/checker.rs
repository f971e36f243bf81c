//! Checker loop.
//!
//! Spins on the progress counter and the exposed cell and reports every poll
//! where the cell lags behind what the writer's completions promised.

use std::fmt;

use crate::barrier::{Fence, FullFence};
use crate::cell::CellView;
use crate::counter::ProgressCounter;
use crate::run::RunContext;

/// A poll where the exposed cell was behind the progress counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    /// Value found in the exposed cell.
    pub actual: u64,
    /// Progress counter value read at the start of the poll.
    pub minimum_allowed: u64,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "actual = {}, minimum_allowed = {}",
            self.actual, self.minimum_allowed
        )
    }
}

/// The two values one poll observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poll {
    pub minimum_allowed: u64,
    pub actual: u64,
}

impl Poll {
    pub fn violation(&self) -> Option<Violation> {
        (self.actual < self.minimum_allowed).then_some(Violation {
            actual: self.actual,
            minimum_allowed: self.minimum_allowed,
        })
    }

    pub fn is_violation(&self) -> bool {
        self.actual < self.minimum_allowed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckerReport {
    pub polls: u64,
    pub violations: u64,
    pub first_violation: Option<Violation>,
    /// Largest value seen in the exposed cell.
    pub max_observed: u64,
    /// Largest progress counter value seen.
    pub max_bound: u64,
}

/// Server role: read the bound, fence, read the cell, compare.
pub struct Checker<'a, C: CellView, F: Fence = FullFence> {
    cell: C,
    progress: &'a ProgressCounter,
    fence: F,
    report: CheckerReport,
}

impl<'a, C: CellView, F: Fence> Checker<'a, C, F> {
    pub fn new(cell: C, progress: &'a ProgressCounter, fence: F) -> Self {
        Self {
            cell,
            progress,
            fence,
            report: CheckerReport::default(),
        }
    }

    /// One observation. Violations are logged and counted, never fatal.
    #[inline]
    pub fn poll_once(&mut self) -> Poll {
        let minimum_allowed = self.progress.load();

        // The cell load must not be satisfied before the counter load.
        self.fence.full();

        let actual = self.cell.load();

        let poll = Poll {
            minimum_allowed,
            actual,
        };
        self.record(poll);
        poll
    }

    /// Poll with no delay until `ctx` says stop.
    pub fn run(&mut self, ctx: &RunContext) -> CheckerReport {
        while ctx.should_continue(self.report.polls) {
            self.poll_once();
        }
        self.report
    }

    pub fn report(&self) -> &CheckerReport {
        &self.report
    }

    fn record(&mut self, poll: Poll) {
        let report = &mut self.report;
        report.polls += 1;
        report.max_observed = report.max_observed.max(poll.actual);
        report.max_bound = report.max_bound.max(poll.minimum_allowed);

        if let Some(violation) = poll.violation() {
            report.violations += 1;
            report.first_violation.get_or_insert(violation);
            tracing::warn!("violation: {}", violation);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::test_utils::{ImmediateTransport, REGION};
    use crate::writer::Writer;

    #[test]
    fn poll_at_rest_is_clean() {
        let cell = AtomicU64::new(0);
        let counter = ProgressCounter::new();
        let mut checker = Checker::new(&cell, &counter, FullFence);

        let poll = checker.poll_once();
        assert_eq!(
            poll,
            Poll {
                minimum_allowed: 0,
                actual: 0
            }
        );
        assert!(!poll.is_violation());
        assert_eq!(checker.report().violations, 0);
    }

    #[test]
    fn lagging_cell_is_a_violation() {
        let cell = AtomicU64::new(2);
        let counter = ProgressCounter::new();
        for _ in 0..3 {
            counter.advance();
        }
        let mut checker = Checker::new(&cell, &counter, FullFence);

        let poll = checker.poll_once();
        assert_eq!(
            poll.violation(),
            Some(Violation {
                actual: 2,
                minimum_allowed: 3
            })
        );

        // Violations do not stop the checker.
        cell.store(3, Ordering::Relaxed);
        assert!(!checker.poll_once().is_violation());

        let report = checker.report();
        assert_eq!(report.polls, 2);
        assert_eq!(report.violations, 1);
        assert_eq!(
            report.first_violation.map(|v| v.to_string()).as_deref(),
            Some("actual = 2, minimum_allowed = 3")
        );
        assert_eq!(report.max_observed, 3);
        assert_eq!(report.max_bound, 3);
    }

    #[test]
    fn cell_ahead_of_counter_is_fine() {
        // A write lands before the writer sees its completion.
        let cell = AtomicU64::new(5);
        let counter = ProgressCounter::new();
        let mut checker = Checker::new(&cell, &counter, FullFence);
        assert!(!checker.poll_once().is_violation());
    }

    #[test]
    fn bounded_run_stops_after_limit() {
        let cell = AtomicU64::new(0);
        let counter = ProgressCounter::new();
        let mut checker = Checker::new(&cell, &counter, FullFence);
        let report = checker.run(&RunContext::bounded(1000));
        assert_eq!(report.polls, 1000);
        assert_eq!(report.violations, 0);
    }

    #[test]
    fn interleaved_with_ordered_writer_sees_no_violation() {
        let target = Arc::new(AtomicU64::new(0));
        let counter = ProgressCounter::new();
        let transport = ImmediateTransport::new(Arc::clone(&target));
        let mut writer = Writer::new(transport, REGION, &counter, FullFence).unwrap();
        let mut checker = Checker::new(&*target, &counter, FullFence);

        for _ in 0..5 {
            let poll = checker.poll_once();
            assert!(poll.actual <= 5);
            writer.write_once().unwrap();
        }
        checker.poll_once();

        assert_eq!(counter.load(), 5);
        assert_eq!(target.load(Ordering::Relaxed), 5);
        assert_eq!(checker.report().violations, 0);
    }

    #[test]
    fn threaded_run_with_ordered_writer_sees_no_violation() {
        const WRITES: u64 = 20_000;
        let target = Arc::new(AtomicU64::new(0));
        let counter = ProgressCounter::new();
        let checker_ctx = RunContext::unbounded();

        let report = std::thread::scope(|s| {
            let checker =
                s.spawn(|| Checker::new(&*target, &counter, FullFence).run(&checker_ctx));

            let transport = ImmediateTransport::new(Arc::clone(&target));
            let mut writer = Writer::new(transport, REGION, &counter, FullFence).unwrap();
            writer.run(&RunContext::bounded(WRITES)).unwrap();
            checker_ctx.cancel();

            checker.join().unwrap()
        });

        assert_eq!(report.violations, 0);
        assert!(report.max_observed <= WRITES);
        assert_eq!(counter.load(), WRITES);
    }
}
