//! Run context shared by a role and whoever drives it.

use std::sync::atomic::{AtomicBool, Ordering};

/// Iteration bound and cancellation flag for one role.
///
/// The default is unbounded and never cancelled, which is how the roles run
/// in production: until the process is killed.
#[derive(Debug, Default)]
pub struct RunContext {
    stop: AtomicBool,
    limit: Option<u64>,
}

impl RunContext {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Stop after `limit` iterations.
    pub fn bounded(limit: u64) -> Self {
        Self {
            stop: AtomicBool::new(false),
            limit: Some(limit),
        }
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Ask the role to stop at its next iteration boundary.
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Whether a role that has finished `done` iterations should run another.
    #[inline]
    pub fn should_continue(&self, done: u64) -> bool {
        !self.is_cancelled() && self.limit.is_none_or(|limit| done < limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_runs_until_cancelled() {
        let ctx = RunContext::unbounded();
        assert!(ctx.should_continue(0));
        assert!(ctx.should_continue(u64::MAX));
        ctx.cancel();
        assert!(!ctx.should_continue(0));
    }

    #[test]
    fn bounded_stops_at_limit() {
        let ctx = RunContext::bounded(3);
        assert!(ctx.should_continue(2));
        assert!(!ctx.should_continue(3));
        assert_eq!(ctx.limit(), Some(3));
    }

    #[test]
    fn zero_bound_never_runs() {
        assert!(!RunContext::bounded(0).should_continue(0));
    }
}
