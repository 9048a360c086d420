use std::time::Duration;

use crate::config::BudgetSettings;

/// Splits one merge pass's time allowance across its sources.
///
/// Each source gets an even share of what is left, never less than the
/// per-source floor. Time is accounted from what callers [`record`], so the
/// arithmetic does not depend on a wall clock.
///
/// [`record`]: TimeoutBudget::record
#[derive(Debug, Clone)]
pub struct TimeoutBudget {
    remaining: Duration,
    spent: Duration,
    hard_limit: Option<Duration>,
    floor: Duration,
    sources_left: usize,
}

/// What a nested pass, started from one source of an enclosing pass, may spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    /// Timeout handed to the referencing source.
    pub share: Duration,
    /// Time left before the enclosing pass's deadline, if one is enforced.
    pub deadline: Option<Duration>,
}

impl TimeoutBudget {
    pub fn new(settings: &BudgetSettings, source_count: usize) -> Self {
        let total = Duration::from_secs(settings.max_total_secs);
        let available = total.saturating_sub(Duration::from_secs(settings.safety_buffer_secs));
        let floor = Duration::from_secs(settings.min_per_source_secs);

        if source_count > 0 && available / (source_count as u32) < floor {
            tracing::warn!(
                sources = source_count,
                available_secs = available.as_secs(),
                floor_secs = floor.as_secs(),
                "Too many sources for the merge budget, per-source timeouts will exceed it"
            );
        }

        TimeoutBudget {
            remaining: available,
            spent: Duration::ZERO,
            hard_limit: settings.enforce_deadline.then_some(total),
            floor,
            sources_left: source_count,
        }
    }

    /// Budget for a nested pass: it shares out `allowance.share` and stops
    /// starting sources at the enclosing pass's deadline.
    pub fn within(settings: &BudgetSettings, allowance: Allowance, source_count: usize) -> Self {
        TimeoutBudget {
            remaining: allowance.share,
            spent: Duration::ZERO,
            hard_limit: allowance.deadline,
            floor: Duration::from_secs(settings.min_per_source_secs),
            sources_left: source_count,
        }
    }

    /// Allowance for a nested pass run by a source given `share`.
    pub fn allowance(&self, share: Duration) -> Allowance {
        Allowance {
            share,
            deadline: self.hard_limit.map(|limit| limit.saturating_sub(self.spent)),
        }
    }

    /// Timeout for the next source, or `None` once the hard deadline has passed.
    pub fn next_timeout(&self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let share = self.remaining / self.sources_left.max(1) as u32;
        Some(share.max(self.floor))
    }

    /// Account for a processed source.
    pub fn record(&mut self, elapsed: Duration) {
        self.remaining = self.remaining.saturating_sub(elapsed);
        self.spent += elapsed;
        self.sources_left = self.sources_left.saturating_sub(1);
    }

    /// Account for a source that was never started.
    pub fn skip(&mut self) {
        self.sources_left = self.sources_left.saturating_sub(1);
    }

    pub fn is_exhausted(&self) -> bool {
        self.hard_limit.is_some_and(|limit| self.spent >= limit)
    }

    pub fn spent(&self) -> Duration {
        self.spent
    }
}
