use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Restart timestamps for one child under one strategy.
#[derive(Debug, Default, Clone)]
pub struct RestartHistory {
    restarts: VecDeque<Instant>,
}

impl RestartHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a restart at `now` and report whether it stays within budget.
    ///
    /// Timestamps older than `within` are pruned first. With no
    /// `max_retries` the budget is unlimited; with no `within` the window is
    /// unlimited.
    pub fn request_restart_permission(
        &mut self,
        max_retries: Option<usize>,
        within: Option<Duration>,
        now: Instant,
    ) -> bool {
        let Some(max_retries) = max_retries else {
            return true;
        };

        if let Some(window) = within {
            while let Some(&oldest) = self.restarts.front() {
                if now.saturating_duration_since(oldest) > window {
                    self.restarts.pop_front();
                } else {
                    break;
                }
            }
        }

        self.restarts.push_back(now);
        self.restarts.len() <= max_retries
    }

    /// Restarts currently counted against the budget.
    pub fn count(&self) -> usize {
        self.restarts.len()
    }

    /// Forget every recorded restart.
    pub fn clear(&mut self) {
        self.restarts.clear();
    }
}
