//! Per-provider request budgets.
//!
//! A budget admits `requests` lookups per fixed window of `period_secs`; the
//! window restarts on the first acquisition after it has elapsed. Budgets
//! live in a [`RateBudgets`] registry owned by whoever builds the provider
//! chain and are shared by every caller of that chain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::Instant;

use crate::config::RateLimit;

#[derive(Debug)]
struct Window {
    started: Instant,
    used: u32,
}

#[derive(Debug)]
pub struct RateBudget {
    limit: RateLimit,
    window: Mutex<Window>,
}

impl RateBudget {
    pub fn new(limit: RateLimit) -> Self {
        Self { limit, window: Mutex::new(Window { started: Instant::now(), used: 0 }) }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Take one unit; false when the current window is used up
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        self.roll(&mut window, now);
        if window.used >= self.limit.requests {
            return false;
        }
        window.used += 1;
        true
    }

    /// Units left in the current window
    pub fn remaining(&self) -> u32 {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        self.roll(&mut window, Instant::now());
        self.limit.requests.saturating_sub(window.used)
    }

    fn roll(&self, window: &mut Window, now: Instant) {
        if now.saturating_duration_since(window.started) >= self.limit.period() {
            window.started = now;
            window.used = 0;
        }
    }
}

/// Registry of budgets keyed by provider name
#[derive(Debug, Clone, Default)]
pub struct RateBudgets {
    budgets: Arc<Mutex<HashMap<String, Arc<RateBudget>>>>,
}

impl RateBudgets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Budget for `provider`, replaced only when its limit changed
    pub fn budget_for(&self, provider: &str, limit: RateLimit) -> Arc<RateBudget> {
        let mut budgets = self.budgets.lock().unwrap_or_else(PoisonError::into_inner);
        match budgets.get(provider) {
            Some(budget) if budget.limit() == limit => Arc::clone(budget),
            _ => {
                let budget = Arc::new(RateBudget::new(limit));
                budgets.insert(provider.to_string(), Arc::clone(&budget));
                budget
            }
        }
    }

    pub fn get(&self, provider: &str) -> Option<Arc<RateBudget>> {
        self.budgets.lock().unwrap_or_else(PoisonError::into_inner).get(provider).cloned()
    }
}
