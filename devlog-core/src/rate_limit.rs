//! Token-bucket rate limiting for calls to one generation model.
//!
//! A [`RateLimiter`] guards a single model identity. Every caller targeting that
//! model shares the same instance (through [`RateLimiterRegistry`]), so the
//! budget below is accounted for correctly even while the diff summarizer fans
//! out several calls at once.
//!
//! Two independent checks run before each call:
//! - [`RateLimiter::consume`] debits the estimated cost from a refilling budget
//!   and waits exactly as long as the deficit requires.
//! - [`RateLimiter::enforce_min_interval`] sleeps `60 / rpm` seconds so calls
//!   cannot burst even when the budget would allow it.
//!
//! Budgets live in memory only and start full on every process start.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Limits for one model identity, as configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Maximum number of budget units the bucket can hold.
    pub capacity: u64,
    /// Units added back per minute.
    pub refill_per_minute: u64,
    /// Request ceiling per minute, enforced as a fixed delay per call.
    pub requests_per_minute: u32,
}

/// Observable state of one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct RateBudget {
    pub capacity: f64,
    pub available: f64,
    pub refill_per_second: f64,
    pub last_refill: Instant,
}

impl RateBudget {
    fn full(capacity: f64, refill_per_second: f64) -> Self {
        Self {
            capacity,
            available: capacity,
            refill_per_second,
            last_refill: Instant::now(),
        }
    }

    /// Adds the units accrued since `last_refill`, capped at `capacity`.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.available = (self.available + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = now;
    }

    /// Time until `units` are available, or zero when they already are.
    fn wait_for(&self, units: f64) -> Duration {
        if units <= self.available {
            return Duration::ZERO;
        }
        if self.refill_per_second <= 0.0 {
            return Duration::MAX;
        }
        Duration::from_secs_f64((units - self.available) / self.refill_per_second)
    }
}

pub struct RateLimiter {
    model: String,
    settings: RateLimitSettings,
    budget: Mutex<RateBudget>,
    spacing: Mutex<()>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(model: impl Into<String>, settings: &RateLimitSettings) -> Self {
        let refill_per_second = settings.refill_per_minute as f64 / 60.0;
        let min_interval = if settings.requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(60.0 / settings.requests_per_minute as f64)
        };
        Self {
            model: model.into(),
            settings: settings.clone(),
            budget: Mutex::new(RateBudget::full(settings.capacity as f64, refill_per_second)),
            spacing: Mutex::new(()),
            min_interval,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Debits `units` from the budget, suspending until enough has refilled.
    ///
    /// The budget lock is held for the whole wait: concurrent callers queue in
    /// arrival order and each one sees the balance left by the previous one.
    /// A request larger than the whole capacity is allowed through once the
    /// bucket is full, leaving it empty.
    pub async fn consume(&self, units: u64) {
        let units = units as f64;
        let mut budget = self.budget.lock().await;
        budget.refill(Instant::now());

        if units > budget.capacity {
            warn!(
                model = %self.model,
                units,
                capacity = budget.capacity,
                "Requested units exceed bucket capacity, proceeding once the bucket is full"
            );
            let wait = budget.wait_for(budget.capacity);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
                budget.refill(Instant::now());
            }
            budget.available = 0.0;
            return;
        }

        let wait = budget.wait_for(units);
        if !wait.is_zero() {
            info!(
                model = %self.model,
                units,
                available = budget.available,
                wait_ms = wait.as_millis() as u64,
                "Budget short, waiting for refill"
            );
            tokio::time::sleep(wait).await;
            budget.refill(Instant::now());
        }

        // Float rounding after the sleep can leave a hair less than `units`.
        budget.available = (budget.available - units).max(0.0);
        debug!(model = %self.model, units, available = budget.available, "Budget debited");
    }

    /// Sleeps for the configured `60 / rpm` interval.
    ///
    /// Callers pass through one at a time, so two calls to the same model are
    /// always at least one interval apart.
    pub async fn enforce_min_interval(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let _slot = self.spacing.lock().await;
        debug!(model = %self.model, interval_ms = self.min_interval.as_millis() as u64, "Spacing call");
        tokio::time::sleep(self.min_interval).await;
    }

    /// Current budget after applying any pending refill.
    pub async fn snapshot(&self) -> RateBudget {
        let mut budget = self.budget.lock().await;
        budget.refill(Instant::now());
        budget.clone()
    }
}

/// One shared limiter per distinct model name.
#[derive(Default, Clone)]
pub struct RateLimiterRegistry {
    limiters: HashMap<String, Arc<RateLimiter>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the limiter for `model`, creating it from `settings` on first use.
    ///
    /// Later registrations of the same model keep the first settings.
    pub fn register(&mut self, model: &str, settings: &RateLimitSettings) -> Arc<RateLimiter> {
        if let Some(existing) = self.limiters.get(model) {
            if existing.settings() != settings {
                warn!(model, "Model registered twice with different limits, keeping the first");
            }
            return Arc::clone(existing);
        }
        let limiter = Arc::new(RateLimiter::new(model, settings));
        self.limiters.insert(model.to_string(), Arc::clone(&limiter));
        limiter
    }

    pub fn get(&self, model: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.get(model).cloned()
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}
