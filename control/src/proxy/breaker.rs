//! Failure-counting circuit breaker
//!
//! One entry per application id over a rolling failure window. The
//! `open_until` timestamp is the whole open-state signal: checking
//! `now >= open_until` implicitly lets the next call through, and any
//! success clears the entry.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Time source, injected so tests can drive the window deterministically
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Breaker tuning
#[derive(Debug, Clone)]
pub struct BreakerOptions {
    /// Failures within the window before the circuit opens
    pub failure_threshold: u32,

    /// Rolling failure window
    pub failure_window: Duration,

    /// How long the circuit stays open
    pub break_duration: Duration,

    /// Idle entries older than this are evicted
    pub entry_ttl: Duration,
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_window: Duration::from_secs(30),
            break_duration: Duration::from_secs(20),
            entry_ttl: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
struct CircuitEntry {
    failures: u32,
    window_start: DateTime<Utc>,
    open_until: Option<DateTime<Utc>>,
    touched: DateTime<Utc>,
}

/// Keyed circuit breaker state store. Every operation takes the single
/// lock, so concurrent failures for one key cannot under-count.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    entries: Mutex<HashMap<String, CircuitEntry>>,
    options: BreakerOptions,
    clock: C,
}

impl CircuitBreaker<SystemClock> {
    pub fn new(options: BreakerOptions) -> Self {
        Self::with_clock(options, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn with_clock(options: BreakerOptions, clock: C) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            options,
            clock,
        }
    }

    /// Whether calls for this app id are currently rejected
    pub fn is_open(&self, app_id: &str) -> bool {
        self.open_until(app_id).is_some()
    }

    /// The open-until timestamp when the circuit is open
    pub fn open_until(&self, app_id: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Self::prune(&mut entries, now, self.options.entry_ttl);

        entries
            .get(app_id)
            .and_then(|entry| entry.open_until)
            .filter(|until| now < *until)
    }

    /// Count one failure; opens the circuit when the threshold is reached
    /// within the window. A failure while already open replaces the count,
    /// it does not extend `open_until`.
    pub fn record_failure(&self, app_id: &str) {
        let now = self.clock.now();
        let window = chrono::Duration::from_std(self.options.failure_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let break_for = chrono::Duration::from_std(self.options.break_duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(20));

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Self::prune(&mut entries, now, self.options.entry_ttl);

        let entry = entries.entry(app_id.to_string()).or_insert(CircuitEntry {
            failures: 0,
            window_start: now,
            open_until: None,
            touched: now,
        });

        if now - entry.window_start > window {
            // Window elapsed: count and window reset together
            entry.failures = 1;
            entry.window_start = now;
        } else {
            entry.failures += 1;
        }
        entry.touched = now;

        if entry.failures == self.options.failure_threshold {
            entry.open_until = Some(now + break_for);
        }
    }

    /// Any success clears the record entirely
    pub fn record_success(&self, app_id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(app_id);
    }

    /// Current failure count (diagnostics and tests)
    pub fn failures(&self, app_id: &str) -> u32 {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(app_id).map(|e| e.failures).unwrap_or(0)
    }

    fn prune(entries: &mut HashMap<String, CircuitEntry>, now: DateTime<Utc>, ttl: Duration) {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(300));
        entries.retain(|_, entry| now - entry.touched <= ttl);
    }
}
