// ── Usage accounting engine ──
//
// Maintains, for each of {download, upload} x {daily, billing-month},
// a best-effort cumulative byte total derived from repeated
// instantaneous-rate samples. The device's own lifetime counters reset
// on reboot and are not period-scoped, so they are never trusted here;
// rates are integrated over elapsed wall time instead.
//
// Policy (deliberate, do not blend): the first sample after process
// start, restore, or a window rollover only establishes the
// integration baseline and contributes zero bytes. No default elapsed
// interval is ever assumed.

pub mod persist;
pub mod window;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use persist::{CounterSnapshot, CounterStore, JsonCounterStore, MemoryCounterStore};
pub use window::{Window, window_key};

/// Traffic direction, from the monitored network's point of view.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Down,
    Up,
}

/// What a single sample did to a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Integrated into the running total.
    Accepted,
    /// First sample of a window -- baseline established, no increment.
    Baseline,
    /// Window key changed -- total zeroed, baseline restarted.
    RolledOver,
    /// No usable rate value; bookkeeping advanced, no increment.
    Skipped,
    /// Non-positive elapsed time (clock went backward or duplicate
    /// poll); sample dropped, baseline left untouched.
    Discarded,
}

impl SampleOutcome {
    /// Whether the counter state changed and should be persisted.
    fn mutated(self) -> bool {
        !matches!(self, Self::Discarded)
    }
}

// ── Single counter ──────────────────────────────────────────────────

/// One period-bounded running total.
#[derive(Debug, Clone)]
pub struct UsageCounter {
    window: Window,
    billing_reset_day: u8,
    accumulated_bytes: f64,
    window_key: Option<String>,
    last_sample_time: Option<DateTime<Utc>>,
}

impl UsageCounter {
    pub fn new(window: Window, billing_reset_day: u8) -> Self {
        Self {
            window,
            billing_reset_day,
            accumulated_bytes: 0.0,
            window_key: None,
            last_sample_time: None,
        }
    }

    /// Seed a counter from persisted state.
    ///
    /// A stored window key that no longer matches "now" is treated as a
    /// rollover: the value is discarded rather than trusted stale. Even
    /// on a key match the integration baseline is NOT restored -- the
    /// process may have been down for hours, and integrating across
    /// that gap would fabricate usage. The first post-restart sample
    /// re-baselines.
    pub fn restore(
        window: Window,
        billing_reset_day: u8,
        saved: Option<CounterSnapshot>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut counter = Self::new(window, billing_reset_day);
        let Some(saved) = saved else {
            return counter;
        };

        let current_key = window_key(window, billing_reset_day, now);
        if saved.window_key == current_key {
            info!(
                %window,
                value = saved.value,
                key = %saved.window_key,
                "restored usage counter"
            );
            counter.accumulated_bytes = saved.value;
            counter.window_key = Some(saved.window_key);
        } else {
            debug!(
                %window,
                stale_key = %saved.window_key,
                current_key = %current_key,
                "persisted window is stale, starting fresh"
            );
        }
        counter
    }

    /// Integrate one rate sample.
    pub fn record(&mut self, rate_bytes_per_sec: Option<f64>, at: DateTime<Utc>) -> SampleOutcome {
        let key = window_key(self.window, self.billing_reset_day, at);

        // Rollover check comes first: the key is recomputed from every
        // sample's timestamp before any integration.
        match &self.window_key {
            None => {
                self.window_key = Some(key);
                self.last_sample_time = Some(at);
                return SampleOutcome::Baseline;
            }
            Some(current) if *current != key => {
                debug!(window = %self.window, old = %current, new = %key, "window rollover");
                self.window_key = Some(key);
                self.accumulated_bytes = 0.0;
                self.last_sample_time = Some(at);
                return SampleOutcome::RolledOver;
            }
            Some(_) => {}
        }

        let Some(last) = self.last_sample_time else {
            // Restored value without a baseline: this sample only
            // establishes one.
            self.last_sample_time = Some(at);
            return SampleOutcome::Baseline;
        };

        let elapsed_secs = (at - last).num_milliseconds() as f64 / 1000.0;
        if elapsed_secs <= 0.0 {
            // Baseline deliberately untouched: measuring the next
            // interval from a bad timestamp would inflate it.
            return SampleOutcome::Discarded;
        }

        let Some(rate) = rate_bytes_per_sec else {
            self.last_sample_time = Some(at);
            return SampleOutcome::Skipped;
        };

        // Monotonic clamp: a transient zero/negative rate must never
        // erase prior accumulation within the window.
        let increment = rate * elapsed_secs;
        if increment > 0.0 {
            self.accumulated_bytes += increment;
        }
        self.last_sample_time = Some(at);
        SampleOutcome::Accepted
    }

    /// Accumulated bytes within the current window.
    pub fn bytes(&self) -> f64 {
        self.accumulated_bytes
    }

    /// Reporting-unit conversion happens only here, at the read boundary.
    pub fn megabytes(&self) -> f64 {
        (self.accumulated_bytes / 1_000_000.0 * 100.0).round() / 100.0
    }

    pub fn window_key_str(&self) -> Option<&str> {
        self.window_key.as_deref()
    }

    fn to_snapshot(&self) -> Option<CounterSnapshot> {
        Some(CounterSnapshot {
            value: self.accumulated_bytes,
            window_key: self.window_key.clone()?,
            last_sample_time: self.last_sample_time,
        })
    }
}

// ── Ledger ──────────────────────────────────────────────────────────

/// Storage key for one counter: `"down_daily"`, `"up_billing_month"`, ...
pub fn storage_key(direction: Direction, window: Window) -> String {
    format!("{direction}_{window}")
}

const ALL_COUNTERS: [(Direction, Window); 4] = [
    (Direction::Down, Window::Daily),
    (Direction::Down, Window::BillingMonth),
    (Direction::Up, Window::Daily),
    (Direction::Up, Window::BillingMonth),
];

/// The four counters the monitor maintains, plus persistence plumbing.
///
/// Touched only from the single poll path; the monitor serializes
/// access behind a lock so the rollover and clamp invariants hold even
/// if a host overlaps polls.
pub struct UsageLedger {
    entries: Vec<(Direction, Window, UsageCounter)>,
}

impl UsageLedger {
    /// Explicit initialization step: every counter is restored from the
    /// store up front and is fully formed before the first update.
    pub fn restore(billing_reset_day: u8, store: &dyn CounterStore, now: DateTime<Utc>) -> Self {
        let entries = ALL_COUNTERS
            .into_iter()
            .map(|(direction, window)| {
                let saved = store
                    .load(&storage_key(direction, window))
                    .unwrap_or_else(|e| {
                        warn!(%direction, %window, error = %e, "counter restore failed, starting fresh");
                        None
                    });
                (
                    direction,
                    window,
                    UsageCounter::restore(window, billing_reset_day, saved, now),
                )
            })
            .collect();
        Self { entries }
    }

    /// Feed one direction's rate sample into both of its windows,
    /// persisting each counter that changed.
    ///
    /// A store failure is logged and swallowed: the in-memory totals
    /// stay correct, and the next accepted update retries the write.
    pub fn record_sample(
        &mut self,
        direction: Direction,
        rate_bytes_per_sec: Option<f64>,
        at: DateTime<Utc>,
        store: &dyn CounterStore,
    ) {
        for (dir, window, counter) in &mut self.entries {
            if *dir != direction {
                continue;
            }
            let outcome = counter.record(rate_bytes_per_sec, at);
            if outcome.mutated() {
                if let Some(snapshot) = counter.to_snapshot() {
                    if let Err(e) = store.save(&storage_key(*dir, *window), &snapshot) {
                        warn!(direction = %dir, window = %window, error = %e, "counter persist failed");
                    }
                }
            }
        }
    }

    /// Accumulated usage in megabytes for one counter.
    pub fn megabytes(&self, direction: Direction, window: Window) -> f64 {
        self.entries
            .iter()
            .find(|(dir, win, _)| *dir == direction && *win == window)
            .map_or(0.0, |(_, _, counter)| counter.megabytes())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn t(offset_secs: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + chrono::Duration::seconds(offset_secs)
    }

    fn daily_counter() -> UsageCounter {
        UsageCounter::new(Window::Daily, 1)
    }

    #[test]
    fn first_sample_establishes_baseline_without_increment() {
        let mut counter = daily_counter();
        assert_eq!(counter.record(Some(100.0), t(0)), SampleOutcome::Baseline);
        assert_eq!(counter.bytes(), 0.0);
    }

    #[test]
    fn rate_integration_over_sample_sequence() {
        // 100 B/s at t=0 (baseline), t=10, t=20 -> 2000 bytes.
        let mut counter = daily_counter();
        counter.record(Some(100.0), t(0));
        assert_eq!(counter.record(Some(100.0), t(10)), SampleOutcome::Accepted);
        assert_eq!(counter.record(Some(100.0), t(20)), SampleOutcome::Accepted);
        assert_eq!(counter.bytes(), 2000.0);
    }

    #[test]
    fn backward_clock_discards_sample_and_keeps_baseline() {
        let mut counter = daily_counter();
        counter.record(Some(100.0), t(0));
        counter.record(Some(100.0), t(10));
        assert_eq!(counter.record(Some(100.0), t(5)), SampleOutcome::Discarded);
        assert_eq!(counter.bytes(), 1000.0);
        // Baseline still at t=10: the next good sample integrates from there.
        assert_eq!(counter.record(Some(100.0), t(20)), SampleOutcome::Accepted);
        assert_eq!(counter.bytes(), 2000.0);
    }

    #[test]
    fn duplicate_timestamp_is_discarded() {
        let mut counter = daily_counter();
        counter.record(Some(100.0), t(0));
        counter.record(Some(100.0), t(10));
        assert_eq!(counter.record(Some(500.0), t(10)), SampleOutcome::Discarded);
        assert_eq!(counter.bytes(), 1000.0);
    }

    #[test]
    fn negative_rate_never_decreases_the_total() {
        let mut counter = daily_counter();
        counter.record(Some(100.0), t(0));
        counter.record(Some(100.0), t(20));
        assert_eq!(counter.bytes(), 2000.0);
        // A sample that would compute lower keeps the previous value.
        assert_eq!(counter.record(Some(-50.0), t(30)), SampleOutcome::Accepted);
        assert_eq!(counter.bytes(), 2000.0);
        // But bookkeeping advanced: next interval measures from t=30.
        counter.record(Some(100.0), t(40));
        assert_eq!(counter.bytes(), 3000.0);
    }

    #[test]
    fn missing_rate_advances_baseline_without_increment() {
        let mut counter = daily_counter();
        counter.record(Some(100.0), t(0));
        assert_eq!(counter.record(None, t(10)), SampleOutcome::Skipped);
        assert_eq!(counter.bytes(), 0.0);
        // Next interval measured from t=10, not t=0 -- no inflation.
        counter.record(Some(100.0), t(20));
        assert_eq!(counter.bytes(), 1000.0);
    }

    #[test]
    fn daily_rollover_zeroes_total_with_no_increment() {
        let mut counter = daily_counter();
        counter.record(Some(100.0), t(0));
        counter.record(Some(100.0), t(10));
        assert_eq!(counter.bytes(), 1000.0);

        // 72h later is a different local date in any timezone.
        let next_window = t(72 * 3600);
        assert_eq!(
            counter.record(Some(100.0), next_window),
            SampleOutcome::RolledOver
        );
        assert_eq!(counter.bytes(), 0.0);

        // Integration restarts from the rollover sample.
        counter.record(Some(100.0), next_window + chrono::Duration::seconds(10));
        assert_eq!(counter.bytes(), 1000.0);
    }

    #[test]
    fn restore_with_matching_key_keeps_value_but_rebaselines() {
        let now = t(0);
        let saved = CounterSnapshot {
            value: 5000.0,
            window_key: window_key(Window::Daily, 1, now),
            last_sample_time: Some(now - chrono::Duration::hours(3)),
        };
        let mut counter = UsageCounter::restore(Window::Daily, 1, Some(saved), now);
        assert_eq!(counter.bytes(), 5000.0);

        // First post-restart sample is baseline-only: the 3h gap must
        // not be integrated.
        assert_eq!(counter.record(Some(100.0), now), SampleOutcome::Baseline);
        assert_eq!(counter.bytes(), 5000.0);
        counter.record(Some(100.0), now + chrono::Duration::seconds(10));
        assert_eq!(counter.bytes(), 6000.0);
    }

    #[test]
    fn restore_with_stale_key_resets_to_zero() {
        let saved = CounterSnapshot {
            value: 5000.0,
            window_key: "1999-01-01".into(),
            last_sample_time: Some(t(0)),
        };
        let counter = UsageCounter::restore(Window::Daily, 1, Some(saved), t(0));
        assert_eq!(counter.bytes(), 0.0);
        assert!(counter.window_key_str().is_none());
    }

    #[test]
    fn restore_without_prior_state_starts_from_zero() {
        let counter = UsageCounter::restore(Window::BillingMonth, 15, None, t(0));
        assert_eq!(counter.bytes(), 0.0);
        assert!(counter.window_key_str().is_none());
    }

    #[test]
    fn megabytes_conversion_only_at_read_boundary() {
        let mut counter = daily_counter();
        counter.record(Some(1_000_000.0), t(0));
        counter.record(Some(1_000_000.0), t(10));
        assert_eq!(counter.bytes(), 10_000_000.0);
        assert_eq!(counter.megabytes(), 10.0);
    }

    // ── Ledger ──────────────────────────────────────────────────────

    #[test]
    fn ledger_routes_samples_to_both_windows_of_one_direction() {
        let store = MemoryCounterStore::new();
        let mut ledger = UsageLedger::restore(1, &store, t(0));

        ledger.record_sample(Direction::Down, Some(100.0), t(0), &store);
        ledger.record_sample(Direction::Down, Some(100.0), t(10), &store);

        assert_eq!(ledger.megabytes(Direction::Down, Window::Daily), 0.0); // 1000 B rounds to 0.00 MB
        assert!(ledger.megabytes(Direction::Up, Window::Daily) == 0.0);

        // Raw persisted values carry the full precision.
        let saved = store
            .load(&storage_key(Direction::Down, Window::Daily))
            .unwrap()
            .unwrap();
        assert_eq!(saved.value, 1000.0);
        let monthly = store
            .load(&storage_key(Direction::Down, Window::BillingMonth))
            .unwrap()
            .unwrap();
        assert_eq!(monthly.value, 1000.0);
        // Upload counters were never fed.
        assert!(
            store
                .load(&storage_key(Direction::Up, Window::Daily))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn ledger_survives_restart_via_store() {
        let store = MemoryCounterStore::new();
        let mut ledger = UsageLedger::restore(1, &store, t(0));
        ledger.record_sample(Direction::Up, Some(200_000.0), t(0), &store);
        ledger.record_sample(Direction::Up, Some(200_000.0), t(10), &store);
        assert_eq!(ledger.megabytes(Direction::Up, Window::Daily), 2.0);

        // Simulated restart within the same window.
        let restored = UsageLedger::restore(1, &store, t(60));
        assert_eq!(restored.megabytes(Direction::Up, Window::Daily), 2.0);
    }
}
