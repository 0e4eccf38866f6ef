//! WAN telemetry layer between `wanwatch-api` and host consumers.
//!
//! This crate owns the business logic for monitoring a single gateway:
//!
//! - **[`WanMonitor`]** — Facade managing one monitored device:
//!   polling pipeline, reactive snapshot publishing, usage accounting,
//!   speed-test orchestration, and the optional auto speed-test task.
//!
//! - **[`topology`]** — Gateway selection, WAN slot enumeration, and
//!   the ordered active-WAN inference rule chain. Total functions:
//!   malformed payloads degrade to null/unknown, never errors.
//!
//! - **[`usage`]** — Rate-integrating cumulative counters over daily
//!   and billing-month windows, with monotonic clamping, rollover, and
//!   restart persistence through a [`CounterStore`].
//!
//! - **Domain model** ([`model`]) — The normalized [`WanSnapshot`]
//!   vocabulary shared by every consumer.

pub mod config;
pub mod error;
pub mod model;
pub mod monitor;
pub mod speedtest;
pub mod topology;
pub mod usage;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{MonitorConfig, TlsVerification};
pub use error::CoreError;
pub use monitor::WanMonitor;
pub use speedtest::{SpeedtestEvent, TriggerOutcome};
pub use usage::{
    CounterSnapshot, CounterStore, Direction, JsonCounterStore, MemoryCounterStore, UsageCounter,
    UsageLedger, Window,
};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ActiveWan, GatewayInfo, MacAddress, MatchRule, SpeedtestReport, UplinkSummary, WanSlot,
    WanSnapshot,
};
