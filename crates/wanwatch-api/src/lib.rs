//! Async client for the UniFi gateway telemetry endpoints.
//!
//! This crate owns the wire layer for the wanwatch workspace:
//!
//! - **[`GatewayClient`]** — site-scoped URL construction, `{data, meta}`
//!   envelope unwrapping, and the three endpoints the monitor needs
//!   (`stat/device` list, single-device lookup, `cmd/devmgr` speed test).
//! - **[`TransportConfig`]** — TLS mode, timeout, and `X-API-Key`
//!   header injection for building `reqwest::Client` instances.
//! - **Raw models** ([`models`]) — deliberately tolerant serde types
//!   with defaulted fields and a flattened catch-all map, so firmware
//!   variations never fail a poll. Normalization lives in
//!   `wanwatch-core`.

pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use client::{ControllerPlatform, GatewayClient};
pub use error::Error;
pub use models::{ApiResponse, RawDevice, RawUplink, RawWanSection, ResponseMeta};
pub use transport::{TlsMode, TransportConfig};
