// Raw response types for the gateway telemetry endpoints.
//
// These mirror the wire format loosely on purpose: every field is
// defaulted, unknown fields land in a flattened catch-all map, and
// nothing here fails to deserialize just because a firmware revision
// renamed or dropped a key. Normalization into strong domain types
// happens in `wanwatch-core`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Response envelope ────────────────────────────────────────────────

/// The `{ data: [...], meta: { rc, msg } }` envelope wrapping every
/// legacy API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    pub meta: ResponseMeta,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMeta {
    pub rc: String,
    #[serde(default)]
    pub msg: Option<String>,
}

impl ResponseMeta {
    pub fn is_ok(&self) -> bool {
        self.rc == "ok"
    }
}

// ── Device ───────────────────────────────────────────────────────────

/// One entry from `stat/device`.
///
/// Gateways additionally carry an `uplink` section, a
/// `last_wan_interfaces` name map, and per-slot `wan` / `wan1` / `wanN`
/// sections. The slot sections are keyed dynamically, so they stay in
/// `extra` and are pulled out via [`RawDevice::wan_section`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDevice {
    #[serde(default)]
    pub mac: String,
    #[serde(default, rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_true")]
    pub adopted: bool,
    #[serde(default)]
    pub uplink: Option<RawUplink>,
    /// Declared WAN interface names ("WAN", "WAN2", ...) -> config blob.
    #[serde(default)]
    pub last_wan_interfaces: Option<serde_json::Map<String, Value>>,
    /// Catch-all for undocumented fields, including the `wan{N}` sections.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl RawDevice {
    /// Pull a `wan` / `wan1` / `wanN` section out of the catch-all map.
    ///
    /// Returns `None` when the key is absent or the section is not an
    /// object -- a missing slot is represented as missing, never as an
    /// empty-but-truthy section.
    pub fn wan_section(&self, key: &str) -> Option<RawWanSection> {
        let value = self.extra.get(key)?;
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Whether this device reports an uplink section at all.
    pub fn has_uplink(&self) -> bool {
        self.uplink.is_some()
    }
}

// ── Uplink ───────────────────────────────────────────────────────────

/// The gateway's currently-reported uplink view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawUplink {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub ip6: Option<String>,
    #[serde(default)]
    pub ifname: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub up: bool,
    /// Instantaneous receive rate, bytes/sec.
    #[serde(default, rename = "rx_bytes-r")]
    pub rx_rate: Option<f64>,
    /// Instantaneous transmit rate, bytes/sec.
    #[serde(default, rename = "tx_bytes-r")]
    pub tx_rate: Option<f64>,
    /// Lifetime device counter -- may reset on reboot or firmware change.
    #[serde(default)]
    pub rx_bytes: Option<u64>,
    #[serde(default)]
    pub tx_bytes: Option<u64>,
    #[serde(default)]
    pub xput_down: Option<f64>,
    #[serde(default)]
    pub xput_up: Option<f64>,
    #[serde(default)]
    pub speedtest_ping: Option<f64>,
    #[serde(default)]
    pub speedtest_lastrun: Option<i64>,
    #[serde(default)]
    pub speedtest_status: Option<String>,
}

// ── WAN slot section ─────────────────────────────────────────────────

/// One physical WAN interface's section (`wan`, `wan1`, `wan2`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawWanSection {
    #[serde(default)]
    pub ip: Option<String>,
    /// IPv6 addresses: some firmware reports an array, some a string.
    #[serde(default)]
    pub ipv6: Option<Value>,
    #[serde(default)]
    pub ifname: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub up: bool,
}
