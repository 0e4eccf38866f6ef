// ── WAN snapshot domain types ──
//
// The normalized view of one poll. Raw `wanwatch_api` payloads are
// converted here once; every consumer downstream reads these types and
// never touches wire JSON.

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use wanwatch_api::{RawDevice, RawUplink, RawWanSection};

use super::mac::MacAddress;

// ── Active WAN identity ─────────────────────────────────────────────

/// Which WAN slot is presently carrying the uplink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveWan {
    /// A numbered slot (WAN1, WAN2, ...).
    Slot(u8),
    /// The legacy unnumbered `wan` section on single-WAN firmware.
    Legacy,
    /// No determinable active link. Never a guess.
    #[default]
    Unknown,
}

impl std::fmt::Display for ActiveWan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slot(n) => write!(f, "WAN{n}"),
            Self::Legacy => write!(f, "WAN"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Which inference rule decided the active WAN. Exposed for diagnostics
/// so the heuristic chain stays auditable rule-by-rule.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum MatchRule {
    /// Uplink IP matched a slot IP exactly.
    UplinkIp,
    /// Uplink interface name matched a slot interface name exactly.
    UplinkIfname,
    /// Uplink name/comment matched a slot name/comment (case-insensitive).
    NameComment,
    /// Exactly one slot was up while all others were down or absent.
    SoleLinkUp,
    /// No slot resolved, but the legacy `wan` section was up.
    LegacyUp,
    /// Nothing matched.
    #[default]
    NoMatch,
}

// ── Gateway ─────────────────────────────────────────────────────────

/// Identity of the selected gateway device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayInfo {
    pub mac: MacAddress,
    /// Raw device-type tag ("udm", "ugw", ...).
    pub device_type: String,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub adopted: bool,
}

impl From<&RawDevice> for GatewayInfo {
    fn from(raw: &RawDevice) -> Self {
        Self {
            mac: MacAddress::new(&raw.mac),
            device_type: raw.device_type.clone(),
            model: raw.model.clone(),
            firmware_version: raw.version.clone(),
            adopted: raw.adopted,
        }
    }
}

// ── Uplink ──────────────────────────────────────────────────────────

/// Speed-test results as reported on the uplink section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedtestReport {
    pub down_mbps: Option<f64>,
    pub up_mbps: Option<f64>,
    pub ping_ms: Option<f64>,
    pub last_run: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

/// The gateway's currently-active internet-facing connection summary,
/// distinct from any individual WAN slot's static configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UplinkSummary {
    pub ip: Option<IpAddr>,
    pub ip6: Option<String>,
    pub ifname: Option<String>,
    pub name: Option<String>,
    pub comment: Option<String>,
    pub up: bool,
    /// Instantaneous receive rate, bytes/sec.
    pub rx_rate: Option<f64>,
    /// Instantaneous transmit rate, bytes/sec.
    pub tx_rate: Option<f64>,
    /// Lifetime device counters. Unreliable across reboots -- the usage
    /// engine integrates rates instead of trusting these.
    pub rx_total: Option<u64>,
    pub tx_total: Option<u64>,
    pub speedtest: SpeedtestReport,
}

impl UplinkSummary {
    /// Download throughput in Mbit/s, rounded to two decimals.
    pub fn rx_mbps(&self) -> Option<f64> {
        self.rx_rate.map(bytes_per_sec_to_mbps)
    }

    /// Upload throughput in Mbit/s, rounded to two decimals.
    pub fn tx_mbps(&self) -> Option<f64> {
        self.tx_rate.map(bytes_per_sec_to_mbps)
    }

    /// Human-readable link name: "comment (name)" when both are present
    /// and distinct, otherwise whichever is set.
    pub fn display_name(&self) -> Option<String> {
        let comment = self.comment.as_deref().unwrap_or("").trim();
        let name = self.name.as_deref().unwrap_or("").trim();
        match (comment.is_empty(), name.is_empty()) {
            (false, false) if !comment.eq_ignore_ascii_case(name) => {
                Some(format!("{comment} ({name})"))
            }
            (false, _) => Some(comment.to_owned()),
            (true, false) => Some(name.to_owned()),
            (true, true) => None,
        }
    }
}

impl From<&RawUplink> for UplinkSummary {
    fn from(raw: &RawUplink) -> Self {
        Self {
            ip: parse_ip(raw.ip.as_ref()),
            ip6: raw.ip6.clone(),
            ifname: raw.ifname.clone(),
            name: raw.name.clone(),
            comment: raw.comment.clone(),
            up: raw.up,
            rx_rate: raw.rx_rate,
            tx_rate: raw.tx_rate,
            rx_total: raw.rx_bytes,
            tx_total: raw.tx_bytes,
            speedtest: SpeedtestReport {
                down_mbps: raw.xput_down,
                up_mbps: raw.xput_up,
                ping_ms: raw.speedtest_ping,
                last_run: raw
                    .speedtest_lastrun
                    .filter(|ts| *ts > 0)
                    .and_then(|ts| DateTime::from_timestamp(ts, 0)),
                status: raw.speedtest_status.clone(),
            },
        }
    }
}

// ── WAN slot ────────────────────────────────────────────────────────

/// One physical WAN interface position (1..N) a gateway may expose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WanSlot {
    pub slot: u8,
    pub ip: Option<IpAddr>,
    pub ip6: Option<String>,
    pub ifname: Option<String>,
    pub name: Option<String>,
    pub comment: Option<String>,
    pub up: bool,
}

impl WanSlot {
    pub fn from_raw(slot: u8, raw: &RawWanSection) -> Self {
        Self {
            slot,
            ip: parse_ip(raw.ip.as_ref()),
            ip6: raw.ipv6.as_ref().and_then(pick_ipv6_from_value),
            ifname: raw.ifname.clone(),
            name: raw.name.clone(),
            comment: raw.comment.clone(),
            up: raw.up,
        }
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// The resolved, normalized unit passed downstream: selected gateway,
/// its uplink summary, and the slot mapping.
///
/// Invariant: if `gateway` is `None`, `uplink` is empty and `slots` is
/// empty -- consumers treat a null gateway as "no data", never as
/// zeroed metrics implying a real link-down.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WanSnapshot {
    pub gateway: Option<GatewayInfo>,
    pub uplink: UplinkSummary,
    pub slots: BTreeMap<u8, WanSlot>,
    /// The bare `wan` section, kept only when it was not promoted to
    /// slot 1. Input to the legacy active-WAN rule.
    pub legacy_wan: Option<WanSlot>,
    pub active_wan: ActiveWan,
    pub matched_rule: MatchRule,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl WanSnapshot {
    /// Whether this snapshot carries any gateway data at all.
    pub fn has_data(&self) -> bool {
        self.gateway.is_some()
    }

    /// MAC of the selected gateway, if one was found.
    pub fn gateway_mac(&self) -> Option<&MacAddress> {
        self.gateway.as_ref().map(|gw| &gw.mac)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Parse an optional string to an `IpAddr`, silently dropping unparseable values.
fn parse_ip(raw: Option<&String>) -> Option<IpAddr> {
    raw.and_then(|s| s.parse().ok())
}

fn bytes_per_sec_to_mbps(rate: f64) -> f64 {
    (rate * 8.0 / 1_000_000.0 * 100.0).round() / 100.0
}

fn parse_ipv6_text(raw: &str) -> Option<std::net::Ipv6Addr> {
    let candidate = raw.trim().split('/').next().unwrap_or(raw).trim();
    candidate.parse::<std::net::Ipv6Addr>().ok()
}

/// Pick the best IPv6 out of a string or array value: prefer the first
/// global address, fall back to the first link-local.
fn pick_ipv6_from_value(value: &Value) -> Option<String> {
    let mut first_link_local: Option<String> = None;

    let iter: Box<dyn Iterator<Item = &Value> + '_> = match value {
        Value::Array(items) => Box::new(items.iter()),
        _ => Box::new(std::iter::once(value)),
    };

    for item in iter {
        if let Some(ipv6) = item.as_str().and_then(parse_ipv6_text) {
            let ip_text = ipv6.to_string();
            if !ipv6.is_unicast_link_local() {
                return Some(ip_text);
            }
            if first_link_local.is_none() {
                first_link_local = Some(ip_text);
            }
        }
    }

    first_link_local
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uplink_mbps_conversion_rounds_to_two_decimals() {
        let uplink = UplinkSummary {
            rx_rate: Some(125_000.0),
            tx_rate: Some(1234.0),
            ..UplinkSummary::default()
        };
        assert_eq!(uplink.rx_mbps(), Some(1.0));
        assert_eq!(uplink.tx_mbps(), Some(0.01));
    }

    #[test]
    fn display_name_composes_comment_and_name() {
        let uplink = UplinkSummary {
            name: Some("eth8".into()),
            comment: Some("Fiber".into()),
            ..UplinkSummary::default()
        };
        assert_eq!(uplink.display_name().as_deref(), Some("Fiber (eth8)"));
    }

    #[test]
    fn display_name_dedupes_case_insensitive_equal_fields() {
        let uplink = UplinkSummary {
            name: Some("Fiber".into()),
            comment: Some("fiber".into()),
            ..UplinkSummary::default()
        };
        assert_eq!(uplink.display_name().as_deref(), Some("fiber"));
    }

    #[test]
    fn wan_slot_prefers_global_ipv6_over_link_local() {
        let raw: RawWanSection = serde_json::from_value(json!({
            "ip": "203.0.113.10",
            "ipv6": ["fe80::1", "2001:db8::10"],
            "up": true
        }))
        .unwrap();
        let slot = WanSlot::from_raw(1, &raw);
        assert_eq!(slot.ip6.as_deref(), Some("2001:db8::10"));
        assert_eq!(slot.ip.unwrap().to_string(), "203.0.113.10");
    }

    #[test]
    fn speedtest_zero_epoch_means_never_ran() {
        let raw: RawUplink = serde_json::from_value(json!({
            "speedtest_lastrun": 0,
            "xput_down": 0.0
        }))
        .unwrap();
        let uplink = UplinkSummary::from(&raw);
        assert!(uplink.speedtest.last_run.is_none());
    }

    #[test]
    fn default_snapshot_has_no_data() {
        let snap = WanSnapshot::default();
        assert!(!snap.has_data());
        assert!(snap.slots.is_empty());
        assert_eq!(snap.active_wan, ActiveWan::Unknown);
    }
}
