// ── Topology & active-link resolution ──
//
// Turns one poll's raw device list into a normalized `WanSnapshot`:
// gateway selection, WAN slot enumeration, and active-WAN inference.
//
// Every function here is total. Malformed payloads degrade to "gateway
// not found" / "no active WAN determined" -- never an error, never a
// fabricated all-down state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use wanwatch_api::RawDevice;

use crate::model::{ActiveWan, GatewayInfo, MatchRule, UplinkSummary, WanSlot, WanSnapshot};

/// Gateway-family device-type tags, in selection priority order.
/// Switches and access points in the same listing never qualify.
const GATEWAY_TYPES: [&str; 4] = ["udm", "ugw", "uxg", "ucg"];

fn gateway_type_priority(tag: &str) -> Option<usize> {
    GATEWAY_TYPES.iter().position(|t| *t == tag)
}

// ── Gateway selection ───────────────────────────────────────────────

/// Select the gateway device from a raw device list.
///
/// Candidates are ordered by family-tag priority, then adopted devices
/// before unadopted, then devices already reporting an uplink section
/// before those that don't. Returns `None` when no candidate qualifies
/// -- that signals "device list not yet populated", not an error.
pub fn select_gateway(devices: &[RawDevice]) -> Option<&RawDevice> {
    let mut candidates: Vec<(usize, &RawDevice)> = devices
        .iter()
        .filter_map(|d| gateway_type_priority(&d.device_type).map(|prio| (prio, d)))
        .collect();
    // Stable sort: listing order breaks remaining ties.
    candidates.sort_by_key(|(prio, d)| (*prio, !d.adopted, !d.has_uplink()));
    candidates.into_iter().next().map(|(_, d)| d)
}

// ── WAN slot enumeration ────────────────────────────────────────────

/// Map a declared interface-name key to a slot number:
/// bare `"WAN"` is slot 1, `"WANk"` is slot k.
fn parse_slot_key(key: &str) -> Option<u8> {
    if key == "WAN" {
        return Some(1);
    }
    let suffix = key.strip_prefix("WAN")?;
    suffix.parse::<u8>().ok().filter(|n| *n >= 1)
}

/// The set of slot numbers this gateway generation declares.
fn declared_slot_numbers(device: &RawDevice) -> BTreeSet<u8> {
    device
        .last_wan_interfaces
        .as_ref()
        .map(|interfaces| interfaces.keys().filter_map(|k| parse_slot_key(k)).collect())
        .unwrap_or_default()
}

/// Resolve the per-slot sections for a gateway.
///
/// Slot 1 prefers a dedicated `wan1` section and falls back to the
/// legacy bare `wan` section when `wan1` is absent (older firmware).
/// Slot k>1 reads `wan{k}` directly; an absent section means the slot
/// is not populated this poll.
///
/// The second return value is the bare `wan` section when it was NOT
/// consumed as slot 1 and no `wan1` exists -- the input to the legacy
/// active-WAN rule. A firmware exposing both `wan` and `wan1` with
/// conflicting data is undefined behavior upstream; here `wan1` wins
/// and the bare section is dropped.
pub fn collect_wan_slots(device: &RawDevice) -> (BTreeMap<u8, WanSlot>, Option<WanSlot>) {
    let mut slots = BTreeMap::new();
    let mut bare_promoted = false;

    for number in declared_slot_numbers(device) {
        let section = if number == 1 {
            device.wan_section("wan1").or_else(|| {
                let bare = device.wan_section("wan");
                bare_promoted = bare.is_some();
                bare
            })
        } else {
            device.wan_section(&format!("wan{number}"))
        };

        if let Some(raw) = section {
            slots.insert(number, WanSlot::from_raw(number, &raw));
        }
    }

    let legacy = if bare_promoted || device.wan_section("wan1").is_some() {
        None
    } else {
        device
            .wan_section("wan")
            .map(|raw| WanSlot::from_raw(1, &raw))
    };

    (slots, legacy)
}

// ── Active-WAN inference ────────────────────────────────────────────

struct RuleInput<'a> {
    uplink: &'a UplinkSummary,
    slots: &'a BTreeMap<u8, WanSlot>,
    legacy: Option<&'a WanSlot>,
}

type RuleFn = fn(&RuleInput<'_>) -> Option<ActiveWan>;

/// The heuristic chain, evaluated in order with early exit. The order
/// IS the priority -- keep new rules at the right position.
const RULES: [(MatchRule, RuleFn); 5] = [
    (MatchRule::UplinkIp, rule_uplink_ip),
    (MatchRule::UplinkIfname, rule_uplink_ifname),
    (MatchRule::NameComment, rule_name_comment),
    (MatchRule::SoleLinkUp, rule_sole_link_up),
    (MatchRule::LegacyUp, rule_legacy_up),
];

fn rule_uplink_ip(input: &RuleInput<'_>) -> Option<ActiveWan> {
    let uplink_ip = input.uplink.ip?;
    input
        .slots
        .values()
        .find(|slot| slot.ip == Some(uplink_ip))
        .map(|slot| ActiveWan::Slot(slot.slot))
}

fn rule_uplink_ifname(input: &RuleInput<'_>) -> Option<ActiveWan> {
    let ifname = input.uplink.ifname.as_deref().filter(|s| !s.is_empty())?;
    input
        .slots
        .values()
        .find(|slot| slot.ifname.as_deref() == Some(ifname))
        .map(|slot| ActiveWan::Slot(slot.slot))
}

fn rule_name_comment(input: &RuleInput<'_>) -> Option<ActiveWan> {
    let labels = label_set(input.uplink.name.as_deref(), input.uplink.comment.as_deref());
    if labels.is_empty() {
        return None;
    }
    input
        .slots
        .values()
        .find(|slot| {
            let slot_labels = label_set(slot.name.as_deref(), slot.comment.as_deref());
            labels.iter().any(|l| slot_labels.contains(l))
        })
        .map(|slot| ActiveWan::Slot(slot.slot))
}

/// Lowercased, trimmed, non-empty name/comment labels -- either uplink
/// field may match either slot field.
fn label_set(name: Option<&str>, comment: Option<&str>) -> Vec<String> {
    [name, comment]
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn rule_sole_link_up(input: &RuleInput<'_>) -> Option<ActiveWan> {
    let mut up_slots = input.slots.values().filter(|slot| slot.up);
    let sole = up_slots.next()?;
    if up_slots.next().is_some() {
        return None;
    }
    Some(ActiveWan::Slot(sole.slot))
}

fn rule_legacy_up(input: &RuleInput<'_>) -> Option<ActiveWan> {
    input
        .legacy
        .filter(|wan| wan.up)
        .map(|_| ActiveWan::Legacy)
}

/// Decide which slot is presently carrying the uplink.
///
/// Returns the matched rule alongside the result so the decision is
/// explainable, never a black box. Falls through to
/// (`Unknown`, `NoMatch`) rather than guessing.
pub fn infer_active_wan(
    uplink: &UplinkSummary,
    slots: &BTreeMap<u8, WanSlot>,
    legacy: Option<&WanSlot>,
) -> (ActiveWan, MatchRule) {
    let input = RuleInput {
        uplink,
        slots,
        legacy,
    };
    for (rule, check) in RULES {
        if let Some(active) = check(&input) {
            return (active, rule);
        }
    }
    (ActiveWan::Unknown, MatchRule::NoMatch)
}

// ── Snapshot resolution ─────────────────────────────────────────────

/// Derive the normalized snapshot from one poll's raw device list.
pub fn resolve_snapshot(devices: &[RawDevice], fetched_at: DateTime<Utc>) -> WanSnapshot {
    let Some(gateway) = select_gateway(devices) else {
        debug!(
            device_count = devices.len(),
            "no gateway candidate in device list"
        );
        return WanSnapshot {
            fetched_at: Some(fetched_at),
            ..WanSnapshot::default()
        };
    };

    let uplink = gateway
        .uplink
        .as_ref()
        .map(UplinkSummary::from)
        .unwrap_or_default();
    let (slots, legacy_wan) = collect_wan_slots(gateway);
    let (active_wan, matched_rule) = infer_active_wan(&uplink, &slots, legacy_wan.as_ref());

    debug!(
        gateway = %gateway.mac,
        slot_count = slots.len(),
        active = %active_wan,
        rule = %matched_rule,
        "resolved WAN snapshot"
    );

    WanSnapshot {
        gateway: Some(GatewayInfo::from(gateway)),
        uplink,
        slots,
        legacy_wan,
        active_wan,
        matched_rule,
        fetched_at: Some(fetched_at),
    }
}
