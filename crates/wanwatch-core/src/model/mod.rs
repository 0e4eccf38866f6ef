// ── Domain model ──

pub mod mac;
pub mod snapshot;

pub use mac::MacAddress;
pub use snapshot::{
    ActiveWan, GatewayInfo, MatchRule, SpeedtestReport, UplinkSummary, WanSlot, WanSnapshot,
};
