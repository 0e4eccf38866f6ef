// ── Runtime monitor configuration ──
//
// These types describe *how* to reach a gateway and which cadences and
// accounting boundaries the monitor uses. They carry credential data
// and tuning knobs, but never touch disk -- the host constructs a
// `MonitorConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use wanwatch_api::ControllerPlatform;

/// Floor for the device-list poll cadence.
pub const MIN_POLL_INTERVAL_SECS: u64 = 10;
/// Floor for the per-device rate poll cadence.
pub const MIN_RATE_INTERVAL_SECS: u64 = 1;
/// Floor for the auto speed-test cadence.
pub const MIN_AUTO_SPEEDTEST_MINUTES: u64 = 1;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed certs). Default for local gateways.
    #[default]
    DangerAcceptInvalid,
}

/// Configuration for monitoring a single gateway.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Controller URL (e.g., `https://192.168.1.1`).
    pub url: Url,
    /// Integration API key, sent as `X-API-Key`.
    pub api_key: SecretString,
    /// Site to operate on (defaults to "default").
    pub site: String,
    /// Controller API surface (UniFi OS proxy vs. standalone).
    pub platform: ControllerPlatform,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Request timeout.
    pub timeout: Duration,
    /// Device-list poll cadence (seconds).
    pub poll_interval_secs: u64,
    /// Per-device rate poll cadence (seconds).
    pub rate_interval_secs: u64,
    /// Day of month (1-31) on which the billing window resets.
    pub billing_reset_day: u8,
    /// Run a speed test automatically on a timer.
    pub auto_speedtest: bool,
    /// Auto speed-test cadence (minutes).
    pub auto_speedtest_minutes: u64,
    /// How long to wait after triggering a speed test before re-polling,
    /// so the device can finish the test server-side.
    pub speedtest_settle: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("https://192.168.1.1").expect("static URL"),
            api_key: SecretString::from(String::new()),
            site: "default".into(),
            platform: ControllerPlatform::UnifiOs,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            poll_interval_secs: 30,
            rate_interval_secs: 10,
            billing_reset_day: 1,
            auto_speedtest: false,
            auto_speedtest_minutes: 60,
            speedtest_settle: Duration::from_secs(15),
        }
    }
}

impl MonitorConfig {
    /// Clamp every tuning knob to its documented range.
    ///
    /// Out-of-range values are pulled to the nearest bound rather than
    /// rejected -- a misconfigured cadence should degrade, not refuse
    /// to monitor.
    pub fn normalized(mut self) -> Self {
        self.poll_interval_secs = self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS);
        self.rate_interval_secs = self.rate_interval_secs.max(MIN_RATE_INTERVAL_SECS);
        self.auto_speedtest_minutes = self.auto_speedtest_minutes.max(MIN_AUTO_SPEEDTEST_MINUTES);
        self.billing_reset_day = self.billing_reset_day.clamp(1, 31);
        self
    }

    /// Device-list poll cadence as a `Duration` (for the host scheduler).
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Rate poll cadence as a `Duration` (for the host scheduler).
    pub fn rate_interval(&self) -> Duration {
        Duration::from_secs(self.rate_interval_secs)
    }
}
