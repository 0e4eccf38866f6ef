// ── Monitor facade ──
//
// Ties the api client, topology resolver, usage ledger, and speed-test
// state together for one monitored gateway. The host's scheduler calls
// `poll_devices` / `poll_rates` on its two cadences; consumers read
// through the watch channel. One poll in flight at a time per monitor
// is the host's contract; the ledger lock keeps counter invariants
// intact even if that contract is broken.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wanwatch_api::{GatewayClient, RawDevice, TlsMode, TransportConfig};

use crate::config::{MonitorConfig, TlsVerification};
use crate::error::CoreError;
use crate::model::WanSnapshot;
use crate::speedtest::{RunningGuard, SpeedtestEvent, SpeedtestState, TriggerOutcome};
use crate::topology::resolve_snapshot;
use crate::usage::{CounterStore, Direction, UsageLedger, Window};

/// The main entry point for hosts.
///
/// Cheaply cloneable via `Arc`. Construction restores the usage ledger
/// from the counter store; [`start()`](Self::start) spawns the optional
/// auto speed-test task and requires a tokio runtime.
#[derive(Clone)]
pub struct WanMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: MonitorConfig,
    client: GatewayClient,
    snapshot: watch::Sender<Arc<WanSnapshot>>,
    ledger: tokio::sync::Mutex<UsageLedger>,
    store: Arc<dyn CounterStore>,
    speedtest: SpeedtestState,
    cancel: CancellationToken,
    auto_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

fn build_transport(config: &MonitorConfig) -> TransportConfig {
    TransportConfig {
        tls: match &config.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        },
        timeout: config.timeout,
    }
}

impl WanMonitor {
    /// Create a monitor from configuration and a counter store.
    ///
    /// Restores persisted usage state immediately -- counters are fully
    /// formed before the first poll. Does NOT spawn anything; call
    /// [`start()`](Self::start) from within a runtime.
    pub fn new(config: MonitorConfig, store: Arc<dyn CounterStore>) -> Result<Self, CoreError> {
        let config = config.normalized();
        let transport = build_transport(&config);
        let client = GatewayClient::new(
            config.url.clone(),
            config.site.clone(),
            config.platform,
            &transport,
            &config.api_key,
        )?;
        Self::with_client(config, client, store)
    }

    /// Create a monitor with a pre-built client (tests).
    pub fn with_client(
        config: MonitorConfig,
        client: GatewayClient,
        store: Arc<dyn CounterStore>,
    ) -> Result<Self, CoreError> {
        let config = config.normalized();
        let ledger = UsageLedger::restore(config.billing_reset_day, store.as_ref(), Utc::now());
        let (snapshot, _) = watch::channel(Arc::new(WanSnapshot::default()));

        Ok(Self {
            inner: Arc::new(MonitorInner {
                config,
                client,
                snapshot,
                ledger: tokio::sync::Mutex::new(ledger),
                store,
                speedtest: SpeedtestState::new(),
                cancel: CancellationToken::new(),
                auto_task: std::sync::Mutex::new(None),
            }),
        })
    }

    /// Access the monitor configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Full device-list poll: fetch, resolve, publish, feed the ledger.
    ///
    /// On a fetch failure the previous snapshot stays in place --
    /// consumers keep showing the last known values, never a fabricated
    /// all-down state.
    pub async fn poll_devices(&self) -> Result<(), CoreError> {
        let devices = self.inner.client.list_devices().await?;
        self.apply_devices(&devices).await;
        Ok(())
    }

    /// Fast rate poll: fetch only the known gateway by MAC.
    ///
    /// Falls back to a full device-list poll while no gateway has been
    /// resolved yet.
    pub async fn poll_rates(&self) -> Result<(), CoreError> {
        let mac = self.current().gateway_mac().cloned();
        let Some(mac) = mac else {
            return self.poll_devices().await;
        };
        let device = self.inner.client.get_device(mac.as_str()).await?;
        let devices: Vec<RawDevice> = device.into_iter().collect();
        self.apply_devices(&devices).await;
        Ok(())
    }

    async fn apply_devices(&self, devices: &[RawDevice]) {
        let now = Utc::now();
        let snap = resolve_snapshot(devices, now);

        // A null gateway is "no data" -- never integrate zeros from it.
        if snap.has_data() {
            let mut ledger = self.inner.ledger.lock().await;
            let store = self.inner.store.as_ref();
            ledger.record_sample(Direction::Down, snap.uplink.rx_rate, now, store);
            ledger.record_sample(Direction::Up, snap.uplink.tx_rate, now, store);
        }

        self.inner.snapshot.send_replace(Arc::new(snap));
    }

    // ── Snapshot access ──────────────────────────────────────────────

    /// The latest resolved snapshot (empty before the first poll).
    pub fn current(&self) -> Arc<WanSnapshot> {
        self.inner.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<WanSnapshot>> {
        self.inner.snapshot.subscribe()
    }

    // ── Usage reads ──────────────────────────────────────────────────

    /// Accumulated usage in megabytes for one (direction, window).
    pub async fn usage_megabytes(&self, direction: Direction, window: Window) -> f64 {
        self.inner.ledger.lock().await.megabytes(direction, window)
    }

    // ── Speed test ───────────────────────────────────────────────────

    /// Whether a speed test is currently in flight.
    pub fn speedtest_running(&self) -> bool {
        self.inner.speedtest.is_running()
    }

    /// Subscribe to the running flag.
    pub fn subscribe_speedtest_running(&self) -> watch::Receiver<bool> {
        self.inner.speedtest.subscribe_running()
    }

    /// Subscribe to running-flag transition events.
    pub fn subscribe_speedtest_events(&self) -> broadcast::Receiver<SpeedtestEvent> {
        self.inner.speedtest.subscribe_events()
    }

    /// Trigger a speed test on the gateway.
    ///
    /// Single-flight: a call while a run is active is a silent no-op.
    /// If no gateway is resolvable (after one forced re-poll) nothing
    /// is targeted and the running flag never flips. A failing remote
    /// call is logged, never propagated, and never leaves the flag
    /// stuck -- cleanup is guaranteed even if this future is cancelled
    /// mid-wait.
    pub async fn run_speedtest(&self) -> TriggerOutcome {
        let Some(_claim) = self.inner.speedtest.try_claim() else {
            debug!("speed test already in flight, dropping trigger");
            return TriggerOutcome::AlreadyRunning;
        };

        // Resolve the target before entering Running.
        let mut mac = self.current().gateway_mac().cloned();
        if mac.is_none() {
            debug!("no gateway in snapshot, forcing a refresh before speed test");
            if let Err(e) = self.poll_devices().await {
                warn!(error = %e, "refresh before speed test failed");
            }
            mac = self.current().gateway_mac().cloned();
        }
        let Some(mac) = mac else {
            warn!("cannot run speed test: no gateway found");
            return TriggerOutcome::NoGateway;
        };

        info!(gateway = %mac, "starting speed test");
        let guard = RunningGuard::enter(&self.inner.speedtest);

        if let Err(e) = self.inner.client.run_speedtest(mac.as_str()).await {
            warn!(error = %e, "speed test trigger failed");
        }

        // Let the device finish the test server-side before re-polling.
        let cancelled = tokio::select! {
            () = self.inner.cancel.cancelled() => true,
            () = tokio::time::sleep(self.inner.config.speedtest_settle) => false,
        };

        if cancelled {
            debug!("shutdown during speed test settle wait");
        } else {
            // Fresh polls so consumers observe the updated speed-test
            // fields; failures here keep the previous snapshot.
            if let Err(e) = self.poll_devices().await {
                warn!(error = %e, "post-speedtest device poll failed");
            }
            if let Err(e) = self.poll_rates().await {
                warn!(error = %e, "post-speedtest rate poll failed");
            }
        }

        drop(guard);
        TriggerOutcome::Completed
    }

    // ── Background tasks ─────────────────────────────────────────────

    /// Spawn the auto speed-test task if enabled. Must be called from
    /// within a tokio runtime. Idempotent per monitor.
    pub fn start(&self) {
        if !self.inner.config.auto_speedtest {
            return;
        }
        let mut slot = self
            .inner
            .auto_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_some() {
            return;
        }

        let monitor = self.clone();
        let cancel = self.inner.cancel.clone();
        let minutes = self.inner.config.auto_speedtest_minutes;
        info!(minutes, "auto speed test scheduled");

        *slot = Some(tokio::spawn(async move {
            let period = std::time::Duration::from_secs(minutes * 60);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; the cadence starts
            // one full period out.
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let _ = monitor.run_speedtest().await;
                    }
                }
            }
        }));
    }

    /// Cancel background work and in-flight waits. Cleanup paths (the
    /// leave-Running broadcast included) still run.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = self
            .inner
            .auto_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
