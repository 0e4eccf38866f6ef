// Gateway HTTP client
//
// Wraps `reqwest::Client` with UniFi-specific URL construction,
// envelope unwrapping, and platform-aware path prefixing. All methods
// return unwrapped `data` payloads -- the `{data, meta}` envelope is
// stripped before the caller sees it.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::models::{ApiResponse, RawDevice};
use crate::transport::TransportConfig;

/// Which API surface the controller exposes.
///
/// UniFi OS consoles (UDM, UCG, Cloud Key Gen2) proxy the Network
/// application under `/proxy/network/`; standalone controllers serve
/// the API at the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPlatform {
    UnifiOs,
    Standalone,
}

impl ControllerPlatform {
    fn api_prefix(self) -> &'static str {
        match self {
            Self::UnifiOs => "proxy/network/api",
            Self::Standalone => "api",
        }
    }
}

/// `Url::join` treats the last segment of a slash-less path as a file
/// and drops it. Base URLs like `https://host/controller` must keep
/// their path as a prefix, so normalize once at construction.
fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Raw HTTP client for the gateway telemetry endpoints.
///
/// Handles site-scoped URL construction and envelope unwrapping.
/// Authentication is an `X-API-Key` default header injected by
/// [`TransportConfig::build_client`].
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: Url,
    site: String,
    platform: ControllerPlatform,
}

impl GatewayClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` should be the controller root (e.g.
    /// `https://192.168.1.1` for UniFi OS). A path on the base URL is
    /// kept as a prefix for every request.
    pub fn new(
        base_url: Url,
        site: String,
        platform: ControllerPlatform,
        transport: &TransportConfig,
        api_key: &secrecy::SecretString,
    ) -> Result<Self, Error> {
        let http = transport.build_client(api_key)?;
        Ok(Self {
            http,
            base_url: ensure_trailing_slash(base_url),
            site,
            platform,
        })
    }

    /// Create a client with a pre-built `reqwest::Client` (tests).
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        site: String,
        platform: ControllerPlatform,
    ) -> Self {
        Self {
            http,
            base_url: ensure_trailing_slash(base_url),
            site,
            platform,
        }
    }

    /// The current site identifier.
    pub fn site(&self) -> &str {
        &self.site
    }

    /// The controller base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn site_url(&self, path: &str) -> Result<Url, Error> {
        let full = format!(
            "{}/s/{}/{}",
            self.platform.api_prefix(),
            self.site,
            path
        );
        Ok(self.base_url.join(&full)?)
    }

    // ── Envelope handling ─────────────────────────────────────────────

    async fn unwrap_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Vec<T>, Error> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let snippet: String = body.chars().take(200).collect();
            return Err(Error::Api {
                message: format!("HTTP {status}: {snippet}"),
                status: Some(status.as_u16()),
            });
        }

        let envelope: ApiResponse<T> =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body,
            })?;

        if !envelope.meta.is_ok() {
            return Err(Error::Api {
                message: envelope
                    .meta
                    .msg
                    .unwrap_or_else(|| format!("rc={}", envelope.meta.rc)),
                status: None,
            });
        }

        Ok(envelope.data)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, Error> {
        trace!(%url, "GET");
        let response = self.http.get(url).send().await?;
        Self::unwrap_envelope(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<Vec<T>, Error> {
        trace!(%url, "POST");
        let response = self.http.post(url).json(body).send().await?;
        Self::unwrap_envelope(response).await
    }

    // ── Endpoints ─────────────────────────────────────────────────────

    /// List all devices with full statistics.
    ///
    /// `GET /api/s/{site}/stat/device`
    pub async fn list_devices(&self) -> Result<Vec<RawDevice>, Error> {
        let url = self.site_url("stat/device")?;
        debug!("listing devices");
        self.get(url).await
    }

    /// Get a single device by MAC address.
    ///
    /// Filters the device list by MAC. Returns `None` if no device matches.
    pub async fn get_device(&self, mac: &str) -> Result<Option<RawDevice>, Error> {
        let url = self.site_url("stat/device")?;
        let body = json!({ "macs": [mac.to_lowercase()] });
        let devices: Vec<RawDevice> = self.post(url, &body).await?;
        Ok(devices.into_iter().next())
    }

    /// Start a speed test on the gateway.
    ///
    /// `POST /api/s/{site}/cmd/devmgr` with `{"cmd": "speedtest", "mac": "..."}`
    pub async fn run_speedtest(&self, mac: &str) -> Result<(), Error> {
        let url = self.site_url("cmd/devmgr")?;
        debug!(mac, "starting speed test");
        let _: Vec<serde_json::Value> = self
            .post(
                url,
                &json!({
                    "cmd": "speedtest",
                    "mac": mac,
                }),
            )
            .await?;
        Ok(())
    }
}
