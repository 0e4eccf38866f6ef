use thiserror::Error;

/// Top-level error type for the `wanwatch-api` crate.
///
/// Covers every failure mode the transport layer can surface:
/// HTTP transport, TLS setup, envelope-level API rejections, and
/// payload deserialization. `wanwatch-core` maps these into
/// domain-appropriate diagnostics -- consumers of the core crate
/// never see raw status codes or JSON parse failures.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── API ─────────────────────────────────────────────────────────
    /// Non-2xx response, or an error reported inside the
    /// `{meta: {rc, msg}}` envelope with HTTP 200.
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if the failure was at the HTTP layer).
        status: Option<u16>,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => matches!(status, Some(502 | 503 | 504)),
            _ => false,
        }
    }
}
