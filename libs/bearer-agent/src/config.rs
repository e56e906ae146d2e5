use crate::secret::SecretKey;
use serde::Deserialize;

/// Collector endpoint receiving report records
pub const DEFAULT_LOGS_URL: &str = "https://agent.bearer.sh/logs";

/// Collector endpoint serving the account configuration
pub const DEFAULT_CONFIG_URL: &str = "https://config.bearer.sh/config";

/// Environment variable read by [`AgentConfig::from_env`]
pub const SECRET_KEY_ENV: &str = "BEARER_TOKEN";

/// Agent identifier sent in the logs envelope
pub const AGENT_TYPE: &str = "bearer-rust";

/// Agent version sent in the logs envelope
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runtime identifier sent in the logs envelope
pub const RUNTIME_TYPE: &str = "rust";

/// Compiler version the agent was built with (`unknown` if it could not be detected)
pub const RUNTIME_VERSION: &str = env!("BEARER_RUSTC_VERSION");

/// Log level flag sent in the logs envelope; the agent always reports everything
pub const LOG_LEVEL_ALL: &str = "ALL";

/// User-Agent used for requests to the collector
pub const DEFAULT_USER_AGENT: &str = concat!("bearer-rust/", env!("CARGO_PKG_VERSION"));

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration for the default collector transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only) - default and recommended
    #[default]
    TlsOnly,
    /// Allow insecure HTTP connections (for testing with mock collectors only)
    AllowInsecureHttp,
}

/// How report records travel from the interceptor to the collector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Ship each record before returning the response to the caller.
    ///
    /// Adds the collector round trip to every intercepted request.
    #[default]
    Inline,
    /// Push records onto a bounded queue drained by a background task.
    ///
    /// When the queue is full the record is dropped and a warning is logged.
    /// Requires a Tokio runtime when the agent is built.
    Background {
        /// Maximum number of queued records (clamped to at least 1)
        capacity: usize,
    },
}

/// Agent configuration
///
/// Every field has a default, so the struct can be embedded in a host
/// application's configuration file and only the secret key filled in:
///
/// ```yaml
/// bearer:
///   secret_key: sk_live_...
///   delivery:
///     background:
///       capacity: 256
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Account secret key; empty disables all reporting
    pub secret_key: SecretKey,

    /// Logs endpoint (default: [`DEFAULT_LOGS_URL`])
    pub logs_url: String,

    /// Config endpoint (default: [`DEFAULT_CONFIG_URL`])
    pub config_url: String,

    /// Transport security mode of the default collector transport (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// TLS root certificate strategy of the default collector transport (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Maximum collector response body size in bytes (default: 1 MiB)
    pub max_body_size: usize,

    /// Maximum number of idle collector connections per host (default: 32)
    pub pool_max_idle_per_host: usize,

    /// Record delivery mode (default: `Inline`)
    pub delivery: DeliveryMode,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            secret_key: SecretKey::default(),
            logs_url: DEFAULT_LOGS_URL.to_owned(),
            config_url: DEFAULT_CONFIG_URL.to_owned(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            max_body_size: 1024 * 1024,
            pool_max_idle_per_host: 32,
            delivery: DeliveryMode::Inline,
        }
    }
}

impl AgentConfig {
    /// Default configuration with the secret key taken from `BEARER_TOKEN`.
    ///
    /// A missing or non-UTF-8 variable leaves the key empty, which disables
    /// reporting rather than failing.
    #[must_use]
    pub fn from_env() -> Self {
        let secret_key = std::env::var(SECRET_KEY_ENV)
            .map(SecretKey::new)
            .unwrap_or_default();

        Self {
            secret_key,
            ..Self::default()
        }
    }

    /// `true` when a secret key is configured
    #[must_use]
    pub fn is_reporting_enabled(&self) -> bool {
        !self.secret_key.is_empty()
    }
}
