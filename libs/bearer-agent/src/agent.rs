use crate::builder::AgentBuilder;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::layer::{AgentLayer, AgentService};
use crate::logger::Logger;
use crate::record::ReportLog;
use crate::remote_config::{ConfigFetcher, RemoteConfig};
use crate::shipper::{Delivery, LogShipper};
use crate::transport::Transport;
use std::fmt;
use std::sync::Arc;

/// Bearer agent: reports outbound HTTP exchanges to the collector
///
/// Holds the secret key, the transports and the logger. Everything
/// is fixed at construction, so an `Agent` is `Clone + Send + Sync` and
/// cloning only bumps a reference count.
///
/// Use [`Agent::layer`] to intercept an existing tower stack, or
/// [`Agent::service`] to intercept the agent's own transport.
///
/// # Example
///
/// ```ignore
/// use bearer_agent::Agent;
/// use tower::ServiceExt;
///
/// let agent = Agent::builder()
///     .secret_key(std::env::var("BEARER_TOKEN").unwrap_or_default())
///     .build()?;
///
/// let client = tower::ServiceBuilder::new()
///     .layer(agent.layer())
///     .service(my_hyper_client);
///
/// let response = client.oneshot(request).await?;
/// ```
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    enabled: bool,
    upstream: Transport,
    shipper: LogShipper,
    fetcher: ConfigFetcher,
    delivery: Delivery,
    logger: Logger,
}

impl Agent {
    /// Create a builder for configuring the agent
    #[must_use]
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Build an agent from `config` with the default transports and logger
    ///
    /// # Errors
    /// See [`AgentBuilder::build`].
    pub fn from_config(config: AgentConfig) -> Result<Self, AgentError> {
        AgentBuilder::with_config(config).build()
    }

    /// Build an agent keyed by the `BEARER_TOKEN` environment variable
    ///
    /// # Errors
    /// See [`AgentBuilder::build`].
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_config(AgentConfig::from_env())
    }

    pub(crate) fn from_parts(
        enabled: bool,
        upstream: Transport,
        shipper: LogShipper,
        fetcher: ConfigFetcher,
        delivery: Delivery,
        logger: Logger,
    ) -> Self {
        Self {
            inner: Arc::new(AgentInner {
                enabled,
                upstream,
                shipper,
                fetcher,
                delivery,
                logger,
            }),
        }
    }

    /// `false` when no secret key is configured; the interceptor then only forwards.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    /// Tower layer reporting every exchange of the service it wraps
    #[must_use]
    pub fn layer(&self) -> AgentLayer {
        AgentLayer::new(self.clone())
    }

    /// Intercept an arbitrary transport
    #[must_use]
    pub fn wrap<S>(&self, inner: S) -> AgentService<S> {
        AgentService::new(inner, self.clone())
    }

    /// Intercept the agent's own HTTP client
    ///
    /// A standard hyper client accepting `http` and `https` URLs, independent
    /// of the collector's [`TransportSecurity`](crate::TransportSecurity).
    /// When a transport was injected with [`AgentBuilder::collector_transport`]
    /// that transport is wrapped instead.
    #[must_use]
    pub fn service(&self) -> AgentService<Transport> {
        self.wrap(self.inner.upstream.clone())
    }

    /// Fetch the collector-side configuration for this account
    ///
    /// Independent of interception; the agent does not act on the result.
    ///
    /// # Errors
    /// Returns `AgentError::InvalidHeaderValue` if the key is not a valid header,
    /// `AgentError::Transport` if the call fails, or `AgentError::Json` if the
    /// body is not a JSON object.
    pub async fn config(&self) -> Result<RemoteConfig, AgentError> {
        self.inner.fetcher.fetch().await
    }

    /// Ship `records` to the collector in one envelope
    ///
    /// Always inline, regardless of the configured delivery mode. An empty
    /// slice succeeds without a network call.
    ///
    /// # Errors
    /// Returns `AgentError::UnexpectedStatus` for any answer other than 200 and
    /// `AgentError::Transport` if the call fails.
    pub async fn log_records(&self, records: &[ReportLog]) -> Result<(), AgentError> {
        self.inner.shipper.ship(records).await
    }

    /// Deliver a record produced by the interceptor, logging any failure.
    pub(crate) async fn report(&self, record: ReportLog) {
        self.inner
            .delivery
            .deliver(record, &self.inner.logger)
            .await;
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("enabled", &self.inner.enabled)
            .finish_non_exhaustive()
    }
}
