use crate::agent::Agent;
use crate::config::{AgentConfig, DeliveryMode, TlsRootConfig, TransportSecurity};
use crate::error::AgentError;
use crate::logger::Logger;
use crate::remote_config::ConfigFetcher;
use crate::secret::SecretKey;
use crate::shipper::{Delivery, LogShipper};
use crate::transport::{Transport, collector_transport, into_transport, upstream_transport};
use bytes::Bytes;
use http::{Request, Response, Uri};
use http_body_util::Full;
use tower::{BoxError, Service};
use tracing::Dispatch;

/// Builder for constructing an [`Agent`].
///
/// Optional collaborators fall back to defaults: no logger means the process
/// default `tracing` subscriber, no transport means the standard hyper +
/// rustls clients (one for the collector, one for [`Agent::service`]).
pub struct AgentBuilder {
    config: AgentConfig,
    transport: Option<Transport>,
    logger: Option<Dispatch>,
}

impl AgentBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(AgentConfig::default())
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: AgentConfig) -> Self {
        Self {
            config,
            transport: None,
            logger: None,
        }
    }

    /// Set the account secret key; an empty key disables reporting
    #[must_use]
    pub fn secret_key(mut self, secret_key: impl Into<SecretKey>) -> Self {
        self.config.secret_key = secret_key.into();
        self
    }

    /// Override the logs endpoint
    #[must_use]
    pub fn logs_url(mut self, url: impl Into<String>) -> Self {
        self.config.logs_url = url.into();
        self
    }

    /// Override the config endpoint
    #[must_use]
    pub fn config_url(mut self, url: impl Into<String>) -> Self {
        self.config.config_url = url.into();
        self
    }

    /// Set transport security mode of the default collector transport
    #[must_use]
    pub fn transport_security(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow plain-HTTP collector endpoints (for testing only)
    ///
    /// Equivalent to `.transport_security(TransportSecurity::AllowInsecureHttp)`.
    /// Only available in debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "bearer_agent::security",
            "allow_insecure_http() called - collector traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Set the TLS root certificate strategy of the default collector transport
    #[must_use]
    pub fn tls_roots(mut self, tls_roots: TlsRootConfig) -> Self {
        self.config.tls_roots = tls_roots;
        self
    }

    /// Set the maximum collector response body size
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set the record delivery mode
    #[must_use]
    pub fn delivery(mut self, delivery: DeliveryMode) -> Self {
        self.config.delivery = delivery;
        self
    }

    /// Route the agent's own diagnostics to `dispatch`
    #[must_use]
    pub fn logger(mut self, dispatch: impl Into<Dispatch>) -> Self {
        self.logger = Some(dispatch.into());
        self
    }

    /// Use `service` instead of the standard clients
    ///
    /// The same transport reaches the collector and backs [`Agent::service`].
    #[must_use]
    pub fn collector_transport<S, B>(mut self, service: S) -> Self
    where
        S: Service<Request<Full<Bytes>>, Response = Response<B>> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
        S::Error: Into<BoxError>,
        B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        self.transport = Some(into_transport(service));
        self
    }

    /// Build the agent
    ///
    /// # Errors
    /// Returns `AgentError::InvalidUri` for an unparsable endpoint,
    /// `AgentError::Tls` if the default transport cannot load its root
    /// certificates, and `AgentError::NoRuntime` if background delivery is
    /// requested outside a Tokio runtime.
    pub fn build(self) -> Result<Agent, AgentError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock collectors"
            );
        }

        let logs_url = parse_endpoint(&self.config.logs_url)?;
        let config_url = parse_endpoint(&self.config.config_url)?;

        let (collector, upstream) = match self.transport {
            Some(transport) => (transport.clone(), transport),
            None => (
                collector_transport(&self.config)?,
                upstream_transport(&self.config)?,
            ),
        };

        let logger = Logger::new(self.logger);
        let secret_key = self.config.secret_key;
        let enabled = !secret_key.is_empty();

        let shipper = LogShipper::new(collector.clone(), logs_url, secret_key.clone());
        let fetcher = ConfigFetcher::new(
            collector,
            config_url,
            secret_key,
            self.config.max_body_size,
        );

        // The drain task only runs when there is something to report
        let delivery = match self.config.delivery {
            DeliveryMode::Background { capacity } if enabled => {
                Delivery::background(shipper.clone(), capacity, logger.clone())?
            }
            _ => Delivery::Inline(shipper.clone()),
        };

        logger.in_scope(|| {
            tracing::debug!(
                enabled,
                delivery = ?self.config.delivery,
                "bearer agent initialized"
            );
        });

        Ok(Agent::from_parts(
            enabled, upstream, shipper, fetcher, delivery, logger,
        ))
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_endpoint(url: &str) -> Result<Uri, AgentError> {
    let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| AgentError::InvalidUri {
        url: url.to_owned(),
        reason: e.to_string(),
    })?;

    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(AgentError::InvalidUri {
            url: url.to_owned(),
            reason: "collector URL must be absolute".to_owned(),
        });
    }
    Ok(uri)
}
