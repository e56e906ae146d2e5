use crate::config::{AgentConfig, TlsRootConfig, TransportSecurity};
use crate::error::AgentError;
use crate::tls;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service, ServiceExt};

/// Idle pooled connections are closed after this long
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Type-erased response body of a [`Transport`].
pub type ResponseBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// Type-erased "execute one HTTP request" capability.
///
/// Used to reach the collector, and by [`Agent::service`](crate::Agent::service)
/// as the transport to intercept. `Clone + Send + Sync`, so it can be
/// shared by every clone of an [`Agent`](crate::Agent) without locking.
pub type Transport =
    BoxCloneSyncService<Request<Full<Bytes>>, Response<ResponseBody>, AgentError>;

/// Erase a tower service into a [`Transport`].
///
/// Errors that already are [`AgentError`]s pass through; anything else becomes
/// [`AgentError::Transport`] with the original error as its source.
#[must_use]
pub fn into_transport<S, B>(service: S) -> Transport
where
    S: Service<Request<Full<Bytes>>, Response = Response<B>> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    let service = service
        .map_response(box_response_body::<B>)
        .map_err(|err: S::Error| map_transport_error(err.into()));
    BoxCloneSyncService::new(service)
}

/// Build the hyper + rustls transport used to reach the collector.
///
/// Follows `config.transport`, so plain-HTTP collector URLs are refused unless
/// insecure HTTP was explicitly allowed.
///
/// # Errors
///
/// Returns `AgentError::Tls` if the requested root certificates are unavailable.
pub fn collector_transport(config: &AgentConfig) -> Result<Transport, AgentError> {
    build_client(config, config.transport)
}

/// Build the hyper + rustls transport intercepted by [`Agent::service`](crate::Agent::service).
///
/// A general purpose client: both `http` and `https` upstreams are accepted
/// whatever the collector's transport security is.
///
/// # Errors
///
/// Returns `AgentError::Tls` if the requested root certificates are unavailable.
pub fn upstream_transport(config: &AgentConfig) -> Result<Transport, AgentError> {
    build_client(config, TransportSecurity::AllowInsecureHttp)
}

fn build_client(
    config: &AgentConfig,
    security: TransportSecurity,
) -> Result<Transport, AgentError> {
    let https = build_https_connector(config.tls_roots, security)?;

    let mut client_builder = Client::builder(TokioExecutor::new());
    // pool_timer is required for pool_idle_timeout to take effect
    client_builder
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(config.pool_max_idle_per_host);

    let client = client_builder.build::<_, Full<Bytes>>(https);
    Ok(into_transport(client))
}

fn box_response_body<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    response.map(|body| body.map_err(Into::into).boxed())
}

fn map_transport_error(err: BoxError) -> AgentError {
    match err.downcast::<AgentError>() {
        Ok(agent_err) => *agent_err,
        Err(other) => AgentError::Transport(other),
    }
}

fn build_https_connector(
    tls_roots: TlsRootConfig,
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, AgentError> {
    let allow_http = transport == TransportSecurity::AllowInsecureHttp;

    let builder = match tls_roots {
        TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(tls::provider())
            .map_err(|e| AgentError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls::os_roots_client_config()?),
    };

    let connector = if allow_http {
        builder.https_or_http().enable_all_versions().build()
    } else {
        builder.https_only().enable_all_versions().build()
    };
    Ok(connector)
}

/// Read a collector response body, failing once more than `limit` bytes arrive.
pub async fn read_body_limited(
    body: ResponseBody,
    limit: usize,
) -> Result<Bytes, AgentError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(AgentError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(AgentError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}
