use crate::config::DEFAULT_USER_AGENT;
use crate::error::AgentError;
use crate::secret::SecretKey;
use crate::transport::{Transport, read_body_limited};
use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use http::{HeaderValue, Method, Request, Uri};
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower::{Service, ServiceExt};

/// Collector-side configuration for the account.
///
/// The shape belongs to the collector; the agent only checks that it is a
/// JSON object and does not act on its contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteConfig(Map<String, Value>);

impl RemoteConfig {
    /// Look up a top-level entry
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// All top-level entries
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Take ownership of the top-level entries
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Fetches [`RemoteConfig`] from the config endpoint.
#[derive(Clone)]
pub struct ConfigFetcher {
    transport: Transport,
    url: Uri,
    secret_key: SecretKey,
    max_body_size: usize,
}

impl ConfigFetcher {
    pub fn new(
        transport: Transport,
        url: Uri,
        secret_key: SecretKey,
        max_body_size: usize,
    ) -> Self {
        Self {
            transport,
            url,
            secret_key,
            max_body_size,
        }
    }

    /// `GET <config_url>` authenticated with the raw secret key.
    ///
    /// The status code is not inspected; an error page fails in deserialization.
    pub async fn fetch(&self) -> Result<RemoteConfig, AgentError> {
        let mut authorization = HeaderValue::from_str(self.secret_key.expose())?;
        authorization.set_sensitive(true);

        let request = Request::builder()
            .method(Method::GET)
            .uri(self.url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(AUTHORIZATION, authorization)
            .header(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT))
            .body(Full::new(Bytes::new()))?;

        let mut transport = self.transport.clone();
        let response = transport.ready().await?.call(request).await?;
        tracing::debug!(status = response.status().as_u16(), "config response received");

        let body = read_body_limited(response.into_body(), self.max_body_size).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
