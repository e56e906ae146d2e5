#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Bearer agent for tower-based HTTP clients
//!
//! Wraps an outbound HTTP transport so every request/response exchange is
//! timed and reported to the Bearer collector, without changing what the
//! caller sees:
//! - The wrapped service's response, body and error are returned untouched
//! - Transport errors are never reported (there is no response to describe)
//! - Collector failures are logged through `tracing` and swallowed
//! - An empty secret key turns the interceptor into a pure passthrough
//!
//! Headers are reported with one value per name (the first one), bodies are
//! not captured.
//!
//! # Example
//!
//! ```ignore
//! use bearer_agent::Agent;
//! use tower::ServiceExt;
//!
//! let agent = Agent::from_env()?;
//!
//! // Intercept the agent's standard hyper client...
//! let response = agent.service().oneshot(request).await?;
//!
//! // ...or any tower stack
//! let client = tower::ServiceBuilder::new()
//!     .layer(agent.layer())
//!     .service(my_client);
//!
//! // Collector-side configuration (informational)
//! let remote = agent.config().await?;
//! ```

mod agent;
mod builder;
mod config;
mod error;
mod headers;
mod layer;
mod logger;
mod record;
mod remote_config;
mod secret;
mod shipper;
mod tls;
mod transport;

pub use agent::Agent;
pub use builder::AgentBuilder;
pub use config::{
    AGENT_TYPE, AGENT_VERSION, AgentConfig, DEFAULT_CONFIG_URL, DEFAULT_LOGS_URL,
    DEFAULT_USER_AGENT, DeliveryMode, LOG_LEVEL_ALL, RUNTIME_TYPE, RUNTIME_VERSION,
    SECRET_KEY_ENV, TlsRootConfig, TransportSecurity,
};
pub use error::AgentError;
pub use headers::normalize_headers;
pub use layer::{AgentLayer, AgentService, ResponseFuture};
pub use record::{RecordType, ReportLog};
pub use remote_config::RemoteConfig;
pub use secret::SecretKey;
pub use transport::{ResponseBody, Transport, into_transport};
