//! Rustls pieces of the default transports.

use crate::error::AgentError;
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::CertificateDer;
use std::sync::{Arc, OnceLock};

/// OS trust anchors, read on first use. Empty when the store had none.
static OS_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

/// Certificates of the OS trust store, shared by every agent in the process.
pub fn os_roots() -> &'static [CertificateDer<'static>] {
    OS_ROOTS.get_or_init(|| {
        let loaded = rustls_native_certs::load_native_certs();
        for err in &loaded.errors {
            tracing::warn!(error = %err, "skipping unreadable OS root certificate");
        }
        tracing::debug!(count = loaded.certs.len(), "OS root certificates loaded");
        loaded.certs
    })
}

/// Crypto provider for agent connections.
///
/// A provider installed by the host application wins; otherwise aws-lc-rs is
/// used without being installed process-wide.
pub fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Root store built from `certs`, keeping every certificate rustls can parse.
///
/// # Errors
///
/// Returns `AgentError::Tls` when no usable certificate remains.
pub fn root_store(certs: &[CertificateDer<'static>]) -> Result<RootCertStore, AgentError> {
    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(certs.iter().cloned());

    if ignored > 0 {
        tracing::warn!(added, ignored, "OS root certificates rejected by rustls");
    }
    if added == 0 {
        return Err(AgentError::Tls(
            format!("no usable OS root certificates ({ignored} rejected)").into(),
        ));
    }
    Ok(store)
}

/// Client configuration trusting the OS root certificates.
///
/// # Errors
///
/// Returns `AgentError::Tls` if the OS trust store yields no usable root.
pub fn os_roots_client_config() -> Result<ClientConfig, AgentError> {
    let roots = root_store(os_roots())?;

    let builder = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| AgentError::Tls(Box::new(e)))?;
    Ok(builder.with_root_certificates(roots).with_no_client_auth())
}
