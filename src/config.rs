//! TLS configuration.
//!
//! A single, process-wide [TlsConfig] backs every TLS connection and
//! accepted socket. It is installed with [install_tls_config] and read
//! by new TLS handshakes as they start; swapping it is atomic and never
//! affects sessions whose handshake already began.

use std::path::Path;
use std::sync::{Arc, RwLock};

use openssl::ssl::{SslAcceptor, SslConnector, SslFiletype, SslMethod, SslVerifyMode};

use crate::error::Result;

/// Loaded certificate material and the acceptor/connector contexts built
/// from it.
pub struct TlsConfig {
    acceptor: SslAcceptor,
    connector: SslConnector,
}

impl TlsConfig {
    /// Loads a certificate chain, private key, and trust anchors, plus
    /// optional Diffie-Hellman parameters, from disk, building both the
    /// server (accept) and client (connect) contexts from them. Peer
    /// verification is always on; there is no way to load a configuration
    /// that skips it.
    pub fn load(
        cert_path: &Path,
        key_path: &Path,
        ca_path: &Path,
        dh_path: Option<&Path>,
    ) -> Result<TlsConfig> {
        let mut acceptor_builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;
        acceptor_builder.set_certificate_chain_file(cert_path)?;
        acceptor_builder.set_private_key_file(key_path, SslFiletype::PEM)?;
        acceptor_builder.check_private_key()?;
        acceptor_builder.set_ca_file(ca_path)?;
        acceptor_builder.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
        if let Some(dh_path) = dh_path {
            let pem = std::fs::read(dh_path)?;
            let dh = openssl::dh::Dh::params_from_pem(&pem)?;
            acceptor_builder.set_tmp_dh(&dh)?;
        }

        let mut connector_builder = SslConnector::builder(SslMethod::tls())?;
        connector_builder.set_certificate_chain_file(cert_path)?;
        connector_builder.set_private_key_file(key_path, SslFiletype::PEM)?;
        connector_builder.check_private_key()?;
        connector_builder.set_ca_file(ca_path)?;
        connector_builder.set_verify(SslVerifyMode::PEER);

        Ok(TlsConfig {
            acceptor: acceptor_builder.build(),
            connector: connector_builder.build(),
        })
    }

    pub(crate) fn acceptor(&self) -> &SslAcceptor {
        &self.acceptor
    }

    pub(crate) fn connector(&self) -> &SslConnector {
        &self.connector
    }
}

static CURRENT: RwLock<Option<Arc<TlsConfig>>> = RwLock::new(None);

/// Installs `config` as the one used by every TLS handshake that starts
/// from this point on. Handshakes already in progress keep using
/// whatever was installed when they started.
pub fn install_tls_config(config: TlsConfig) {
    info!("installing new TLS configuration");
    *CURRENT.write().unwrap() = Some(Arc::new(config));
}

/// Removes the installed configuration. New TLS connects/accepts will
/// fail with `Error::Tls` until one is installed again.
pub fn clear_tls_config() {
    info!("clearing TLS configuration");
    *CURRENT.write().unwrap() = None;
}

pub(crate) fn current_tls_config() -> Option<Arc<TlsConfig>> {
    CURRENT.read().unwrap().clone()
}
