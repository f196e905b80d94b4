//! Outbound TLS configuration
//!
//! The relay admits destinations by hostname, not by certificate chain, so
//! chain verification is switched off by default through
//! `insecure_skip_verify`. Handshake signatures are still checked so the
//! peer must hold the key for the certificate it presents.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use sigrelay_core::{Error, Result};
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// Build the TLS connector for upstream calls
pub fn connector(insecure_skip_verify: bool) -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let builder = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Config(format!("Failed to initialise TLS: {e}")))?;

    let config = if insecure_skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(HostnameTrust::new(provider)))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(native_roots()?)
            .with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

fn native_roots() -> Result<RootCertStore> {
    let certs = rustls_native_certs::load_native_certs()
        .map_err(|e| Error::Config(format!("Failed to load native root certificates: {e}")))?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    tracing::debug!(added, ignored, "Loaded native root certificates");

    if roots.is_empty() {
        return Err(Error::Config(
            "No usable root certificates found for upstream verification".to_string(),
        ));
    }

    Ok(roots)
}

/// Accepts any certificate chain, verifies handshake signatures
#[derive(Debug)]
struct HostnameTrust {
    provider: Arc<CryptoProvider>,
}

impl HostnameTrust {
    fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for HostnameTrust {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insecure_connector_builds() {
        assert!(connector(true).is_ok());
    }

    #[test]
    fn test_verifier_accepts_any_chain() {
        let verifier = HostnameTrust::new(Arc::new(rustls::crypto::ring::default_provider()));
        let name = ServerName::try_from("ca.gov.ua").unwrap();
        let cert = CertificateDer::from(vec![0u8; 4]);

        assert!(verifier
            .verify_server_cert(&cert, &[], &name, &[], UnixTime::now())
            .is_ok());
        assert!(!verifier.supported_verify_schemes().is_empty());
    }
}
