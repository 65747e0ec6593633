//! Certificate verification against a known servers file.
//!
//! Instead of walking a CA chain, the vault's end-entity certificate is
//! fingerprinted and compared with the pinned records for its `host:port`.
//! A file that existed before parsing is authoritative: a certificate without
//! a matching record is rejected. A file the parser just created captures the
//! first certificate seen and appends it (trust on first use); from then on
//! it is enforced like any other.

use std::sync::{Arc, Mutex};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};

use crate::metadata::{Fingerprint, KnownServers};

#[derive(Debug)]
pub struct PinnedServerVerifier {
    authority: String,
    host: String,
    known_servers: Mutex<KnownServers>,
    provider: Arc<CryptoProvider>,
}

impl PinnedServerVerifier {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        known_servers: KnownServers,
        provider: Arc<CryptoProvider>,
    ) -> Self {
        let host = host.into();
        Self {
            authority: format!("{}:{}", host, port),
            host,
            known_servers: Mutex::new(known_servers),
            provider,
        }
    }

    /// Checks `der` against the pinned records, capturing it only if the file
    /// was just created and holds no record for the host.
    fn check_certificate(&self, der: &[u8]) -> Result<(), TlsError> {
        let mut known_servers = self
            .known_servers
            .lock()
            .map_err(|_| TlsError::General("known servers lock poisoned".into()))?;

        if known_servers.has_host(&self.authority, &self.host) {
            return if known_servers.trusts(&self.authority, &self.host, der) {
                Ok(())
            } else {
                log::error!(
                    "Certificate presented by {} does not match the fingerprint pinned in {}",
                    self.authority,
                    known_servers.path().display()
                );
                Err(TlsError::General(format!(
                    "certificate fingerprint for {} is not in the known servers file",
                    self.authority
                )))
            };
        }

        if !known_servers.was_created() {
            log::error!(
                "No fingerprint pinned for {} in {}",
                self.authority,
                known_servers.path().display()
            );
            return Err(TlsError::General(format!(
                "{} is not in the known servers file",
                self.authority
            )));
        }

        let fingerprint = Fingerprint::sha256_of(der);
        known_servers
            .record(&self.authority, fingerprint.clone())
            .map_err(|e| {
                TlsError::General(format!(
                    "unable to record fingerprint for {} in {}: {}",
                    self.authority,
                    known_servers.path().display(),
                    e
                ))
            })?;
        log::warn!(
            "Trusting first certificate seen for {} ({}) and recording it in {}",
            self.authority,
            fingerprint,
            known_servers.path().display()
        );
        Ok(())
    }
}

impl ServerCertVerifier for PinnedServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        self.check_certificate(end_entity.as_ref())?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
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
    ) -> Result<HandshakeSignatureValid, TlsError> {
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
