//! Client for HashiCorp-style KV v2 secret stores.
//!
//! A secret is read with a single authenticated request:
//!
//! ```text
//! GET <scheme>://<host>:<port><keyPath>
//! X-Vault-Token: <token>
//! ```
//!
//! and the key material is taken from `data.data.<keyName>` of the response.

pub mod tls;

use std::sync::Arc;

use error_stack::{Report, ResultExt};
use serde_json::Value;
use ureq::{Agent, AgentBuilder};
use zeroize::Zeroizing;

use crate::error::FactoryError;
use crate::metadata::{RemoteVaultKeyMetadata, VaultTls};

pub use tls::PinnedServerVerifier;

const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

pub struct VaultClient<'a> {
    metadata: &'a RemoteVaultKeyMetadata,
    agent: Agent,
}

impl<'a> VaultClient<'a> {
    /// Prepares a client for the vault described by `metadata`.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::BackendUnavailable`] if the TLS configuration
    /// cannot be built.
    pub fn new(metadata: &'a RemoteVaultKeyMetadata) -> Result<Self, Report<FactoryError>> {
        let mut builder = AgentBuilder::new().timeout(metadata.timeout);
        if let VaultTls::Pinned(known_servers) = &metadata.tls {
            builder = builder.tls_config(pinned_tls_config(metadata, known_servers.clone())?);
        }

        Ok(Self {
            metadata,
            agent: builder.build(),
        })
    }

    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.metadata.tls_enabled() {
            "https"
        } else {
            "http"
        };
        let path = &self.metadata.key_path;
        let separator = if path.starts_with('/') { "" } else { "/" };
        format!("{}://{}{}{}", scheme, self.metadata.authority(), separator, path)
    }

    /// Fetches the configured secret value.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::BackendUnavailable`] on transport failures,
    /// non-success statuses, unreadable bodies, or a missing secret field.
    pub fn fetch_secret(&self) -> Result<Zeroizing<String>, Report<FactoryError>> {
        let url = self.url();
        log::debug!("Fetching secret {} from {}", self.metadata.key_name, url);

        let response = self
            .agent
            .get(&url)
            .set(VAULT_TOKEN_HEADER, &self.metadata.token)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(status, _) => {
                    Report::new(FactoryError::backend_unavailable(format!(
                        "vault at {} responded with HTTP {}",
                        self.metadata.authority(),
                        status
                    )))
                }
                ureq::Error::Transport(transport) => {
                    Report::new(FactoryError::backend_unavailable(transport.to_string()))
                }
            })
            .attach(format!("while requesting {}", url))?;

        let body: Value = response.into_json().map_err(|e| {
            Report::new(FactoryError::backend_unavailable(format!(
                "unreadable vault response: {}",
                e
            )))
        })?;

        extract_secret(&body, &self.metadata.key_name)
            .map(Zeroizing::new)
            .ok_or_else(|| {
                Report::new(FactoryError::backend_unavailable(format!(
                    "secret '{}' not found at {}",
                    self.metadata.key_name, self.metadata.key_path
                )))
            })
    }
}

fn pinned_tls_config(
    metadata: &RemoteVaultKeyMetadata,
    known_servers: crate::metadata::KnownServers,
) -> Result<Arc<rustls::ClientConfig>, Report<FactoryError>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = PinnedServerVerifier::new(
        metadata.host.clone(),
        metadata.port,
        known_servers,
        Arc::clone(&provider),
    );

    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Report::new(FactoryError::backend_unavailable(e.to_string())))
        .attach("while building TLS configuration for vault")?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    Ok(Arc::new(config))
}

/// Reads `data.data.<key_name>` from a KV v2 response.
fn extract_secret(body: &Value, key_name: &str) -> Option<String> {
    body.get("data")?
        .get("data")?
        .get(key_name)?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Fingerprint, KnownServers, DEFAULT_VAULT_KEY_NAME, DEFAULT_VAULT_TIMEOUT};
    use crate::test_support::tests::{closed_port, VaultStub, VaultTlsStub, VAULT_TLS_CERT};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn metadata(port: u16, key_path: &str) -> RemoteVaultKeyMetadata {
        RemoteVaultKeyMetadata {
            host: "127.0.0.1".into(),
            port,
            key_path: key_path.into(),
            key_name: DEFAULT_VAULT_KEY_NAME.into(),
            token: "accessToken".into(),
            tls: VaultTls::Disabled,
            timeout: DEFAULT_VAULT_TIMEOUT,
        }
    }

    #[test]
    fn test_extract_secret() {
        let body = json!({ "data": { "data": { "value": "0xabc" } } });
        assert_eq!(extract_secret(&body, "value").as_deref(), Some("0xabc"));
        assert_eq!(extract_secret(&body, "other"), None);
        assert_eq!(extract_secret(&json!({ "data": {} }), "value"), None);
    }

    #[test]
    fn test_url_uses_scheme_and_port() {
        let mut vault = metadata(8200, "v1/secret/data/key");
        assert_eq!(
            VaultClient::new(&vault).unwrap().url(),
            "http://127.0.0.1:8200/v1/secret/data/key"
        );

        vault.tls = VaultTls::WebPki;
        vault.key_path = "/v1/secret/data/key".into();
        assert_eq!(
            VaultClient::new(&vault).unwrap().url(),
            "https://127.0.0.1:8200/v1/secret/data/key"
        );
    }

    #[test]
    fn test_fetch_secret_sends_token() {
        let stub = VaultStub::serve(200, &json!({ "data": { "data": { "value": "0x1234" } } }));
        let vault = metadata(stub.port(), "/v1/secret/data/validator");

        let secret = VaultClient::new(&vault).unwrap().fetch_secret().unwrap();

        assert_eq!(secret.as_str(), "0x1234");
        let request = stub.received_request();
        assert!(request.starts_with("GET /v1/secret/data/validator "));
        assert!(request.to_ascii_lowercase().contains("x-vault-token: accesstoken"));
    }

    #[test]
    fn test_fetch_secret_reports_http_status() {
        let stub = VaultStub::serve(403, &json!({ "errors": ["permission denied"] }));
        let vault = metadata(stub.port(), "/v1/secret/data/validator");

        let report = VaultClient::new(&vault).unwrap().fetch_secret().unwrap_err();

        assert!(report.current_context().to_string().contains("HTTP 403"));
    }

    #[test]
    fn test_fetch_secret_reports_missing_field() {
        let stub = VaultStub::serve(200, &json!({ "data": { "data": { "other": "x" } } }));
        let vault = metadata(stub.port(), "/v1/secret/data/validator");

        let report = VaultClient::new(&vault).unwrap().fetch_secret().unwrap_err();

        assert!(report
            .current_context()
            .to_string()
            .contains("secret 'value' not found"));
    }

    #[test]
    fn test_fetch_secret_connection_refused() {
        let vault = metadata(closed_port(), "/v1/secret/data/validator");

        let report = VaultClient::new(&vault).unwrap().fetch_secret().unwrap_err();

        let FactoryError::BackendUnavailable { cause } = report.current_context() else {
            panic!("expected BackendUnavailable");
        };
        assert!(
            cause.to_ascii_lowercase().contains("connection refused"),
            "unexpected cause: {cause}"
        );
    }

    fn pinned_metadata(port: u16, known_servers: KnownServers) -> RemoteVaultKeyMetadata {
        RemoteVaultKeyMetadata {
            tls: VaultTls::Pinned(known_servers),
            ..metadata(port, "/v1/secret/data/validator")
        }
    }

    fn secret_body() -> serde_json::Value {
        json!({ "data": { "data": { "value": "0x1234" } } })
    }

    #[test]
    fn test_fetch_secret_over_pinned_tls() {
        let stub = VaultTlsStub::serve(200, &secret_body());
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("known_servers");
        fs::write(
            &path,
            format!(
                "127.0.0.1:{} {}\n",
                stub.port(),
                Fingerprint::sha256_of(VAULT_TLS_CERT)
            ),
        )
        .unwrap();
        let vault = pinned_metadata(stub.port(), KnownServers::load_or_create(&path).unwrap());

        let secret = VaultClient::new(&vault).unwrap().fetch_secret().unwrap();

        assert_eq!(secret.as_str(), "0x1234");
        assert!(stub
            .received_request()
            .to_ascii_lowercase()
            .contains("x-vault-token: accesstoken"));
    }

    #[test]
    fn test_fetch_secret_rejects_unpinned_tls_certificate() {
        let stub = VaultTlsStub::serve(200, &secret_body());
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("known_servers");
        fs::write(
            &path,
            format!(
                "127.0.0.1:{} {}\n",
                stub.port(),
                Fingerprint::sha256_of(b"some other certificate")
            ),
        )
        .unwrap();
        let vault = pinned_metadata(stub.port(), KnownServers::load_or_create(&path).unwrap());

        let report = VaultClient::new(&vault).unwrap().fetch_secret().unwrap_err();

        assert!(matches!(
            report.current_context(),
            FactoryError::BackendUnavailable { .. }
        ));
        assert!(stub.received_request().is_empty());
    }

    #[test]
    fn test_fetch_secret_captures_certificate_in_new_known_servers_file() {
        let stub = VaultTlsStub::serve(200, &secret_body());
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("known_servers");
        let vault = pinned_metadata(stub.port(), KnownServers::load_or_create(&path).unwrap());

        let secret = VaultClient::new(&vault).unwrap().fetch_secret().unwrap();

        assert_eq!(secret.as_str(), "0x1234");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!(
                "127.0.0.1:{} {}\n",
                stub.port(),
                Fingerprint::sha256_of(VAULT_TLS_CERT)
            )
        );
    }
}
