//! Builds [`ArtifactSigner`]s from parsed signing metadata.

use async_trait::async_trait;
use error_stack::{Report, ResultExt};

use crate::error::FactoryError;
use crate::metadata::{EmbeddedKeyMetadata, RemoteVaultKeyMetadata, SigningMetadata};
use crate::signer::{parse_bls_secret_key, ArtifactSigner, KeySource};
use crate::vault::VaultClient;

/// Turns metadata into a ready signer. Implementations never retry; a failed
/// creation leaves nothing behind, so the next lookup simply tries again.
#[async_trait]
pub trait SignerFactory: Send + Sync {
    async fn create(&self, metadata: SigningMetadata)
        -> Result<ArtifactSigner, Report<FactoryError>>;
}

/// Factory for the embedded-key and remote-vault backends.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSignerFactory;

impl ArtifactSignerFactory {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn create_embedded(metadata: EmbeddedKeyMetadata) -> ArtifactSigner {
        ArtifactSigner::new(metadata.secret_key, KeySource::Embedded)
    }

    /// Blocking: performs the vault round trip on the calling thread.
    fn create_remote_vault(
        metadata: &RemoteVaultKeyMetadata,
    ) -> Result<ArtifactSigner, Report<FactoryError>> {
        let secret = VaultClient::new(metadata)?
            .fetch_secret()
            .attach(format!("while loading key from vault {}", metadata.authority()))?;

        let secret_key = parse_bls_secret_key(&secret)
            .ok_or_else(|| Report::new(FactoryError::InvalidKeyMaterial))
            .attach(format!(
                "secret at {} is not a BLS secret key",
                metadata.key_path
            ))?;

        log::info!(
            "Loaded key for {} from vault {}",
            secret_key.public_key().to_hex(),
            metadata.authority()
        );

        Ok(ArtifactSigner::new(
            secret_key,
            KeySource::RemoteVault {
                host: metadata.host.clone(),
                key_path: metadata.key_path.clone(),
            },
        ))
    }
}

#[async_trait]
impl SignerFactory for ArtifactSignerFactory {
    async fn create(
        &self,
        metadata: SigningMetadata,
    ) -> Result<ArtifactSigner, Report<FactoryError>> {
        match metadata {
            SigningMetadata::Embedded(embedded) => Ok(Self::create_embedded(embedded)),
            SigningMetadata::RemoteVault(vault) => {
                tokio::task::spawn_blocking(move || Self::create_remote_vault(&vault))
                    .await
                    .map_err(|e| {
                        Report::new(FactoryError::backend_unavailable(format!(
                            "vault request task failed: {}",
                            e
                        )))
                    })?
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{VaultTls, DEFAULT_VAULT_KEY_NAME, DEFAULT_VAULT_TIMEOUT};
    use crate::signer::BlsSecretKey;
    use crate::test_support::tests::{
        closed_port, VaultStub, KNOWN_PUBLIC_KEY, KNOWN_SECRET_KEY,
    };
    use serde_json::json;

    fn vault_metadata(port: u16) -> SigningMetadata {
        SigningMetadata::RemoteVault(RemoteVaultKeyMetadata {
            host: "127.0.0.1".into(),
            port,
            key_path: "/v1/secret/data/validator".into(),
            key_name: DEFAULT_VAULT_KEY_NAME.into(),
            token: "accessToken".into(),
            tls: VaultTls::Disabled,
            timeout: DEFAULT_VAULT_TIMEOUT,
        })
    }

    #[tokio::test]
    async fn test_create_embedded_signer() {
        let secret_key =
            BlsSecretKey::from_bytes(&hex::decode(KNOWN_SECRET_KEY).unwrap()).unwrap();
        let metadata = SigningMetadata::Embedded(EmbeddedKeyMetadata { secret_key });

        let signer = ArtifactSignerFactory::new().create(metadata).await.unwrap();

        assert_eq!(signer.identifier(), KNOWN_PUBLIC_KEY);
        assert_eq!(signer.source(), &KeySource::Embedded);
    }

    #[tokio::test]
    async fn test_create_remote_vault_signer() {
        let stub = VaultStub::serve(
            200,
            &json!({ "data": { "data": { "value": format!("0x{}", KNOWN_SECRET_KEY) } } }),
        );

        let signer = ArtifactSignerFactory::new()
            .create(vault_metadata(stub.port()))
            .await
            .unwrap();

        assert_eq!(signer.identifier(), KNOWN_PUBLIC_KEY);
        assert_eq!(
            signer.source(),
            &KeySource::RemoteVault {
                host: "127.0.0.1".into(),
                key_path: "/v1/secret/data/validator".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_remote_vault_invalid_key_material() {
        let stub = VaultStub::serve(200, &json!({ "data": { "data": { "value": "0x1234" } } }));

        let report = ArtifactSignerFactory::new()
            .create(vault_metadata(stub.port()))
            .await
            .unwrap_err();

        assert!(matches!(
            report.current_context(),
            FactoryError::InvalidKeyMaterial
        ));
    }

    #[tokio::test]
    async fn test_remote_vault_unreachable() {
        let report = ArtifactSignerFactory::new()
            .create(vault_metadata(closed_port()))
            .await
            .unwrap_err();

        assert!(matches!(
            report.current_context(),
            FactoryError::BackendUnavailable { .. }
        ));
    }
}
