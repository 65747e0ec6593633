//! Signing metadata: where and how to obtain the key for one identifier.
//!
//! Every definition file parses into exactly one [`SigningMetadata`] variant.
//! Adding a backend means adding a variant here and one branch in
//! [`ArtifactSignerFactory`](crate::factory::ArtifactSignerFactory).

pub mod known_servers;
pub mod parser;

use std::fmt;
use std::time::Duration;

use crate::signer::BlsSecretKey;

pub use known_servers::{Fingerprint, KnownServer, KnownServers};
pub use parser::{DefinitionFormat, MetadataParser};

pub const DEFAULT_VAULT_PORT: u16 = 8200;
pub const DEFAULT_VAULT_KEY_NAME: &str = "value";
pub const DEFAULT_VAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Debug)]
pub enum SigningMetadata {
    Embedded(EmbeddedKeyMetadata),
    RemoteVault(RemoteVaultKeyMetadata),
}

impl SigningMetadata {
    /// Discriminator value used for this variant in definition files.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            SigningMetadata::Embedded(_) => EmbeddedKeyMetadata::TYPE,
            SigningMetadata::RemoteVault(_) => RemoteVaultKeyMetadata::TYPE,
        }
    }
}

/// Secret key stored inline in the definition file.
#[derive(Debug)]
pub struct EmbeddedKeyMetadata {
    pub secret_key: BlsSecretKey,
}

impl EmbeddedKeyMetadata {
    pub const TYPE: &'static str = "file-raw";
}

/// How the connection to a remote vault authenticates the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultTls {
    /// Plain HTTP.
    Disabled,
    /// TLS validated against the standard web PKI roots.
    WebPki,
    /// TLS validated against a known servers file instead of a CA.
    Pinned(KnownServers),
}

/// Key held in a HashiCorp-style KV v2 secret store.
pub struct RemoteVaultKeyMetadata {
    pub host: String,
    pub port: u16,
    pub key_path: String,
    pub key_name: String,
    pub token: String,
    pub tls: VaultTls,
    pub timeout: Duration,
}

impl RemoteVaultKeyMetadata {
    pub const TYPE: &'static str = "hashicorp";

    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        !matches!(self.tls, VaultTls::Disabled)
    }

    /// `host:port`, the form used to look up pinned fingerprints.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for RemoteVaultKeyMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteVaultKeyMetadata")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("key_path", &self.key_path)
            .field("key_name", &self.key_name)
            .field("token", &"<redacted>")
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}
