//! Resolution of BLS validator keys into artifact signers.
//!
//! Keys are described by one definition file per public key in a key store
//! directory. A definition either embeds the secret key or points at a remote
//! HashiCorp-style vault holding it. The provider turns an identifier into a
//! ready signer on demand, caches it, and never surfaces internal failures to
//! its callers beyond "no signer".
//!
//! # Modules
//!
//! - [`error`]: Error types for parsing, signer creation and settings
//! - [`factory`]: Builds signers from parsed metadata
//! - [`metadata`]: Definition file model, parser and known servers file
//! - [`provider`]: Directory-backed lookup with caching and coalescing
//! - [`settings`]: Configuration management and validation
//! - [`signer`]: BLS keys, signatures and the signing capability
//! - [`test_support`]: Testing utilities and fixtures
//! - [`vault`]: Remote vault client and certificate pinning

pub mod error;
pub mod factory;
pub mod metadata;
pub mod provider;
pub mod settings;
pub mod signer;
pub mod vault;

pub use error::{FactoryError, ParseError, SettingsError};
pub use factory::{ArtifactSignerFactory, SignerFactory};
pub use metadata::{MetadataParser, SigningMetadata};
pub use provider::{DirectoryBackedSignerProvider, SignerCache};
pub use settings::Settings;
pub use signer::{ArtifactSignature, ArtifactSigner, BlsPublicKey, KeySource};
