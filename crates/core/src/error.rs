//! Error types for signer resolution.
//!
//! None of these are surfaced to callers of
//! [`DirectoryBackedSignerProvider::get_signer`](crate::provider::DirectoryBackedSignerProvider::get_signer):
//! the provider logs them against the offending definition file and reports
//! "no signer available" instead.

use std::path::PathBuf;

use derive_more::{Display, Error};

/// Failures while turning a definition file into [`SigningMetadata`](crate::metadata::SigningMetadata).
#[derive(Debug, Display, Error)]
pub enum ParseError {
    /// The definition file could not be read.
    #[display("Unable to read signing metadata file {}", path.display())]
    Unreadable { path: PathBuf },

    /// The content is not a map in the configured definition format.
    #[display("Malformed signing metadata: {reason}")]
    Malformed { reason: String },

    /// The `type` discriminator names no known backend.
    #[display("Unknown signing metadata type '{kind}'")]
    UnknownType { kind: String },

    /// A field required by the selected backend is absent.
    #[display("Missing required field '{field}'")]
    MissingField { field: String },

    /// A field is present but has the wrong shape.
    #[display("Invalid value for field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// Embedded key bytes are not a valid BLS12-381 secret scalar.
    #[display("Invalid BLS secret key")]
    InvalidSecretKey,

    /// A line of the known servers file is not `<host> <algorithm>:<hex>`.
    #[display("Invalid fingerprint in known servers file {}: line {line_number}", path.display())]
    InvalidFingerprint { path: PathBuf, line_number: usize },

    /// The known servers file is absent and could not be created.
    #[display("Known servers file {} does not exist and could not be created", path.display())]
    KnownServersUnavailable { path: PathBuf },
}

/// Failures while building an [`ArtifactSigner`](crate::signer::ArtifactSigner) from metadata.
#[derive(Debug, Display, Error)]
pub enum FactoryError {
    /// The remote secret store could not be reached, refused the token, or
    /// did not hold the requested secret.
    #[display("Secret backend unavailable: {cause}")]
    BackendUnavailable {
        #[error(not(source))]
        cause: String,
    },

    /// The retrieved secret does not decode to a valid BLS secret key.
    #[display("Invalid key material")]
    InvalidKeyMaterial,
}

impl FactoryError {
    pub(crate) fn backend_unavailable(cause: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            cause: cause.into(),
        }
    }
}

/// Failures while loading [`Settings`](crate::settings::Settings).
#[derive(Debug, Display, Error)]
pub enum SettingsError {
    #[display("Failed to load configuration: {message}")]
    Load { message: String },

    #[display("Configuration failed validation: {message}")]
    Invalid { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        assert_eq!(
            ParseError::UnknownType {
                kind: "aws".into()
            }
            .to_string(),
            "Unknown signing metadata type 'aws'"
        );
        assert_eq!(
            ParseError::MissingField {
                field: "token".into()
            }
            .to_string(),
            "Missing required field 'token'"
        );
        assert!(ParseError::InvalidFingerprint {
            path: PathBuf::from("/tmp/known"),
            line_number: 1,
        }
        .to_string()
        .contains("Invalid fingerprint"));
        assert!(ParseError::KnownServersUnavailable {
            path: PathBuf::from("/tmp/known"),
        }
        .to_string()
        .contains("does not exist"));
    }

    #[test]
    fn test_factory_error_carries_cause() {
        let err = FactoryError::backend_unavailable("Connection refused (os error 111)");
        assert_eq!(
            err.to_string(),
            "Secret backend unavailable: Connection refused (os error 111)"
        );
    }
}
