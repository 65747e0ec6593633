//! Command implementations. Lookups only ever report "no signer"; the
//! reason is in the log.

use std::fs;
use std::path::{Path, PathBuf};

use artifact_signer_core::metadata::MetadataParser;
use artifact_signer_core::provider::DirectoryBackedSignerProvider;

use crate::error::CliError;

/// Where the bytes to sign come from.
#[derive(Debug, Clone)]
pub enum MessageSource {
    Text(String),
    Hex(String),
    File(PathBuf),
}

impl MessageSource {
    pub fn read(&self) -> Result<Vec<u8>, CliError> {
        match self {
            MessageSource::Text(text) => Ok(text.as_bytes().to_vec()),
            MessageSource::Hex(encoded) => {
                let digits = encoded.strip_prefix("0x").unwrap_or(encoded);
                Ok(hex::decode(digits)?)
            }
            MessageSource::File(path) => Ok(fs::read(path)?),
        }
    }
}

/// Signs `message` and returns the `0x`-prefixed signature.
pub async fn sign(
    provider: &DirectoryBackedSignerProvider,
    identifier: &str,
    message: &[u8],
) -> Result<String, CliError> {
    let signer = provider
        .get_signer(identifier)
        .await
        .ok_or_else(|| CliError::NoSigner(identifier.to_string()))?;
    Ok(signer.sign(message).to_hex())
}

pub async fn public_key(
    provider: &DirectoryBackedSignerProvider,
    identifier: &str,
) -> Result<String, CliError> {
    let signer = provider
        .get_signer(identifier)
        .await
        .ok_or_else(|| CliError::NoSigner(identifier.to_string()))?;
    Ok(format!("0x{}", signer.identifier()))
}

/// Parses one definition file without contacting any backend and returns its
/// type. A missing known servers file is still created.
pub fn validate(path: &Path) -> Result<&'static str, CliError> {
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    let metadata = MetadataParser::for_extension(extension)
        .parse_file(path)
        .map_err(|report| CliError::Definition(format!("{:?}", report)))?;
    Ok(metadata.type_name())
}
