//! Parses definition files into [`SigningMetadata`].
//!
//! A definition file is a flat map with a `type` discriminator:
//!
//! ```yaml
//! type: "file-raw"
//! privateKey: "0x3ee2224386c82ffea477e2adf28a2929f5c349165a4196158c7f3a2ecca40f35"
//! ```
//!
//! ```yaml
//! type: "hashicorp"
//! serverHost: "vault.internal"
//! serverPort: "8200"
//! keyPath: "/v1/secret/data/validator"
//! keyName: "value"
//! token: "s.token"
//! tlsEnabled: "true"
//! tlsKnownServersPath: "known_servers"
//! timeout: "10000"
//! ```
//!
//! Booleans and numbers may be written natively or as strings.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use error_stack::{Report, ResultExt};
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::signer::parse_bls_secret_key;

use super::{
    EmbeddedKeyMetadata, KnownServers, RemoteVaultKeyMetadata, SigningMetadata, VaultTls,
    DEFAULT_VAULT_KEY_NAME, DEFAULT_VAULT_PORT, DEFAULT_VAULT_TIMEOUT,
};

const TYPE_FIELD: &str = "type";

/// Serialization format of definition files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Yaml,
    Toml,
    Json,
}

impl DefinitionFormat {
    /// Picks the format matching a file extension, defaulting to YAML.
    #[must_use]
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "toml" => Self::Toml,
            "json" => Self::Json,
            _ => Self::Yaml,
        }
    }

    fn decode(self, contents: &str) -> Result<Value, String> {
        match self {
            Self::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataParser {
    format: DefinitionFormat,
}

impl MetadataParser {
    #[must_use]
    pub fn new(format: DefinitionFormat) -> Self {
        Self { format }
    }

    #[must_use]
    pub fn for_extension(extension: &str) -> Self {
        Self::new(DefinitionFormat::from_extension(extension))
    }

    /// Reads and parses one definition file. Relative known servers paths
    /// are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Unreadable`] if the file cannot be read, otherwise
    /// any error from [`MetadataParser::parse`].
    pub fn parse_file(&self, path: &Path) -> Result<SigningMetadata, Report<ParseError>> {
        let contents = fs::read_to_string(path).change_context_lazy(|| ParseError::Unreadable {
            path: path.to_path_buf(),
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        self.parse(&contents, base_dir)
    }

    /// Parses definition file contents.
    ///
    /// The only side effect is loading (or, on first use, creating) the
    /// known servers file of a TLS-enabled vault definition.
    ///
    /// # Errors
    ///
    /// - [`ParseError::Malformed`] if the content is not a map
    /// - [`ParseError::UnknownType`] for an unrecognised `type`
    /// - [`ParseError::MissingField`] / [`ParseError::InvalidField`] for bad fields
    /// - [`ParseError::InvalidSecretKey`] for an unusable embedded key
    /// - [`ParseError::InvalidFingerprint`] / [`ParseError::KnownServersUnavailable`]
    ///   for known servers file problems
    pub fn parse(
        &self,
        contents: &str,
        base_dir: &Path,
    ) -> Result<SigningMetadata, Report<ParseError>> {
        let value = self
            .format
            .decode(contents)
            .map_err(|reason| Report::new(ParseError::Malformed { reason }))?;
        let Value::Object(map) = value else {
            return Err(Report::new(ParseError::Malformed {
                reason: "expected a map of fields".into(),
            }));
        };
        let fields = Fields(&map);

        let kind = fields.required_str(TYPE_FIELD)?;
        if kind.eq_ignore_ascii_case(EmbeddedKeyMetadata::TYPE) {
            parse_embedded(&fields).map(SigningMetadata::Embedded)
        } else if kind.eq_ignore_ascii_case(RemoteVaultKeyMetadata::TYPE) {
            parse_remote_vault(&fields, base_dir).map(SigningMetadata::RemoteVault)
        } else {
            Err(Report::new(ParseError::UnknownType { kind }))
        }
    }
}

fn parse_embedded(fields: &Fields<'_>) -> Result<EmbeddedKeyMetadata, Report<ParseError>> {
    let encoded = fields.required_str("privateKey")?;
    let secret_key =
        parse_bls_secret_key(&encoded).ok_or_else(|| Report::new(ParseError::InvalidSecretKey))?;
    Ok(EmbeddedKeyMetadata { secret_key })
}

fn parse_remote_vault(
    fields: &Fields<'_>,
    base_dir: &Path,
) -> Result<RemoteVaultKeyMetadata, Report<ParseError>> {
    let host = fields.required_str("serverHost")?;
    let key_path = fields.required_str("keyPath")?;
    let token = fields.required_str("token")?;
    let port = fields
        .optional_u64("serverPort")?
        .map(|port| {
            u16::try_from(port).map_err(|_| {
                Report::new(ParseError::InvalidField {
                    field: "serverPort".into(),
                    reason: format!("{} is not a valid port", port),
                })
            })
        })
        .transpose()?
        .unwrap_or(DEFAULT_VAULT_PORT);
    let key_name = fields
        .optional_str("keyName")?
        .unwrap_or_else(|| DEFAULT_VAULT_KEY_NAME.to_string());
    let timeout = fields
        .optional_u64("timeout")?
        .map_or(DEFAULT_VAULT_TIMEOUT, Duration::from_millis);
    let tls_enabled = fields.optional_bool("tlsEnabled")?.unwrap_or(true);

    let tls = if !tls_enabled {
        VaultTls::Disabled
    } else {
        match fields.optional_str("tlsKnownServersPath")? {
            Some(path) => {
                let path = resolve(base_dir, &path);
                let known_servers = KnownServers::load_or_create(&path)
                    .attach(format!("while loading known servers for {}", host))?;
                VaultTls::Pinned(known_servers)
            }
            None => VaultTls::WebPki,
        }
    };

    Ok(RemoteVaultKeyMetadata {
        host,
        port,
        key_path,
        key_name,
        token,
        tls,
        timeout,
    })
}

fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

struct Fields<'a>(&'a Map<String, Value>);

impl Fields<'_> {
    fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|value| !value.is_null())
    }

    fn required_str(&self, field: &str) -> Result<String, Report<ParseError>> {
        self.optional_str(field)?.ok_or_else(|| {
            Report::new(ParseError::MissingField {
                field: field.to_string(),
            })
        })
    }

    fn optional_str(&self, field: &str) -> Result<Option<String>, Report<ParseError>> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.clone())),
            Some(_) => Err(invalid(field, "expected a string")),
        }
    }

    fn optional_bool(&self, field: &str) -> Result<Option<bool>, Report<ParseError>> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::Bool(flag)) => Ok(Some(*flag)),
            Some(Value::String(text)) if text.eq_ignore_ascii_case("true") => Ok(Some(true)),
            Some(Value::String(text)) if text.eq_ignore_ascii_case("false") => Ok(Some(false)),
            Some(_) => Err(invalid(field, "expected true or false")),
        }
    }

    fn optional_u64(&self, field: &str) -> Result<Option<u64>, Report<ParseError>> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::Number(number)) => number
                .as_u64()
                .map(Some)
                .ok_or_else(|| invalid(field, "expected a non-negative integer")),
            Some(Value::String(text)) => text
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| invalid(field, "expected a non-negative integer")),
            Some(_) => Err(invalid(field, "expected a non-negative integer")),
        }
    }
}

fn invalid(field: &str, reason: &str) -> Report<ParseError> {
    Report::new(ParseError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    })
}
