use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use log::LevelFilter;
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::error::SettingsError;

pub const ENVIRONMENT_PREFIX: &str = "ARTIFACT_SIGNER";
pub const DEFAULT_CACHE_LIMIT: usize = 1000;
pub const DEFAULT_FILE_EXTENSION: &str = "yaml";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct KeyStore {
    /// Directory holding one definition file per identifier.
    #[serde(default = "default_path")]
    #[validate(length(min = 1))]
    pub path: String,

    /// Extension of definition files, without the leading dot.
    #[serde(default = "default_file_extension")]
    #[validate(custom(function = "validate_file_extension"))]
    pub file_extension: String,

    /// Maximum number of cached signers; 0 disables caching.
    #[serde(default = "default_cache_limit")]
    pub cache_limit: usize,
}

impl KeyStore {
    #[must_use]
    pub fn directory(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self {
            path: default_path(),
            file_extension: default_file_extension(),
            cache_limit: DEFAULT_CACHE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Logging {
    #[serde(default = "default_level")]
    #[validate(custom(function = "validate_level"))]
    pub level: String,
}

impl Logging {
    /// Configured level, falling back to `info` for unknown names.
    #[must_use]
    pub fn level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(&self.level).unwrap_or(LevelFilter::Info)
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct Settings {
    #[serde(default)]
    #[validate(nested)]
    pub key_store: KeyStore,

    #[serde(default)]
    #[validate(nested)]
    pub logging: Logging,
}

impl Settings {
    /// Loads settings from TOML, applies `ARTIFACT_SIGNER__*` environment
    /// overrides and validates the result.
    ///
    /// # Errors
    ///
    /// - [`SettingsError::Load`] if the TOML or an override cannot be read
    /// - [`SettingsError::Invalid`] if a value fails validation
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<SettingsError>> {
        let environment = Environment::with_prefix(ENVIRONMENT_PREFIX)
            .separator("__")
            .try_parsing(true);

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let settings: Self = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| {
                Report::new(SettingsError::Load {
                    message: e.to_string(),
                })
            })?;

        settings
            .validate()
            .change_context(SettingsError::Invalid {
                message: "Settings validation failed".to_string(),
            })?;

        Ok(settings)
    }

    /// Reads a TOML settings file, see [`Settings::from_toml`].
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Load`] if the file cannot be read, otherwise
    /// any error from [`Settings::from_toml`].
    pub fn from_file(path: &Path) -> Result<Self, Report<SettingsError>> {
        let toml_str = fs::read_to_string(path).change_context_lazy(|| SettingsError::Load {
            message: format!("unable to read {}", path.display()),
        })?;
        Self::from_toml(&toml_str)
    }
}

fn default_path() -> String {
    "./".to_string()
}

fn default_file_extension() -> String {
    DEFAULT_FILE_EXTENSION.to_string()
}

fn default_cache_limit() -> usize {
    DEFAULT_CACHE_LIMIT
}

fn default_level() -> String {
    "info".to_string()
}

fn validate_file_extension(extension: &str) -> Result<(), ValidationError> {
    if extension.is_empty() || extension.starts_with('.') {
        return Err(ValidationError::new("file_extension")
            .with_message("must be non-empty and given without a leading dot".into()));
    }
    Ok(())
}

fn validate_level(level: &str) -> Result<(), ValidationError> {
    LevelFilter::from_str(level)
        .map(|_| ())
        .map_err(|_| ValidationError::new("level").with_message("unknown log level".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_empty_toml_uses_defaults() {
        let settings = Settings::from_toml("").unwrap();

        assert_eq!(settings.key_store.path, "./");
        assert_eq!(settings.key_store.file_extension, "yaml");
        assert_eq!(settings.key_store.cache_limit, DEFAULT_CACHE_LIMIT);
        assert_eq!(settings.logging.level_filter(), LevelFilter::Info);
    }

    #[test]
    fn test_settings_from_valid_toml() {
        let toml_str = r#"
            [key_store]
            path = "/var/lib/keys"
            file_extension = "json"
            cache_limit = 5

            [logging]
            level = "debug"
            "#;

        let settings = Settings::from_toml(toml_str).unwrap();

        assert_eq!(settings.key_store.directory(), PathBuf::from("/var/lib/keys"));
        assert_eq!(settings.key_store.file_extension, "json");
        assert_eq!(settings.key_store.cache_limit, 5);
        assert_eq!(settings.logging.level_filter(), LevelFilter::Debug);
    }

    #[test]
    fn test_settings_invalid_toml_syntax() {
        let report = Settings::from_toml("[key_store\npath = ").unwrap_err();
        assert!(matches!(
            report.current_context(),
            SettingsError::Load { .. }
        ));
    }

    #[test]
    fn test_settings_rejects_dotted_extension() {
        let toml_str = r#"
            [key_store]
            file_extension = ".yaml"
            "#;

        let report = Settings::from_toml(toml_str).unwrap_err();
        assert!(matches!(
            report.current_context(),
            SettingsError::Invalid { .. }
        ));
    }

    #[test]
    fn test_settings_rejects_empty_path() {
        let toml_str = r#"
            [key_store]
            path = ""
            "#;

        assert!(Settings::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_settings_rejects_unknown_level() {
        let toml_str = r#"
            [logging]
            level = "loud"
            "#;

        assert!(Settings::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_settings_extra_fields() {
        let toml_str = r#"
            [key_store]
            path = "keys"
            unknown = "ignored"

            [metrics]
            enabled = true
            "#;

        assert!(Settings::from_toml(toml_str).is_ok());
    }

    #[test]
    fn test_set_env() {
        temp_env::with_var(
            "ARTIFACT_SIGNER__KEY_STORE__CACHE_LIMIT",
            Some("0"),
            || {
                let settings = Settings::from_toml("").unwrap();
                assert_eq!(settings.key_store.cache_limit, 0);
            },
        );
    }

    #[test]
    fn test_override_env() {
        let toml_str = r#"
            [key_store]
            path = "/from/toml"
            "#;

        temp_env::with_var(
            "ARTIFACT_SIGNER__KEY_STORE__PATH",
            Some("/from/env"),
            || {
                let settings = Settings::from_toml(toml_str).unwrap();
                assert_eq!(settings.key_store.path, "/from/env");
            },
        );
    }

    #[test]
    fn test_settings_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("artifact-signer.toml");
        fs::write(&path, "[key_store]\ncache_limit = 7\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.key_store.cache_limit, 7);

        let report = Settings::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(
            report.current_context(),
            SettingsError::Load { .. }
        ));
    }
}
