//! CLI error types.

use std::fmt;

#[derive(Debug)]
pub enum CliError {
    /// Settings could not be loaded or validated
    Settings(String),
    /// No usable signer for the identifier
    NoSigner(String),
    /// Definition file failed to parse
    Definition(String),
    /// Message input could not be read or decoded
    Input(String),
    /// IO error
    Io(std::io::Error),
    /// Logger could not be installed
    Logging(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Settings(msg) => write!(f, "Configuration error: {}", msg),
            CliError::NoSigner(identifier) => write!(f, "no signer for {}", identifier),
            CliError::Definition(msg) => write!(f, "Invalid definition: {}", msg),
            CliError::Input(msg) => write!(f, "Invalid input: {}", msg),
            CliError::Io(err) => write!(f, "IO error: {}", err),
            CliError::Logging(msg) => write!(f, "Logging error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err)
    }
}

impl From<hex::FromHexError> for CliError {
    fn from(err: hex::FromHexError) -> Self {
        CliError::Input(err.to_string())
    }
}

impl From<log::SetLoggerError> for CliError {
    fn from(err: log::SetLoggerError) -> Self {
        CliError::Logging(err.to_string())
    }
}
