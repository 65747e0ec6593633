//! Known servers file: certificate fingerprints pinned per vault host.
//!
//! One record per line, `<host[:port]> <algorithm>:<hex-fingerprint>`, e.g.
//!
//! ```text
//! vault.internal:8200 sha256:4f2c...9a
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Any other line that
//! does not have that shape makes the whole file invalid.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use error_stack::{Report, ResultExt};
use sha2::{Digest, Sha256};

use crate::error::ParseError;

const SHA256_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintAlgorithm {
    Sha256,
}

impl FingerprintAlgorithm {
    fn parse(name: &str) -> Option<Self> {
        name.eq_ignore_ascii_case("sha256").then_some(Self::Sha256)
    }

    fn digest_length(self) -> usize {
        match self {
            Self::Sha256 => SHA256_LENGTH,
        }
    }
}

impl fmt::Display for FingerprintAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => f.write_str("sha256"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub algorithm: FingerprintAlgorithm,
    pub digest: Vec<u8>,
}

impl Fingerprint {
    /// SHA-256 over a DER encoded certificate.
    #[must_use]
    pub fn sha256_of(der: &[u8]) -> Self {
        Self {
            algorithm: FingerprintAlgorithm::Sha256,
            digest: Sha256::digest(der).to_vec(),
        }
    }

    /// Parses `sha256:<hex>`; colon separators inside the hex are allowed.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let (algorithm, digest_hex) = text.split_once(':')?;
        let algorithm = FingerprintAlgorithm::parse(algorithm)?;
        let cleaned: String = digest_hex.chars().filter(|c| *c != ':').collect();
        let digest = hex::decode(cleaned).ok()?;
        if digest.len() != algorithm.digest_length() {
            return None;
        }
        Some(Self { algorithm, digest })
    }

    /// Fingerprint of `der` computed with this fingerprint's algorithm.
    #[must_use]
    pub fn matches_certificate(&self, der: &[u8]) -> bool {
        match self.algorithm {
            FingerprintAlgorithm::Sha256 => Sha256::digest(der).as_slice() == self.digest,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, hex::encode(&self.digest))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownServer {
    pub host: String,
    pub fingerprint: Fingerprint,
}

/// Parsed contents of a known servers file, remembering where it lives so
/// first-use captures can be appended.
///
/// A file that already existed is authoritative: hosts without a record are
/// rejected. Only a file created by [`KnownServers::load_or_create`] accepts
/// a first certificate for a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownServers {
    path: PathBuf,
    entries: Vec<KnownServer>,
    created: bool,
}

impl KnownServers {
    /// Loads the file at `path`, creating an empty one if it does not exist.
    ///
    /// # Errors
    ///
    /// - [`ParseError::KnownServersUnavailable`] if the file is missing and
    ///   cannot be created, or exists but cannot be read
    /// - [`ParseError::InvalidFingerprint`] if any line is malformed
    pub fn load_or_create(path: &Path) -> Result<Self, Report<ParseError>> {
        let unavailable = || ParseError::KnownServersUnavailable {
            path: path.to_path_buf(),
        };

        if !path.exists() {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .change_context_lazy(unavailable)?;
            log::info!(
                "Created known servers file {}; the first certificate seen will be trusted",
                path.display()
            );
            return Ok(Self {
                path: path.to_path_buf(),
                entries: Vec::new(),
                created: true,
            });
        }

        let content = fs::read_to_string(path).change_context_lazy(unavailable)?;
        Self::parse(path, &content)
    }

    /// # Errors
    ///
    /// Returns [`ParseError::InvalidFingerprint`] naming the first bad line.
    pub fn parse(path: &Path, content: &str) -> Result<Self, Report<ParseError>> {
        let mut entries = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = parse_line(line).ok_or_else(|| {
                Report::new(ParseError::InvalidFingerprint {
                    path: path.to_path_buf(),
                    line_number: index + 1,
                })
            })?;
            entries.push(entry);
        }
        Ok(Self {
            path: path.to_path_buf(),
            entries,
            created: false,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn entries(&self) -> &[KnownServer] {
        &self.entries
    }

    /// Whether this file was just created, so the first certificate seen
    /// for a host may be captured.
    #[must_use]
    pub fn was_created(&self) -> bool {
        self.created
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any record exists for `authority` (`host:port`) or bare `host`.
    #[must_use]
    pub fn has_host(&self, authority: &str, host: &str) -> bool {
        self.records_for(authority, host).next().is_some()
    }

    /// Whether the certificate `der` matches a record for this host.
    #[must_use]
    pub fn trusts(&self, authority: &str, host: &str, der: &[u8]) -> bool {
        self.records_for(authority, host)
            .any(|entry| entry.fingerprint.matches_certificate(der))
    }

    /// Appends a record to the file and to the in-memory list.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be appended to.
    pub fn record(&mut self, authority: &str, fingerprint: Fingerprint) -> io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{} {}", authority, fingerprint)?;
        self.entries.push(KnownServer {
            host: authority.to_string(),
            fingerprint,
        });
        Ok(())
    }

    fn records_for<'a>(
        &'a self,
        authority: &'a str,
        host: &'a str,
    ) -> impl Iterator<Item = &'a KnownServer> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.host == authority || entry.host == host)
    }
}

fn parse_line(line: &str) -> Option<KnownServer> {
    let mut parts = line.split_whitespace();
    let host = parts.next()?;
    let fingerprint = Fingerprint::parse(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some(KnownServer {
        host: host.to_string(),
        fingerprint,
    })
}
