//! Directory-backed signer lookup.
//!
//! Resolves a public-key identifier to an [`ArtifactSigner`] by locating
//! `<identifier>.<extension>` in the key store directory, parsing it, and
//! handing the metadata to a [`SignerFactory`]. Resolved signers are kept in a
//! [`SignerCache`].
//!
//! Concurrent lookups of the same uncached identifier share one resolution:
//! the first caller spawns it and registers it as in flight, later callers
//! await the same outcome. The resolution runs on its own task, so it finishes
//! even if every waiter gives up, and its in-flight marker is always cleared.

pub mod cache;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::factory::{ArtifactSignerFactory, SignerFactory};
use crate::metadata::{MetadataParser, SigningMetadata};
use crate::settings::KeyStore;
use crate::signer::{normalize_identifier, ArtifactSigner};

pub use cache::SignerCache;

type Resolution = Shared<BoxFuture<'static, Option<Arc<ArtifactSigner>>>>;

#[derive(Clone)]
pub struct DirectoryBackedSignerProvider {
    inner: Arc<ProviderInner>,
}

struct ProviderInner {
    directory: PathBuf,
    extension: String,
    parser: MetadataParser,
    factory: Arc<dyn SignerFactory>,
    cache: Mutex<SignerCache>,
    in_flight: Mutex<HashMap<String, Resolution>>,
}

enum Lookup {
    Cached(Arc<ArtifactSigner>),
    Pending(Resolution),
}

impl DirectoryBackedSignerProvider {
    pub fn new(
        directory: impl Into<PathBuf>,
        extension: impl Into<String>,
        factory: Arc<dyn SignerFactory>,
        cache: SignerCache,
    ) -> Self {
        let extension = extension.into();
        Self {
            inner: Arc::new(ProviderInner {
                directory: directory.into(),
                parser: MetadataParser::for_extension(&extension),
                extension,
                factory,
                cache: Mutex::new(cache),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Provider over the configured key store using the built-in backends.
    #[must_use]
    pub fn from_settings(key_store: &KeyStore) -> Self {
        Self::new(
            key_store.directory(),
            key_store.file_extension.clone(),
            Arc::new(ArtifactSignerFactory::new()),
            SignerCache::new(key_store.cache_limit),
        )
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    #[must_use]
    pub fn extension(&self) -> &str {
        &self.inner.extension
    }

    /// Number of signers currently cached.
    #[must_use]
    pub fn cached_signers(&self) -> usize {
        self.inner.lock_cache().len()
    }

    /// Returns the signer for `identifier`, or `None` if no usable definition
    /// exists. Failures are logged against the definition file and never
    /// returned; one bad file only affects its own identifier.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn get_signer(&self, identifier: &str) -> Option<Arc<ArtifactSigner>> {
        let identifier = normalize_identifier(identifier);

        let cached = self.inner.lock_cache().get(&identifier);
        if let Some(signer) = cached {
            log::trace!("Signer cache hit for {}", identifier);
            return Some(signer);
        }

        match self.lookup_or_spawn(&identifier) {
            Lookup::Cached(signer) => Some(signer),
            Lookup::Pending(resolution) => resolution.await,
        }
    }

    /// Joins the in-flight resolution for `identifier`, or starts one.
    fn lookup_or_spawn(&self, identifier: &str) -> Lookup {
        let mut in_flight = self.inner.lock_in_flight();

        if let Some(resolution) = in_flight.get(identifier) {
            log::debug!("Joining in-flight resolution for {}", identifier);
            return Lookup::Pending(resolution.clone());
        }

        // A resolution stores its signer before clearing its marker, so a
        // miss above followed by a hit here means it finished in between.
        if let Some(signer) = self.inner.lock_cache().get(identifier) {
            return Lookup::Cached(signer);
        }

        let inner = Arc::clone(&self.inner);
        let owned_identifier = identifier.to_string();
        let task = tokio::spawn(async move {
            let _marker = InFlightMarker {
                inner: Arc::clone(&inner),
                identifier: owned_identifier.clone(),
            };
            let signer = Arc::clone(&inner)
                .resolve(owned_identifier.clone())
                .await
                .map(Arc::new);
            if let Some(signer) = &signer {
                inner.store(owned_identifier, Arc::clone(signer));
            }
            signer
        });

        let failed_identifier = identifier.to_string();
        let resolution = task
            .map(move |joined| {
                joined.unwrap_or_else(|e| {
                    log::error!(
                        "Signer resolution for {} did not complete: {}",
                        failed_identifier,
                        e
                    );
                    None
                })
            })
            .boxed()
            .shared();

        in_flight.insert(identifier.to_string(), resolution.clone());
        Lookup::Pending(resolution)
    }
}

impl ProviderInner {
    fn lock_cache(&self) -> MutexGuard<'_, SignerCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<String, Resolution>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, identifier: String, signer: Arc<ArtifactSigner>) {
        if let Some(evicted) = self.lock_cache().insert(identifier, signer) {
            log::debug!("Evicted signer {} from cache", evicted);
        }
    }

    /// Parses and builds the signer for `identifier`; every failure path is
    /// logged here and collapses to `None`.
    async fn resolve(self: Arc<Self>, identifier: String) -> Option<ArtifactSigner> {
        let inner = Arc::clone(&self);
        let lookup = identifier.clone();
        let loaded = tokio::task::spawn_blocking(move || inner.load_metadata(&lookup))
            .await
            .unwrap_or_else(|e| {
                log::error!("Loading signing metadata for {} failed: {}", identifier, e);
                None
            });

        let signer = match loaded {
            Some((path, metadata)) => match self.factory.create(metadata).await {
                Ok(signer) => Some(signer),
                Err(report) => {
                    log::error!(
                        "Failed to create signer from signing metadata file {}: {}",
                        display_name(&path),
                        report.current_context()
                    );
                    log::debug!("{:?}", report);
                    None
                }
            },
            None => None,
        };

        if signer.is_none() {
            log::error!(
                "No valid matching metadata file found for the identifier {}",
                identifier
            );
        }
        signer
    }

    /// Finds and parses the single definition file for `identifier`. Blocking.
    fn load_metadata(&self, identifier: &str) -> Option<(PathBuf, SigningMetadata)> {
        let path = self.find_definition(identifier)?;
        match self.parser.parse_file(&path) {
            Ok(metadata) => {
                log::debug!(
                    "Parsed {} signing metadata from {}",
                    metadata.type_name(),
                    display_name(&path)
                );
                Some((path, metadata))
            }
            Err(report) => {
                log::error!(
                    "Error parsing signing metadata file {}: {}",
                    display_name(&path),
                    report.current_context()
                );
                log::debug!("{:?}", report);
                None
            }
        }
    }

    /// Scans the key store for `<identifier>.<extension>`, matching
    /// case-insensitively and ignoring a `0x` prefix on the file name.
    fn find_definition(&self, identifier: &str) -> Option<PathBuf> {
        if identifier.is_empty() {
            return None;
        }

        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                log::error!(
                    "Unable to list key store directory {}: {}",
                    self.directory.display(),
                    e
                );
                return None;
            }
        };

        let mut matches: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.is_definition_for(path, identifier))
            .collect();

        match matches.len() {
            0 => None,
            1 => matches.pop(),
            _ => {
                matches.sort();
                let names: Vec<String> = matches.iter().map(|p| display_name(p)).collect();
                log::error!(
                    "Multiple signing metadata files found for the identifier {}: {}",
                    identifier,
                    names.join(", ")
                );
                None
            }
        }
    }

    fn is_definition_for(&self, path: &Path, identifier: &str) -> bool {
        let extension_matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension));
        let stem_matches = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| normalize_identifier(stem) == identifier);
        extension_matches && stem_matches
    }
}

/// Clears the in-flight marker for an identifier when its resolution ends,
/// including by panic.
struct InFlightMarker {
    inner: Arc<ProviderInner>,
    identifier: String,
}

impl Drop for InFlightMarker {
    fn drop(&mut self) {
        self.inner.lock_in_flight().remove(&self.identifier);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}
