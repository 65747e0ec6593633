//! Size-bounded, least-recently-used cache of resolved signers.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::signer::ArtifactSigner;

/// Cache of signers keyed by normalised identifier.
///
/// A limit of zero disables caching entirely: lookups always miss and inserts
/// are dropped. Evicting an entry only releases the cache's reference; callers
/// still holding the signer keep using it until they drop it.
#[derive(Debug)]
pub struct SignerCache {
    entries: Option<LruCache<String, Arc<ArtifactSigner>>>,
}

impl SignerCache {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(limit).map(LruCache::new),
        }
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.cap().get())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up `identifier`, marking it most recently used on a hit.
    pub fn get(&mut self, identifier: &str) -> Option<Arc<ArtifactSigner>> {
        self.entries.as_mut()?.get(identifier).cloned()
    }

    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.entries
            .as_ref()
            .is_some_and(|entries| entries.contains(identifier))
    }

    /// Inserts a signer, returning the identifier evicted to make room.
    pub fn insert(&mut self, identifier: String, signer: Arc<ArtifactSigner>) -> Option<String> {
        let entries = self.entries.as_mut()?;
        match entries.push(identifier.clone(), signer) {
            Some((evicted, _)) if evicted != identifier => Some(evicted),
            _ => None,
        }
    }
}
