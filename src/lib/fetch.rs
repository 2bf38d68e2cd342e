//! The fetch pipeline shared by every provider.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::attrs::Attrs;
use crate::cache::{Cache, CacheInfo, ImmutableCacheKey};
use crate::error::Error;
use crate::input::Input;
use crate::provider::{DownloadRequest, GitArchiveScheme};
use crate::reference::Rev;
use crate::registry::SchemeRegistry;
use crate::store::{Store, Tree};
use crate::transport::Transport;

/// Resolves inputs to commits, and commits to cached source trees.
pub struct Fetcher {
    registry: Arc<SchemeRegistry>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn Store>,
    cache: Arc<Cache>,
    // One lock per cache key, held while a missing archive is downloaded.
    in_flight: Mutex<HashMap<ImmutableCacheKey, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("registry", &self.registry)
            .field("cache", &self.cache.cache_file())
            .finish()
    }
}

impl Fetcher {
    pub fn new(
        registry: Arc<SchemeRegistry>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            registry,
            transport,
            store,
            cache,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &SchemeRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Parse a locator with the registered schemes.
    pub fn parse_locator(&self, text: &str) -> Result<Input, Error> {
        self.registry.parse_locator(text)
    }

    /// Build an input from an attribute record with the registered schemes.
    pub fn input_from_attrs(&self, attrs: &Attrs) -> Result<Input, Error> {
        self.registry.parse_attrs(attrs)
    }

    /// The commit `input` points at, asking the forge only if it is not pinned already.
    pub fn resolve(&self, input: &Input) -> Result<Rev, Error> {
        let scheme = self.registry.scheme_for(input)?;
        self.resolve_with(scheme, input)
    }

    fn resolve_with(&self, scheme: &dyn GitArchiveScheme, input: &Input) -> Result<Rev, Error> {
        match input.rev() {
            Some(rev) => Ok(rev),
            None => scheme.resolve_revision(input, self.transport.as_ref()),
        }
    }

    /// `input` pinned to the commit it currently resolves to.
    pub fn pin(&self, input: &Input) -> Result<Input, Error> {
        let rev = self.resolve(input)?;
        input.apply_overrides(None, Some(rev))
    }

    /// The archive download for `input`, resolving it first if needed.
    pub fn download_request(&self, input: &Input) -> Result<DownloadRequest, Error> {
        let scheme = self.registry.scheme_for(input)?;
        let pinned = input.apply_overrides(None, Some(self.resolve_with(scheme, input)?))?;
        scheme.download_url(&pinned)
    }

    /// The SSH clone URL for `input`.
    pub fn clone_url(&self, input: &Input) -> Result<String, Error> {
        Ok(self.registry.scheme_for(input)?.clone_url(input))
    }

    /// Clone `input` into `dest` with git, checking out its commit or branch.
    pub fn clone(&self, input: &Input, dest: &Path) -> Result<PathBuf, Error> {
        let url = self.clone_url(input)?;
        crate::git::clone_into(&url, input.reference(), dest)?;
        Ok(dest.to_path_buf())
    }

    /// Fetch the source tree of `input`.
    ///
    /// Resolves the branch/tag (default `HEAD`) unless the input names a commit, then serves
    /// the tree from the cache or downloads and caches it. The returned input is fully pinned:
    /// it has a `rev`, a `lastModified` and a `narHash`, and no `ref`.
    pub fn fetch(&self, input: &Input) -> Result<(Tree, Input), Error> {
        let scheme = self.registry.scheme_for(input)?;
        let rev = self.resolve_with(scheme, input)?;
        let pinned = input.apply_overrides(None, Some(rev))?;
        let key = ImmutableCacheKey::new(scheme.provider(), rev);

        if let Some(hit) = self.cached(&key, &pinned)? {
            return Ok(hit);
        }

        let lock = self.lock_for(&key);
        let fetched = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.download(scheme, key.clone(), pinned)
        };
        self.release(&key, lock);
        fetched
    }

    // Called with the key's lock held.
    fn download(
        &self,
        scheme: &dyn GitArchiveScheme,
        key: ImmutableCacheKey,
        pinned: Input,
    ) -> Result<(Tree, Input), Error> {
        // Another fetch of the same commit may have finished while we waited.
        if let Some(hit) = self.cached(&key, &pinned)? {
            return Ok(hit);
        }

        let request = scheme.download_url(&pinned)?;
        info!(input = %pinned, url = %request.url, "downloading");
        let response = self.transport.get(&request)?;
        if !response.is_success() {
            return Err(Error::transfer(
                &request.url,
                format!("server returned HTTP status {}", response.status),
            ));
        }
        let (tree, last_modified) = self.store.add_tarball(&response.body, "source")?;
        let info = CacheInfo {
            rev: key.rev(),
            last_modified,
            nar_hash: tree.nar_hash.clone(),
        };
        self.cache.add(key, info, tree.path.clone())?;
        info!(input = %pinned, path = %tree.path.display(), "fetched");
        finish(pinned, tree, last_modified)
    }

    /// Parse `locator` and fetch it.
    pub fn fetch_locator(&self, locator: &str) -> Result<(Tree, Input), Error> {
        self.fetch(&self.parse_locator(locator)?)
    }

    fn cached(&self, key: &ImmutableCacheKey, pinned: &Input) -> Result<Option<(Tree, Input)>, Error> {
        match self.cache.lookup(key, self.store.as_ref())? {
            Some(entry) => {
                debug!(input = %pinned, path = %entry.store_path.display(), "cache hit");
                let tree = Tree {
                    path: entry.store_path,
                    nar_hash: entry.info.nar_hash,
                };
                finish(pinned.clone(), tree, entry.info.last_modified).map(Some)
            }
            None => {
                debug!(input = %pinned, "cache miss");
                Ok(None)
            }
        }
    }

    fn lock_for(&self, key: &ImmutableCacheKey) -> Arc<Mutex<()>> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone()
    }

    // Clones of a key's lock are only made and dropped under the map lock, so a count of one
    // means no other fetch holds or waits on it.
    fn release(&self, key: &ImmutableCacheKey, lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if in_flight.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            in_flight.remove(key);
        }
    }
}

fn finish(pinned: Input, tree: Tree, last_modified: u64) -> Result<(Tree, Input), Error> {
    if let Some(expected) = pinned.nar_hash()
        && expected != tree.nar_hash
    {
        return Err(Error::NarHashMismatch {
            input: pinned.to_string(),
            expected: expected.to_string(),
            actual: tree.nar_hash,
        });
    }
    let input = pinned
        .with_last_modified(last_modified)
        .with_nar_hash(tree.nar_hash.clone());
    Ok((tree, input))
}
