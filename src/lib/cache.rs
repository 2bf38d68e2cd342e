// A BTree maintains key order
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::Error;
use crate::provider::ForgeProvider;
use crate::reference::Rev;
use crate::store::Store;

const CACHE_FILE_NAME: &str = "fetcher-cache.json";

/// Identifies a fetched archive by what cannot change for a commit: the archive kind and the
/// commit hash.
///
/// Owner, repository, host and branch are deliberately left out, so that two inputs resolving
/// to the same commit share one entry. Equal commit hashes in unrelated repositories of the
/// same provider therefore share an entry too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub struct ImmutableCacheKey {
    #[serde(rename = "type")]
    kind: String,
    rev: Rev,
}

impl ImmutableCacheKey {
    pub fn new(provider: ForgeProvider, rev: Rev) -> Self {
        Self {
            kind: provider.tarball_kind().to_string(),
            rev,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn rev(&self) -> Rev {
        self.rev
    }

    /// Hex SHA-256 of the key's JSON form; the index into the cache.
    pub fn digest(&self) -> Result<String, Error> {
        let json = serde_json::to_string(self)?;
        Ok(hex::encode(Sha256::digest(json.as_bytes())))
    }
}

/// What is remembered about a fetched commit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub rev: Rev,
    pub last_modified: u64,
    pub nar_hash: String,
}

/// A cached archive: its key, what was learned fetching it, and where its tree is.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: ImmutableCacheKey,
    pub info: CacheInfo,
    pub store_path: PathBuf,
}

/// Fetched archives indexed by the digest of their [`ImmutableCacheKey`].
///
/// Lookups and inserts lock the whole map, so each is atomic. Use [`Cache::save`] to persist a
/// file-backed cache.
#[derive(Debug, Default)]
pub struct Cache {
    map: Mutex<BTreeMap<String, CacheEntry>>,
    cache_file: Option<PathBuf>,
}

impl Cache {
    /// A cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the cache from a JSON file in the given directory, creating a new cache if the
    /// file does not exist.
    pub fn load<P: AsRef<Path>>(cache_dir: P) -> Result<Self, Error> {
        let cache_file = cache_dir.as_ref().join(CACHE_FILE_NAME);
        let map = if cache_file.is_file() {
            serde_json::from_str(&std::fs::read_to_string(&cache_file)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            map: Mutex::new(map),
            cache_file: Some(cache_file),
        })
    }

    /// Saves the cache. Does nothing for an in-memory cache.
    pub fn save(&self) -> Result<(), Error> {
        let Some(cache_file) = &self.cache_file else {
            return Ok(());
        };
        if let Some(dir) = cache_file.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&*self.entries_guard())?;
        Ok(std::fs::write(cache_file, json)?)
    }

    /// Get the cache file path.
    pub fn cache_file(&self) -> Option<&Path> {
        self.cache_file.as_deref()
    }

    fn entries_guard(&self) -> MutexGuard<'_, BTreeMap<String, CacheEntry>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The entry for `key`, if present and its tree is still in `store`. Entries whose tree
    /// has disappeared are dropped.
    pub fn lookup(&self, key: &ImmutableCacheKey, store: &dyn Store) -> Result<Option<CacheEntry>, Error> {
        let digest = key.digest()?;
        let mut map = self.entries_guard();
        let stale = match map.get(&digest) {
            Some(entry) if store.is_valid(&entry.store_path) => return Ok(Some(entry.clone())),
            Some(entry) => entry.store_path.clone(),
            None => return Ok(None),
        };
        warn!(path = %stale.display(), rev = %key.rev(), "dropping stale cache entry");
        map.remove(&digest);
        Ok(None)
    }

    /// Insert an entry, replacing any existing entry for the same key.
    pub fn add(&self, key: ImmutableCacheKey, info: CacheInfo, store_path: PathBuf) -> Result<CacheEntry, Error> {
        let digest = key.digest()?;
        let entry = CacheEntry {
            key,
            info,
            store_path,
        };
        self.entries_guard().insert(digest, entry.clone());
        Ok(entry)
    }

    /// Removes the entry for `key`, returning it if it existed.
    pub fn remove(&self, key: &ImmutableCacheKey) -> Result<Option<CacheEntry>, Error> {
        Ok(self.entries_guard().remove(&key.digest()?))
    }

    /// A snapshot of every entry, in digest order.
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.entries_guard().values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries_guard().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries_guard().len()
    }
}

#[cfg(test)]
mod test_cache {
    use super::*;
    use crate::store::{LocalStore, Tree};

    fn rev(c: char) -> Rev {
        c.to_string().repeat(40).parse().unwrap()
    }

    struct AlwaysValid;

    impl Store for AlwaysValid {
        fn add_tarball(&self, _: &[u8], _: &str) -> Result<(Tree, u64), Error> {
            unreachable!()
        }

        fn is_valid(&self, _: &Path) -> bool {
            true
        }
    }

    fn info(rev: Rev) -> CacheInfo {
        CacheInfo {
            rev,
            last_modified: 42,
            nar_hash: "sha256:00".into(),
        }
    }

    #[test]
    fn key_depends_only_on_provider_and_rev() {
        let a = ImmutableCacheKey::new(ForgeProvider::GitHub, rev('a'));
        assert_eq!(a.kind(), "github-tarball");
        assert_eq!(a, ImmutableCacheKey::new(ForgeProvider::GitHub, rev('a')));
        assert_ne!(a.digest().unwrap(), ImmutableCacheKey::new(ForgeProvider::GitHub, rev('b')).digest().unwrap());
        assert_ne!(a.digest().unwrap(), ImmutableCacheKey::new(ForgeProvider::GitLab, rev('a')).digest().unwrap());
    }

    #[test]
    fn key_json_form() {
        let key = ImmutableCacheKey::new(ForgeProvider::GitLab, rev('c'));
        assert_eq!(
            serde_json::to_string(&key).unwrap(),
            format!(r#"{{"type":"gitlab-tarball","rev":"{}"}}"#, "c".repeat(40))
        );
    }

    #[test]
    fn add_then_lookup() {
        let cache = Cache::in_memory();
        let key = ImmutableCacheKey::new(ForgeProvider::GitHub, rev('a'));
        assert_eq!(cache.lookup(&key, &AlwaysValid).unwrap(), None);
        cache.add(key.clone(), info(rev('a')), "/store/x-source".into()).unwrap();
        let entry = cache.lookup(&key, &AlwaysValid).unwrap().unwrap();
        assert_eq!(entry.info.last_modified, 42);
        assert_eq!(entry.store_path, PathBuf::from("/store/x-source"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn repeated_add_is_idempotent() {
        let cache = Cache::in_memory();
        let key = ImmutableCacheKey::new(ForgeProvider::GitHub, rev('a'));
        cache.add(key.clone(), info(rev('a')), "/store/x-source".into()).unwrap();
        cache.add(key, info(rev('a')), "/store/x-source".into()).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn stale_entries_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let cache = Cache::in_memory();
        let key = ImmutableCacheKey::new(ForgeProvider::GitHub, rev('a'));
        cache.add(key.clone(), info(rev('a')), dir.path().join("gone-source")).unwrap();
        assert_eq!(cache.lookup(&key, &store).unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::load(dir.path()).unwrap();
        assert!(cache.is_empty());
        let key = ImmutableCacheKey::new(ForgeProvider::GitLab, rev('d'));
        cache.add(key.clone(), info(rev('d')), "/store/y-source".into()).unwrap();
        cache.save().unwrap();
        assert_eq!(cache.cache_file(), Some(dir.path().join(CACHE_FILE_NAME).as_path()));

        let reloaded = Cache::load(dir.path()).unwrap();
        assert_eq!(reloaded.entries(), cache.entries());
        assert!(reloaded.lookup(&key, &AlwaysValid).unwrap().is_some());
        assert_eq!(reloaded.remove(&key).unwrap().map(|e| e.key), Some(key));
    }

    #[test]
    fn in_memory_save_is_a_no_op() {
        let cache = Cache::in_memory();
        assert!(cache.save().is_ok());
        assert_eq!(cache.cache_file(), None);
    }
}
