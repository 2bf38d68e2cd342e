//! Materialising downloaded archives as content-addressed source trees.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tar::Archive;
use tracing::debug;

use crate::error::Error;

/// A source tree in the store.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Tree {
    pub path: PathBuf,
    #[serde(rename = "narHash")]
    pub nar_hash: String,
}

/// Somewhere fetched trees are kept.
pub trait Store: Send + Sync {
    /// Unpack a gzipped tarball into the store. Returns the tree and the newest modification
    /// time found in the archive.
    fn add_tarball(&self, compressed: &[u8], name: &str) -> Result<(Tree, u64), Error>;

    /// Whether `path` is still a tree in this store.
    fn is_valid(&self, path: &Path) -> bool;
}

/// A [`Store`] in a local directory. Trees are named `<hash-prefix>-<name>`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open the store at `root`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, Error> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Store for LocalStore {
    fn add_tarball(&self, compressed: &[u8], name: &str) -> Result<(Tree, u64), Error> {
        let staging = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempdir_in(&self.root)?;
        let last_modified = unpack_tarball(compressed, staging.path(), name)?;
        let top = single_top_level_dir(staging.path(), name)?;
        let nar_hash = hash_tree(&top)?;
        let digest = nar_hash.trim_start_matches("sha256:");
        let path = self.root.join(format!("{}-{name}", &digest[..32]));
        // Another fetch may land the same tree between any check and the rename, so the rename
        // itself decides. A failure with the tree now present means it is already stored.
        match fs::rename(&top, &path) {
            Ok(()) => {}
            Err(err) if path.is_dir() => {
                debug!(path = %path.display(), error = %err, "tree already in store");
            }
            Err(err) => return Err(err.into()),
        }
        Ok((Tree { path, nar_hash }, last_modified))
    }

    fn is_valid(&self, path: &Path) -> bool {
        path.starts_with(&self.root) && path.is_dir()
    }
}

/// Unpack into `dest`, refusing entries that would land outside it. Returns the newest mtime.
fn unpack_tarball(compressed: &[u8], dest: &Path, name: &str) -> Result<u64, Error> {
    let invalid = |reason: String| Error::InvalidArchive {
        name: name.to_string(),
        reason,
    };
    let mut archive = Archive::new(GzDecoder::new(compressed));
    let mut last_modified = 0;
    for entry in archive.entries().map_err(|err| invalid(err.to_string()))? {
        let mut entry = entry.map_err(|err| invalid(err.to_string()))?;
        let entry_type = entry.header().entry_type();
        // GitHub stores the commit id in a pax global header; it is not part of the tree.
        if entry_type.is_pax_global_extensions() {
            continue;
        }
        let path = entry.path().map_err(|err| invalid(err.to_string()))?.into_owned();
        if path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(invalid(format!("entry '{}' escapes the archive root", path.display())));
        }
        last_modified = last_modified.max(entry.header().mtime().unwrap_or(0));
        entry
            .unpack_in(dest)
            .map_err(|err| invalid(format!("failed to unpack '{}': {err}", path.display())))?;
    }
    Ok(last_modified)
}

/// Forge archives wrap the tree in one directory named after the repository and commit.
fn single_top_level_dir(dir: &Path, name: &str) -> Result<PathBuf, Error> {
    let entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    match entries.as_slice() {
        [only] if only.file_type()?.is_dir() => Ok(only.path()),
        _ => Err(Error::InvalidArchive {
            name: name.to_string(),
            reason: format!(
                "expected a single top-level directory, found {} entries",
                entries.len()
            ),
        }),
    }
}

/// Deterministic hash of a directory tree: a sorted walk over entry type, relative path,
/// executable bit and contents (or symlink target).
pub fn hash_tree(root: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    hash_dir(root, Path::new(""), &mut hasher)?;
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

fn hash_dir(dir: &Path, rel: &Path, hasher: &mut Sha256) -> io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let rel = rel.join(entry.file_name());
        let rel_bytes = rel.to_string_lossy();
        let meta = fs::symlink_metadata(entry.path())?;
        if meta.file_type().is_symlink() {
            let target = fs::read_link(entry.path())?;
            hasher.update(b"l\0");
            hasher.update(rel_bytes.as_bytes());
            hasher.update(b"\0");
            hasher.update(target.to_string_lossy().as_bytes());
            hasher.update(b"\0");
        } else if meta.is_dir() {
            hasher.update(b"d\0");
            hasher.update(rel_bytes.as_bytes());
            hasher.update(b"\0");
            hash_dir(&entry.path(), &rel, hasher)?;
        } else {
            hasher.update(if is_executable(&meta) { b"x\0" } else { b"f\0" });
            hasher.update(rel_bytes.as_bytes());
            hasher.update(b"\0");
            hasher.update(meta.len().to_le_bytes());
            io::copy(&mut fs::File::open(entry.path())?, hasher)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_: &fs::Metadata) -> bool {
    false
}


#[cfg(test)]
mod test_local_store {
    use super::test_support::tarball;
    use super::*;

    #[test]
    fn unpacks_and_strips_top_level_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("store")).unwrap();
        let archive = tarball(&[
            ("acme-widget-abc123/README.md", "hello", 1_600_000_000),
            ("acme-widget-abc123/src/lib.rs", "fn main() {}", 1_700_000_000),
        ]);
        let (tree, last_modified) = store.add_tarball(&archive, "source").unwrap();
        assert_eq!(last_modified, 1_700_000_000);
        assert!(store.is_valid(&tree.path));
        assert!(tree.path.file_name().unwrap().to_string_lossy().ends_with("-source"));
        assert_eq!(fs::read_to_string(tree.path.join("README.md")).unwrap(), "hello");
        assert!(tree.path.join("src/lib.rs").is_file());
        assert!(tree.nar_hash.starts_with("sha256:"));
    }

    #[test]
    fn same_contents_give_same_tree() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let first = tarball(&[("one/file.txt", "same", 5)]);
        let second = tarball(&[("two/file.txt", "same", 9)]);
        let (a, _) = store.add_tarball(&first, "source").unwrap();
        let (b, _) = store.add_tarball(&second, "source").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn concurrent_adds_of_one_tree_all_succeed() {
        use std::sync::{Arc, Barrier};

        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let archive = Arc::new(tarball(&[("w/Cargo.toml", "[package]", 3), ("w/src/lib.rs", "", 4)]));
        let barrier = Arc::new(Barrier::new(4));
        let handles = (0..4)
            .map(|_| {
                let (store, archive, barrier) = (store.clone(), archive.clone(), barrier.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    store.add_tarball(&archive, "source")
                })
            })
            .collect::<Vec<_>>();
        let trees = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap().0)
            .collect::<Vec<_>>();
        assert!(trees.iter().all(|tree| *tree == trees[0]));
        assert!(trees[0].path.join("Cargo.toml").is_file());
        // Only the tree itself remains; every staging directory was cleaned up.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn different_contents_give_different_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let (a, _) = store.add_tarball(&tarball(&[("r/f", "a", 0)]), "source").unwrap();
        let (b, _) = store.add_tarball(&tarball(&[("r/f", "b", 0)]), "source").unwrap();
        assert_ne!(a.nar_hash, b.nar_hash);
        assert_ne!(a.path, b.path);
    }

    #[test]
    fn several_top_level_entries_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let archive = tarball(&[("a/file", "x", 0), ("b/file", "y", 0)]);
        assert!(matches!(
            store.add_tarball(&archive, "source"),
            Err(Error::InvalidArchive { name, .. }) if name == "source"
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.add_tarball(b"definitely not gzip", "source"),
            Err(Error::InvalidArchive { .. })
        ));
    }

    #[test]
    fn paths_outside_the_store_are_not_valid() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("store")).unwrap();
        assert!(!store.is_valid(dir.path()));
        assert!(!store.is_valid(&dir.path().join("store/missing-source")));
    }
}
