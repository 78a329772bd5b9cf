//! Sandboxed blob filesystem.
//!
//! Server-side paths use the protocol's space-delimited grammar: an
//! absolute path is `/` followed by space-separated components, e.g.
//! `/ wsp 11111111-... new 1634546219.8312.3c7e5...`. Components are
//! validated before touching the local filesystem, so the grammar cannot
//! escape the sandbox root.
//!
//! Delete-after-move sequences must hold the per-path lock so that two
//! delivery workers cannot race on the same blob.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::StoreError;

/// A validated server-side path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerPath {
    components: Vec<String>,
}

impl ServerPath {
    pub fn root() -> Self {
        Self { components: Vec::new() }
    }

    pub fn push(&self, component: &str) -> Result<Self, StoreError> {
        validate_component(component)?;
        let mut components = self.components.clone();
        components.push(component.to_string());
        Ok(Self { components })
    }

    pub fn parent(&self) -> Option<Self> {
        if self.components.is_empty() {
            return None;
        }
        Some(Self {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    pub fn basename(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    fn to_local(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for c in &self.components {
            out.push(c);
        }
        out
    }
}

impl fmt::Display for ServerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for c in &self.components {
            write!(f, " {c}")?;
        }
        Ok(())
    }
}

impl FromStr for ServerPath {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        if parts.next() != Some("/") {
            return Err(StoreError::BadPath(format!("'{s}' is not absolute")));
        }
        let mut path = Self::root();
        for part in parts {
            path = path.push(part)?;
        }
        Ok(path)
    }
}

fn validate_component(component: &str) -> Result<(), StoreError> {
    let ok = !component.is_empty()
        && component != "."
        && component != ".."
        && component
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if !ok {
        return Err(StoreError::BadPath(format!("bad path component '{component}'")));
    }
    Ok(())
}

/// Blob storage beneath a sandbox root, with per-path locks.
#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
    locks: Arc<Mutex<HashMap<ServerPath, Arc<AsyncMutex<()>>>>>,
}

impl BlobStore {
    pub fn new(root: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn exists(&self, path: &ServerPath) -> bool {
        path.to_local(&self.root).exists()
    }

    pub fn mkdir(&self, path: &ServerPath) -> Result<(), StoreError> {
        std::fs::create_dir_all(path.to_local(&self.root))?;
        Ok(())
    }

    pub fn read(&self, path: &ServerPath) -> Result<Vec<u8>, StoreError> {
        let local = path.to_local(&self.root);
        if !local.exists() {
            return Err(StoreError::NotFound);
        }
        Ok(std::fs::read(local)?)
    }

    /// Write a blob into `dir` under a generated server-side name
    /// (`<unixtime>.<size>.<uuid>`) and return its full path.
    pub fn write_new(&self, dir: &ServerPath, data: &[u8]) -> Result<ServerPath, StoreError> {
        self.mkdir(dir)?;
        let name = format!("{}.{}.{}", Utc::now().timestamp(), data.len(), Uuid::new_v4());
        let path = dir.push(&name)?;
        std::fs::write(path.to_local(&self.root), data)?;
        Ok(path)
    }

    /// Write to an explicit path (used for queue intake where the caller
    /// already generated the name).
    pub fn write(&self, path: &ServerPath, data: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            self.mkdir(&parent)?;
        }
        std::fs::write(path.to_local(&self.root), data)?;
        Ok(())
    }

    /// Move a blob into `dest_dir`, keeping its basename. Returns the new
    /// path.
    pub fn move_to(&self, src: &ServerPath, dest_dir: &ServerPath) -> Result<ServerPath, StoreError> {
        let name = src
            .basename()
            .ok_or_else(|| StoreError::BadPath("cannot move the root".into()))?;
        self.mkdir(dest_dir)?;
        let dest = dest_dir.push(name)?;
        std::fs::rename(src.to_local(&self.root), dest.to_local(&self.root))?;
        Ok(dest)
    }

    pub fn copy_to(&self, src: &ServerPath, dest_dir: &ServerPath) -> Result<ServerPath, StoreError> {
        let name = src
            .basename()
            .ok_or_else(|| StoreError::BadPath("cannot copy the root".into()))?;
        self.mkdir(dest_dir)?;
        let dest = dest_dir.push(name)?;
        std::fs::copy(src.to_local(&self.root), dest.to_local(&self.root))?;
        Ok(dest)
    }

    pub fn delete(&self, path: &ServerPath) -> Result<(), StoreError> {
        let local = path.to_local(&self.root);
        if !local.exists() {
            return Err(StoreError::NotFound);
        }
        std::fs::remove_file(local)?;
        Ok(())
    }

    /// Take the lock for `path`. Hold the guard across any
    /// move-then-delete sequence.
    pub async fn lock(&self, path: &ServerPath) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock();
            // A strong count of 1 means only the map still holds the lock.
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks
                .entry(path.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (BlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (BlobStore::new(dir.path()).unwrap(), dir)
    }

    #[test]
    fn path_grammar() {
        let p: ServerPath = "/ wsp 11111111-2222-3333-4444-555566667777 new".parse().unwrap();
        assert_eq!(p.to_string(), "/ wsp 11111111-2222-3333-4444-555566667777 new");
        assert_eq!(p.basename(), Some("new"));

        assert!("wsp new".parse::<ServerPath>().is_err());
        assert!("/ wsp ..".parse::<ServerPath>().is_err());
        assert!("/ wsp a/b".parse::<ServerPath>().is_err());
    }

    #[test]
    fn write_move_read_delete() {
        let (blobs, _dir) = store();
        let queue: ServerPath = "/ queue".parse().unwrap();
        let inbox: ServerPath = "/ wsp abc new".parse().unwrap();

        let path = blobs.write_new(&queue, b"envelope bytes").unwrap();
        assert!(blobs.exists(&path));

        let moved = blobs.move_to(&path, &inbox).unwrap();
        assert!(!blobs.exists(&path));
        assert_eq!(blobs.read(&moved).unwrap(), b"envelope bytes");

        blobs.delete(&moved).unwrap();
        assert!(matches!(blobs.read(&moved), Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn path_locks_serialize_access() {
        let (blobs, _dir) = store();
        let p: ServerPath = "/ queue item".parse().unwrap();

        let guard = blobs.lock(&p).await;
        // A second lock attempt on the same path must not succeed while the
        // guard is held.
        let second = tokio::time::timeout(std::time::Duration::from_millis(50), blobs.lock(&p));
        assert!(second.await.is_err());
        drop(guard);
        let _guard2 = blobs.lock(&p).await;
    }

    #[tokio::test]
    async fn released_path_locks_are_pruned() {
        let (blobs, _dir) = store();
        let a: ServerPath = "/ queue a".parse().unwrap();
        let b: ServerPath = "/ queue b".parse().unwrap();

        drop(blobs.lock(&a).await);
        // Taking a different lock discards the released one.
        drop(blobs.lock(&b).await);
        assert_eq!(blobs.locks.lock().len(), 1);

        drop(blobs.lock(&a).await);
        assert_eq!(blobs.locks.lock().len(), 1);
    }
}
