//! # casc-cache
//!
//! Per-build filesystem cache for remote CASC content.
//!
//! Every fetched artifact lands in a directory named by the build config
//! hash, so separate builds never share or evict each other's files:
//!
//! ```text
//! {user_data_root}/{build_config_hash}/
//!     encoding                         <- BLTE-framed encoding table
//!     root                             <- BLTE-framed root table
//!     indexes/{archive_hash}.index     <- raw archive index
//!     data/{encoding_key}              <- raw (still framed) file payload
//! ```
//!
//! Files are byte-identical to the CDN responses that produced them.
//! Writes go to a temporary sibling and are renamed into place, so a
//! partially-written file can never be observed. Nothing is ever evicted.

mod error;

pub use error::{Error, Result};

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Where a cached file lives within the build directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Top level; the well-known `encoding` and `root` singletons.
    Top,
    /// `indexes/` - archive index files.
    Indexes,
    /// `data/` - loose file payloads.
    Data,
}

impl Category {
    fn dir(self) -> Option<&'static str> {
        match self {
            Category::Top => None,
            Category::Indexes => Some("indexes"),
            Category::Data => Some("data"),
        }
    }
}

/// A build-scoped content-addressed cache directory.
pub struct BuildCache {
    base_dir: PathBuf,
}

impl BuildCache {
    /// Create a cache handle for one build under `user_data_root`.
    ///
    /// `build_hash` is the lowercase hex build config hash. Nothing is
    /// touched on disk until [`init`](Self::init) runs.
    pub fn new(user_data_root: impl AsRef<Path>, build_hash: &str) -> Self {
        Self {
            base_dir: user_data_root.as_ref().join(build_hash),
        }
    }

    /// The default user data root for this platform.
    pub fn default_user_data_root() -> Result<PathBuf> {
        dirs::data_local_dir()
            .ok_or(Error::DataDirectoryNotFound)
            .map(|dir| dir.join("casc-remote"))
    }

    /// Ensure the directory structure exists.
    pub async fn init(&self) -> Result<()> {
        for category in [Category::Top, Category::Indexes, Category::Data] {
            let mut dir = self.base_dir.clone();
            if let Some(sub) = category.dir() {
                dir.push(sub);
            }
            tokio::fs::create_dir_all(&dir).await?;
        }

        debug!("Initialized build cache at: {:?}", self.base_dir);
        Ok(())
    }

    /// Full path of a cache entry.
    pub fn entry_path(&self, name: &str, category: Category) -> PathBuf {
        let mut path = self.base_dir.clone();
        if let Some(sub) = category.dir() {
            path.push(sub);
        }
        path.push(name);
        path
    }

    /// `true` if an entry exists.
    pub async fn has(&self, name: &str, category: Category) -> bool {
        tokio::fs::metadata(self.entry_path(name, category))
            .await
            .is_ok()
    }

    /// Read an entry. Absence is not an error.
    pub async fn get(&self, name: &str, category: Category) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(name, category);

        match tokio::fs::read(&path).await {
            Ok(data) => {
                trace!("cache hit: {path:?} ({} bytes)", data.len());
                Ok(Some(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("cache miss: {path:?}");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write an entry atomically (write to a `.tmp` sibling, rename).
    ///
    /// Concurrent stores of the same name are safe: content addressing
    /// means both writers carry identical bytes, and the rename makes
    /// whichever lands last a no-op in effect.
    pub async fn store(&self, name: &str, data: &[u8], category: Category) -> Result<()> {
        let path = self.entry_path(name, category);
        let tmp = path.with_extension("tmp");

        trace!("cache store: {path:?} ({} bytes)", data.len());
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;

        Ok(())
    }

    /// The build directory backing this cache.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BUILD: &str = "e0ba45eb1af1166c6bd9ab2d3a9143b3";

    async fn cache() -> (TempDir, BuildCache) {
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(dir.path(), BUILD);
        cache.init().await.unwrap();
        (dir, cache)
    }

    #[tokio::test]
    async fn round_trip() {
        let (_dir, cache) = cache().await;

        cache
            .store("encoding", b"table bytes", Category::Top)
            .await
            .unwrap();

        assert!(cache.has("encoding", Category::Top).await);
        assert_eq!(
            cache.get("encoding", Category::Top).await.unwrap(),
            Some(b"table bytes".to_vec())
        );
    }

    #[tokio::test]
    async fn absent_entry_is_none() {
        let (_dir, cache) = cache().await;

        assert!(!cache.has("missing", Category::Data).await);
        assert_eq!(cache.get("missing", Category::Data).await.unwrap(), None);
    }

    #[tokio::test]
    async fn categories_do_not_collide() {
        let (_dir, cache) = cache().await;

        cache.store("aa", b"index", Category::Indexes).await.unwrap();
        cache.store("aa", b"data", Category::Data).await.unwrap();

        assert_eq!(
            cache.get("aa", Category::Indexes).await.unwrap(),
            Some(b"index".to_vec())
        );
        assert_eq!(
            cache.get("aa", Category::Data).await.unwrap(),
            Some(b"data".to_vec())
        );
    }

    #[tokio::test]
    async fn layout_matches_expected_tree() {
        let (dir, cache) = cache().await;

        cache.store("root", b"r", Category::Top).await.unwrap();
        cache
            .store("0017a402.index", b"i", Category::Indexes)
            .await
            .unwrap();
        cache.store("55ab362f", b"d", Category::Data).await.unwrap();

        let base = dir.path().join(BUILD);
        assert!(base.join("root").is_file());
        assert!(base.join("indexes/0017a402.index").is_file());
        assert!(base.join("data/55ab362f").is_file());
    }

    #[tokio::test]
    async fn store_overwrites_existing_entry() {
        let (_dir, cache) = cache().await;

        cache.store("root", b"old", Category::Top).await.unwrap();
        cache.store("root", b"new", Category::Top).await.unwrap();

        assert_eq!(
            cache.get("root", Category::Top).await.unwrap(),
            Some(b"new".to_vec())
        );
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let (dir, cache) = cache().await;

        cache.store("root", b"bytes", Category::Top).await.unwrap();

        let mut names = Vec::new();
        let mut entries = std::fs::read_dir(dir.path().join(BUILD)).unwrap();
        while let Some(Ok(entry)) = entries.next() {
            names.push(entry.file_name().into_string().unwrap());
        }
        assert!(!names.iter().any(|n| n.ends_with(".tmp")), "{names:?}");
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let (_dir, cache) = cache().await;
        cache.init().await.unwrap();
        cache.init().await.unwrap();
    }
}
