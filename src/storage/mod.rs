//! Storage abstraction for downloaded snapshots.
//!
//! Logical paths are forward-slash relative paths as produced by the URL →
//! path mapper (e.g. `blog/post/index.html`). Implementations map them to
//! wherever files actually live; [`LocalStorage`] mirrors them into a root
//! directory on the OS filesystem.
//!
//! Writes are atomic: content lands in a temporary sibling file that is
//! renamed over the target, so no partially written file is ever visible
//! under a logical path.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Reading and writing of downloaded snapshot files by logical path.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Whether the logical path already has content.
    fn exists(&self, path: &str) -> bool;

    /// Full content of the logical path.
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Stream `reader` into the logical path atomically.
    async fn put(&self, path: &str, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()>;

    /// Write a whole buffer to the logical path atomically.
    async fn put_bytes(&self, path: &str, data: &[u8]) -> Result<()>;
}

/// Default [`Storage`] backed by a directory on the local filesystem.
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Map a logical forward-slash path to its on-disk location.
    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root_dir.clone();
        full.extend(path.split('/').filter(|seg| !seg.is_empty()));
        full
    }

    /// Create parent directories on demand.
    async fn ensure_parent(full: &Path) -> Result<PathBuf> {
        let parent = full
            .parent()
            .ok_or_else(|| anyhow!("path {} has no parent directory", full.display()))?;
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o750);
        builder
            .create(parent)
            .await
            .with_context(|| format!("create directory {}", parent.display()))?;
        Ok(parent.to_path_buf())
    }

    /// Temporary sibling used for atomic replacement. One download task owns
    /// each logical path, so a deterministic name cannot collide.
    fn temp_sibling(full: &Path) -> PathBuf {
        let name = full
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        full.with_file_name(format!(".{name}.wm-tmp"))
    }

    #[cfg(unix)]
    async fn set_mode(path: &Path, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .with_context(|| format!("set permissions on {}", path.display()))
    }

    #[cfg(not(unix))]
    async fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("read {}", full.display()))
    }

    async fn put(&self, path: &str, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()> {
        let full = self.resolve(path);
        Self::ensure_parent(&full).await?;
        let tmp = Self::temp_sibling(&full);

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .with_context(|| format!("create temp file {}", tmp.display()))?;
        let copied: Result<()> = async {
            tokio::io::copy(reader, &mut file).await?;
            file.flush().await?;
            Ok(())
        }
        .await;
        drop(file);

        if let Err(err) = copied {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err).with_context(|| format!("write {}", tmp.display()));
        }

        Self::set_mode(&tmp, 0o644).await?;
        tokio::fs::rename(&tmp, &full)
            .await
            .with_context(|| format!("rename {} into place", tmp.display()))
    }

    async fn put_bytes(&self, path: &str, data: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        Self::ensure_parent(&full).await?;
        let tmp = Self::temp_sibling(&full);

        if let Err(err) = tokio::fs::write(&tmp, data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err).with_context(|| format!("write {}", tmp.display()));
        }

        Self::set_mode(&tmp, 0o600).await?;
        tokio::fs::rename(&tmp, &full)
            .await
            .with_context(|| format!("rename {} into place", tmp.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_bytes_then_get_round_trips() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LocalStorage::new(dir.path());

        assert!(!store.exists("blog/post/index.html"));
        store
            .put_bytes("blog/post/index.html", b"<html></html>")
            .await
            .expect("write");
        assert!(store.exists("blog/post/index.html"));
        assert_eq!(
            store.get("blog/post/index.html").await.expect("read"),
            b"<html></html>"
        );
    }

    #[tokio::test]
    async fn put_streams_reader_content() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LocalStorage::new(dir.path());

        let mut reader = std::io::Cursor::new(b"body { color: red }".to_vec());
        store.put("assets/site.css", &mut reader).await.expect("put");
        assert_eq!(
            store.get("assets/site.css").await.expect("read"),
            b"body { color: red }"
        );
    }

    #[tokio::test]
    async fn put_leaves_no_temp_sibling_behind() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LocalStorage::new(dir.path());

        store.put_bytes("page.html", b"<p>hi</p>").await.expect("write");

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await.expect("read dir");
        while let Some(entry) = entries.next_entry().await.expect("entry") {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["page.html"]);
    }

    #[tokio::test]
    async fn put_bytes_overwrites_existing_content() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LocalStorage::new(dir.path());

        store.put_bytes("page.html", b"old").await.expect("write");
        store.put_bytes("page.html", b"new").await.expect("rewrite");
        assert_eq!(store.get("page.html").await.expect("read"), b"new");
    }
}
