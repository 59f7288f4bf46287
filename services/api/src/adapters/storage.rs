//! services/api/src/adapters/storage.rs
//!
//! Object storage on the local filesystem. Each bucket is a directory under
//! `root`; objects are served back by the router under `/storage`.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use warga_core::ports::{ObjectStorage, PortError, PortResult};

pub const PUBLIC_PREFIX: &str = "/storage";

#[derive(Clone, Debug)]
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `bucket/path` below the root, refusing anything that could escape it.
    fn object_path(&self, bucket: &str, path: &str) -> PortResult<PathBuf> {
        let relative = Path::new(bucket).join(path);
        let plain = !bucket.is_empty()
            && !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(PortError::Unexpected(format!("Invalid object path {bucket}/{path}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, bucket: &str, path: &str, data: Bytes) -> PortResult<()> {
        let target = self.object_path(bucket, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => PortError::Conflict(format!("Object {bucket}/{path}")),
                _ => PortError::Unexpected(e.to_string()),
            })?;
        file.write_all(&data)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!(bucket, path, bytes = data.len(), "Stored object");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}{PUBLIC_PREFIX}/{bucket}/{path}", self.public_base_url)
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> PortResult<()> {
        for path in paths {
            let target = self.object_path(bucket, path)?;
            match fs::remove_file(&target).await {
                Ok(()) => debug!(bucket, path = %path, "Removed object"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(PortError::Unexpected(e.to_string())),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch() -> LocalObjectStorage {
        let root = std::env::temp_dir().join(format!("warga-storage-{}", Uuid::new_v4()));
        LocalObjectStorage::new(root, "http://localhost:3000/")
    }

    #[tokio::test]
    async fn upload_then_remove() {
        let storage = scratch();
        storage
            .upload("ipl-receipts", "u1/1.png", Bytes::from_static(b"png"))
            .await
            .unwrap();
        let on_disk = storage.root().join("ipl-receipts/u1/1.png");
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"png");

        storage
            .remove("ipl-receipts", &["u1/1.png".to_string(), "missing.png".to_string()])
            .await
            .unwrap();
        assert!(!on_disk.exists());
        let _ = std::fs::remove_dir_all(storage.root());
    }

    #[tokio::test]
    async fn existing_object_is_not_overwritten() {
        let storage = scratch();
        storage.upload("b", "x.bin", Bytes::from_static(b"1")).await.unwrap();
        let again = storage.upload("b", "x.bin", Bytes::from_static(b"2")).await;
        assert!(matches!(again, Err(PortError::Conflict(_))));
        let _ = std::fs::remove_dir_all(storage.root());
    }

    #[tokio::test]
    async fn paths_cannot_escape_the_root() {
        let storage = scratch();
        for bad in ["../x.png", "/etc/passwd", "a/../../b", ""] {
            assert!(storage.upload("b", bad, Bytes::new()).await.is_err(), "{bad}");
        }
    }

    #[test]
    fn public_url_lives_under_storage_prefix() {
        let storage = scratch();
        assert_eq!(
            storage.public_url("kegiatan-images", "a.png"),
            "http://localhost:3000/storage/kegiatan-images/a.png"
        );
    }
}
