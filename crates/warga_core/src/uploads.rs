//! crates/warga_core/src/uploads.rs
//!
//! Object naming and cleanup shared by everything that stores files.

use bytes::Bytes;
use chrono::Utc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::ports::ObjectStorage;

pub const ACTIVITY_IMAGES_BUCKET: &str = "kegiatan-images";
pub const SERVICE_UPLOADS_BUCKET: &str = "layanan-uploads";
pub const RECEIPTS_BUCKET: &str = "ipl-receipts";

/// A file received from a form.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub data: Bytes,
}

/// The extension of `file_name`, lowercased, or `bin` when there is none.
pub fn extension(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string())
}

/// A fresh object name `{unix_millis}-{random}.{ext}` for an uploaded file.
pub fn unique_name(file_name: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}.{}",
        Utc::now().timestamp_millis(),
        &suffix[..7],
        extension(file_name)
    )
}

/// The object path a public URL points at, i.e. everything after the bucket segment.
pub fn object_path_from_url(url: &str, bucket: &str) -> Option<String> {
    let marker = format!("/{bucket}/");
    url.split_once(&marker)
        .map(|(_, path)| path.to_string())
        .filter(|path| !path.is_empty())
}

/// Removes objects whose owning record was never written.
///
/// Returns false when the removal itself failed and the objects are orphaned.
pub async fn discard_uploads(storage: &dyn ObjectStorage, bucket: &str, paths: &[String]) -> bool {
    if paths.is_empty() {
        return true;
    }
    match storage.remove(bucket, paths).await {
        Ok(()) => {
            warn!(bucket, count = paths.len(), "Removed uploads of a failed write");
            true
        }
        Err(e) => {
            error!(bucket, ?paths, error = %e, "Orphaned uploads left in storage");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_falls_back_to_bin() {
        assert_eq!(extension("bukti.JPG"), "jpg");
        assert_eq!(extension("archive.tar.gz"), "gz");
        assert_eq!(extension("README"), "bin");
        assert_eq!(extension("weird."), "bin");
        assert_eq!(extension("evil.p/hp"), "bin");
    }

    #[test]
    fn names_differ_within_one_millisecond() {
        let first = unique_name("bukti.PNG");
        let second = unique_name("bukti.PNG");
        assert_ne!(first, second);
        assert!(first.ends_with(".png"));
    }

    #[test]
    fn object_path_is_taken_after_the_bucket() {
        let url = "http://localhost:3000/storage/kegiatan-images/temp-1-abc.png";
        assert_eq!(
            object_path_from_url(url, ACTIVITY_IMAGES_BUCKET).as_deref(),
            Some("temp-1-abc.png")
        );
        assert_eq!(object_path_from_url("http://x/other/a.png", ACTIVITY_IMAGES_BUCKET), None);
    }
}
