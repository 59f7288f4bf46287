//! crates/warga_core/src/activities.rs
//!
//! Neighbourhood activities (kegiatan): public listing and admin maintenance,
//! including their photo uploads.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::accounts::require;
use crate::domain::{Activity, ActivityInput, Capability};
use crate::error::{PortalError, PortalResult};
use crate::gate::Caller;
use crate::ports::{DatabaseService, ObjectStorage};
use crate::uploads::{self, Attachment, ACTIVITY_IMAGES_BUCKET};

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityForm {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
}

#[derive(Clone)]
pub struct ActivityBoard {
    db: Arc<dyn DatabaseService>,
    storage: Arc<dyn ObjectStorage>,
}

impl ActivityBoard {
    pub fn new(db: Arc<dyn DatabaseService>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { db, storage }
    }

    pub async fn list(&self) -> PortalResult<Vec<Activity>> {
        Ok(self.db.list_activities().await?)
    }

    pub async fn get(&self, activity_id: Uuid) -> PortalResult<Activity> {
        Ok(self.db.get_activity(activity_id).await?)
    }

    /// Uploads images one by one. A file that fails to upload is skipped.
    ///
    /// Returns the stored object paths; use `ObjectStorage::public_url` to show them.
    pub async fn upload_images(
        &self,
        actor: &Caller,
        activity_id: Option<Uuid>,
        files: Vec<Attachment>,
    ) -> PortalResult<Vec<String>> {
        require(actor, Capability::ManageActivities)?;
        let prefix = activity_id.map_or_else(|| "temp".to_string(), |id| id.to_string());

        let mut paths = Vec::with_capacity(files.len());
        for file in files {
            let path = format!("{prefix}-{}", uploads::unique_name(&file.file_name));
            match self.storage.upload(ACTIVITY_IMAGES_BUCKET, &path, file.data).await {
                Ok(()) => paths.push(path),
                Err(e) => warn!(file = %file.file_name, error = %e, "Skipping image that failed to upload"),
            }
        }
        Ok(paths)
    }

    /// Creates (when `existing` is `None`) or updates an activity, adding `new_images`.
    ///
    /// Images uploaded by this call are removed again if the row write fails.
    pub async fn save(
        &self,
        actor: &Caller,
        existing: Option<Uuid>,
        form: ActivityForm,
        new_images: Vec<Attachment>,
    ) -> PortalResult<Activity> {
        require(actor, Capability::ManageActivities)?;
        if form.title.trim().is_empty() {
            return Err(PortalError::validation("Judul kegiatan wajib diisi"));
        }

        let mut images = match existing {
            Some(id) => self.db.get_activity(id).await?.images,
            None => Vec::new(),
        };
        let uploaded = self.upload_images(actor, existing, new_images).await?;
        images.extend(
            uploaded
                .iter()
                .map(|path| self.storage.public_url(ACTIVITY_IMAGES_BUCKET, path)),
        );

        let input = ActivityInput {
            title: form.title,
            description: form.description,
            date: form.date,
            location: form.location,
            images,
        };
        let written = match existing {
            Some(id) => self.db.update_activity(id, &input).await,
            None => self.db.create_activity(&input).await,
        };

        match written {
            Ok(activity) => {
                info!(activity_id = %activity.id, images = activity.images.len(), "Saved activity");
                Ok(activity)
            }
            Err(e) => {
                if !uploads::discard_uploads(self.storage.as_ref(), ACTIVITY_IMAGES_BUCKET, &uploaded).await {
                    return Err(PortalError::Orphaned {
                        step: format!("Activity save ({e})"),
                        resource: format!("images {}", uploaded.join(", ")),
                    });
                }
                Err(e.into())
            }
        }
    }

    pub async fn delete(&self, actor: &Caller, activity_id: Uuid) -> PortalResult<()> {
        require(actor, Capability::ManageActivities)?;
        self.db.delete_activity(activity_id).await?;
        info!(activity_id = %activity_id, "Deleted activity");
        Ok(())
    }

    /// Removes the stored object behind an image URL.
    pub async fn delete_image(&self, actor: &Caller, image_url: &str) -> PortalResult<()> {
        require(actor, Capability::ManageActivities)?;
        let Some(path) = uploads::object_path_from_url(image_url, ACTIVITY_IMAGES_BUCKET) else {
            return Err(PortalError::validation("URL gambar tidak dikenal"));
        };
        self.storage.remove(ACTIVITY_IMAGES_BUCKET, &[path]).await?;
        Ok(())
    }
}
