//! services/api/src/web/form.rs
//!
//! Reads `multipart/form-data` bodies into text fields plus file attachments.

use std::collections::HashMap;
use std::str::FromStr;

use axum::extract::Multipart;
use axum::http::StatusCode;
use warga_core::uploads::Attachment;

use crate::web::reply::{bad_request, Rejection};

#[derive(Debug, Default)]
pub struct FormParts {
    fields: HashMap<String, String>,
    /// Files in arrival order, keyed by their form field name.
    files: Vec<(String, Attachment)>,
}

impl FormParts {
    pub async fn read(mut multipart: Multipart) -> Result<Self, Rejection> {
        let mut parts = FormParts::default();
        while let Some(field) = multipart.next_field().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read multipart data: {}", e),
            )
        })? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let data = field.bytes().await.map_err(|e| {
                        (
                            StatusCode::BAD_REQUEST,
                            format!("Failed to read file bytes: {}", e),
                        )
                    })?;
                    // Browsers send an empty part for an untouched file input.
                    if !data.is_empty() {
                        parts.files.push((name, Attachment { file_name, data }));
                    }
                }
                None => {
                    let text = field.text().await.map_err(|e| {
                        (
                            StatusCode::BAD_REQUEST,
                            format!("Failed to read form field: {}", e),
                        )
                    })?;
                    parts.fields.insert(name, text);
                }
            }
        }
        Ok(parts)
    }

    /// A non-blank text field.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn required(&self, name: &str) -> Result<String, Rejection> {
        self.text(name)
            .ok_or_else(|| bad_request(format!("Field '{}' is required", name)))
    }

    pub fn parsed<T>(&self, name: &str) -> Result<Option<T>, Rejection>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.text(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| bad_request(format!("Invalid value for '{}': {}", name, e)))
            })
            .transpose()
    }

    /// Takes every file sent under `name`.
    pub fn take_files(&mut self, name: &str) -> Vec<Attachment> {
        let (wanted, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|(field, _)| field == name);
        self.files = rest;
        wanted.into_iter().map(|(_, file)| file).collect()
    }

    pub fn take_file(&mut self, name: &str) -> Option<Attachment> {
        self.take_files(name).into_iter().next()
    }
}
