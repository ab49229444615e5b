use std::collections::HashMap;

use axum::extract::Multipart;
use bytes::Bytes;

use crate::errors::AppError;
use crate::storage::MAX_UPLOAD_BYTES;

/// A file part read from a multipart form.
#[derive(Debug)]
pub struct UploadedFile {
    pub content_type: String,
    pub bytes: Bytes,
}

/// A multipart form split into its single `file` part and plain text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub fn require_file(&mut self) -> Result<UploadedFile, AppError> {
        self.file
            .take()
            .ok_or_else(|| AppError::Validation("A 'file' part is required".to_string()))
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

pub async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Could not read upload: {e}")))?;
            if bytes.len() > MAX_UPLOAD_BYTES {
                return Err(AppError::Validation(format!(
                    "File exceeds the {MAX_UPLOAD_BYTES} byte limit"
                )));
            }
            form.file = Some(UploadedFile {
                content_type,
                bytes,
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("Could not read field {name}: {e}")))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}
