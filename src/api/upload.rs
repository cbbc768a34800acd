//! Multipart form collection for endpoints that accept file uploads.

use axum::body::Bytes;
use axum::extract::Multipart;
use std::collections::HashMap;

use super::error::ApiError;

/// One uploaded file from a multipart request
#[derive(Debug)]
pub struct UploadedFile {
    /// Form field the file arrived under
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// A fully drained multipart form: text fields plus uploaded files
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl MultipartForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }

    /// Files uploaded under the given form field
    pub fn files_named(&self, field: &str) -> Vec<&UploadedFile> {
        self.files.iter().filter(|f| f.field == field).collect()
    }
}

const MAX_FILE_BYTES: usize = 8 * 1024 * 1024;

/// Drain a multipart request into memory. Parts with a filename become
/// [`UploadedFile`]s, everything else is read as a UTF-8 text field.
pub async fn collect_multipart(mut multipart: Multipart) -> Result<MultipartForm, ApiError> {
    let mut form = MultipartForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart request: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(|s| s.to_string()) {
            let content_type = field.content_type().map(|s| s.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;

            if data.len() > MAX_FILE_BYTES {
                return Err(ApiError::validation_field(
                    &name,
                    "Uploaded file exceeds the 8 MiB limit",
                ));
            }

            form.files.push(UploadedFile {
                field: name,
                file_name,
                content_type,
                data,
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::bad_request(format!("Malformed form field: {}", e)))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}
