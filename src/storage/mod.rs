//! Media storage backed by an S3-compatible object store.
//!
//! Uploads go under `<namespace>/<uuid>.<ext>`; the returned public id is the
//! object key, which is all that is needed to remove the object later.
//! Removal is best-effort: failures are logged, never propagated.

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use axum::body::Bytes;
use uuid::Uuid;

use crate::config::StorageConfig;

/// A stored object: where the public can fetch it, and the key to delete it
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub url: String,
    pub public_id: String,
}

#[derive(Clone)]
pub struct MediaStorage {
    client: aws_sdk_s3::Client,
    config: StorageConfig,
}

impl MediaStorage {
    pub async fn connect(config: StorageConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = config.region.clone() {
            loader = loader.region(aws_config::Region::new(region));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());

        Ok(Self { client, config })
    }

    /// Upload a file under the given namespace
    pub async fn store(
        &self,
        data: Bytes,
        file_name: &str,
        namespace: &str,
    ) -> Result<StoredObject> {
        let extension = file_name.rsplit('.').next().unwrap_or("bin").to_lowercase();
        let key = format!("{}/{}.{}", namespace, Uuid::new_v4(), extension);
        let content_type = content_type_for(&extension);

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .with_context(|| format!("Failed to store object {}", key))?;

        Ok(StoredObject {
            url: self.public_url(&key),
            public_id: key,
        })
    }

    /// Delete an object, best-effort
    pub async fn remove(&self, public_id: &str) {
        if public_id.is_empty() {
            return;
        }
        if let Err(e) = self
            .client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(public_id)
            .send()
            .await
        {
            tracing::warn!(key = %public_id, error = %e, "Failed to remove stored object");
        }
    }

    fn public_url(&self, key: &str) -> String {
        match &self.config.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => match &self.config.endpoint {
                Some(endpoint) => format!(
                    "{}/{}/{}",
                    endpoint.trim_end_matches('/'),
                    self.config.bucket,
                    key
                ),
                None => format!("https://{}.s3.amazonaws.com/{}", self.config.bucket, key),
            },
        }
    }
}

fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types_cover_common_images() {
        assert_eq!(content_type_for("jpg"), "image/jpeg");
        assert_eq!(content_type_for("jpeg"), "image/jpeg");
        assert_eq!(content_type_for("png"), "image/png");
        assert_eq!(content_type_for("exe"), "application/octet-stream");
    }
}
