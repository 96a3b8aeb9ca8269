//! services/client/src/client/images.rs
//!
//! Uploads and removes task images and avatars in object storage.

use crate::client::state::AppState;
use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use todo_core::domain::Bucket;
use tracing::info;

/// Maps a file extension to the content type sent with the upload.
pub fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

/// Lower-cased extension of `file_name`, `jpg` when it has none.
pub fn extension_of(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty() && !ext.contains('/'))
        .unwrap_or_else(|| "jpg".to_string())
}

/// The object path inside `bucket` of a public storage URL.
pub fn object_path<'a>(bucket: Bucket, public_url: &'a str) -> ClientResult<&'a str> {
    let marker = format!("/storage/v1/object/public/{}/", bucket.as_str());
    match public_url.split_once(marker.as_str()) {
        Some((_, path)) if !path.is_empty() => Ok(path),
        _ => Err(ClientError::Validation("Invalid image URL".to_string())),
    }
}

#[derive(Clone)]
pub struct ImageService {
    state: Arc<AppState>,
}

impl ImageService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Stores an image under `<user_id>/<unix_millis>.<ext>` and returns its public URL.
    pub async fn upload_image(
        &self,
        bucket: Bucket,
        file_name: &str,
        data: Bytes,
    ) -> ClientResult<String> {
        let user_id = self.state.current_user_id()?;

        let limit = self.state.config.max_image_bytes();
        if data.len() as u64 > limit {
            return Err(ClientError::Validation(format!(
                "image is too large, the limit is {}MB",
                self.state.config.max_image_mb
            )));
        }

        let ext = extension_of(file_name);
        let path = format!("{}/{}.{}", user_id, Utc::now().timestamp_millis(), ext);
        let url = self
            .state
            .storage
            .upload(bucket, &path, data, content_type_for(&ext))
            .await?;
        info!(bucket = bucket.as_str(), %path, "Image uploaded");
        Ok(url)
    }

    pub async fn delete_image(&self, bucket: Bucket, public_url: &str) -> ClientResult<()> {
        self.state.current_user_id()?;
        let path = object_path(bucket, public_url)?;
        self.state.storage.delete(bucket, path).await?;
        info!(bucket = bucket.as_str(), %path, "Image deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_default_to_jpeg() {
        assert_eq!(content_type_for("png"), "image/png");
        assert_eq!(content_type_for("webp"), "image/webp");
        assert_eq!(content_type_for("heic"), "image/jpeg");
    }

    #[test]
    fn extensions_are_lower_cased_with_jpg_fallback() {
        assert_eq!(extension_of("IMG_001.PNG"), "png");
        assert_eq!(extension_of("photo"), "jpg");
        assert_eq!(extension_of("file:///tmp/x.y/photo"), "jpg");
    }

    #[test]
    fn object_path_is_taken_after_the_bucket_marker() {
        let url = "https://abc.supabase.co/storage/v1/object/public/avatars/u1/123.png";
        assert_eq!(object_path(Bucket::Avatars, url).unwrap(), "u1/123.png");
        assert!(object_path(Bucket::TodoImages, url).is_err());
        assert!(object_path(Bucket::Avatars, "https://example.com/x.png").is_err());
    }
}
