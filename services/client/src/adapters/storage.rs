//! services/client/src/adapters/storage.rs
//!
//! This module contains the adapter for the hosted backend's object storage API.
//! It implements the `ObjectStorage` port from the `core` crate.

use crate::adapters::http::{check, transport_error};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use todo_core::domain::Bucket;
use todo_core::ports::{AuthService, ObjectStorage, PortResult};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `ObjectStorage` port over HTTP.
///
/// Requests carry the signed-in user's access token so the backend's bucket
/// policies apply; without a session the public key is used instead.
pub struct SupabaseStorageAdapter {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    auth: Arc<dyn AuthService>,
}

impl SupabaseStorageAdapter {
    /// Creates a new `SupabaseStorageAdapter`.
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        anon_key: &str,
        auth: Arc<dyn AuthService>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            auth,
        }
    }

    pub fn public_url(&self, bucket: Bucket, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            bucket.as_str(),
            path
        )
    }

    async fn bearer(&self) -> PortResult<String> {
        Ok(self
            .auth
            .get_session()
            .await?
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.anon_key.clone()))
    }
}

//=========================================================================================
// `ObjectStorage` Trait Implementation
//=========================================================================================

#[async_trait]
impl ObjectStorage for SupabaseStorageAdapter {
    async fn upload(
        &self,
        bucket: Bucket,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> PortResult<String> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket.as_str(), path);
        debug!(%url, size = data.len(), "Uploading object");
        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer().await?)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(data)
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?;
        Ok(self.public_url(bucket, path))
    }

    async fn delete(&self, bucket: Bucket, path: &str) -> PortResult<()> {
        let url = format!("{}/storage/v1/object/{}", self.base_url, bucket.as_str());
        let response = self
            .http
            .delete(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer().await?)
            .json(&json!({ "prefixes": [path] }))
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?;
        Ok(())
    }
}
