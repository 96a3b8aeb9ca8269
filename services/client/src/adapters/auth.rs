//! services/client/src/adapters/auth.rs
//!
//! This module contains the adapter for the hosted backend's auth REST API.
//! It implements the `AuthService` port from the `core` crate and announces
//! every session change on a broadcast channel.

use crate::adapters::http::{check, transport_error};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use todo_core::domain::{AuthEvent, AuthEventKind, AuthUser, Session, SignUpCredentials};
use todo_core::ports::{AuthEventStream, AuthService, PortError, PortResult};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 32;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct UserBody {
    id: Uuid,
    email: Option<String>,
}

#[derive(Deserialize)]
struct TokenBody {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    expires_at: Option<i64>,
    user: UserBody,
}

impl TokenBody {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: AuthUser {
                id: self.user.id,
                email: self.user.email,
            },
        }
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `AuthService` port over HTTP.
pub struct SupabaseAuthAdapter {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    /// Also serializes token refreshes.
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseAuthAdapter {
    /// Creates a new `SupabaseAuthAdapter`.
    pub fn new(http: reqwest::Client, base_url: &str, anon_key: &str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            session: Mutex::new(None),
            events,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        // No receivers just means nobody is listening yet.
        let _ = self.events.send(AuthEvent::new(kind, session));
    }

    async fn token_request(&self, grant_type: &str, body: serde_json::Value) -> PortResult<Session> {
        let response = self
            .http
            .post(self.url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let token: TokenBody = check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;
        Ok(token.into_session(Utc::now()))
    }

    async fn access_token(&self) -> PortResult<String> {
        self.get_session()
            .await?
            .map(|s| s.access_token)
            .ok_or(PortError::Unauthorized)
    }
}

//=========================================================================================
// `AuthService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthService for SupabaseAuthAdapter {
    /// Returns the in-memory session, refreshing it first when it has expired.
    async fn get_session(&self) -> PortResult<Option<Session>> {
        let mut slot = self.session.lock().await;
        let Some(current) = slot.clone() else {
            return Ok(None);
        };
        if !current.is_expired(Utc::now()) {
            return Ok(Some(current));
        }

        let refreshed = self
            .token_request(
                "refresh_token",
                json!({ "refresh_token": current.refresh_token }),
            )
            .await;
        match refreshed {
            Ok(session) => {
                info!(user_id = %session.user_id(), "Access token refreshed");
                *slot = Some(session.clone());
                self.emit(AuthEventKind::TokenRefreshed, Some(session.clone()));
                Ok(Some(session))
            }
            Err(PortError::Unexpected(msg)) => Err(PortError::Unexpected(msg)),
            Err(e) => {
                warn!("Session expired and could not be refreshed: {}", e);
                *slot = None;
                self.emit(AuthEventKind::SignedOut, None);
                Ok(None)
            }
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<Session> {
        let session = self
            .token_request("password", json!({ "email": email, "password": password }))
            .await?;
        *self.session.lock().await = Some(session.clone());
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, credentials: &SignUpCredentials) -> PortResult<Option<Session>> {
        let body = json!({
            "email": credentials.email,
            "password": credentials.password,
            "data": { "full_name": credentials.full_name.as_deref().unwrap_or_default() },
        });
        let response = self
            .http
            .post(self.url("signup"))
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let value: serde_json::Value = check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        // Without email confirmation the backend answers with a full token body.
        if value.get("access_token").is_none() {
            return Ok(None);
        }
        let token: TokenBody = serde_json::from_value(value)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let session = token.into_session(Utc::now());
        *self.session.lock().await = Some(session.clone());
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(Some(session))
    }

    async fn sign_out(&self) -> PortResult<()> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            let response = self
                .http
                .post(self.url("logout"))
                .header("apikey", &self.anon_key)
                .bearer_auth(&session.access_token)
                .send()
                .await
                .map_err(transport_error)?;
            match check(response).await {
                // An already revoked token still counts as signed out.
                Ok(_) | Err(PortError::Unauthorized) | Err(PortError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        *slot = None;
        drop(slot);
        self.emit(AuthEventKind::SignedOut, None);
        Ok(())
    }

    async fn request_password_reset(&self, email: &str, redirect_to: &str) -> PortResult<()> {
        let response = self
            .http
            .post(self.url("recover"))
            .query(&[("redirect_to", redirect_to)])
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email }))
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?;
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> PortResult<()> {
        let token = self.access_token().await?;
        let response = self
            .http
            .put(self.url("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .json(&json!({ "password": new_password }))
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?;

        let session = self.session.lock().await.clone();
        self.emit(AuthEventKind::UserUpdated, session);
        Ok(())
    }

    fn subscribe(&self) -> AuthEventStream {
        let mut receiver = self.events.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth event subscriber lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
