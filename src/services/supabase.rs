//! Supabase Backend for Markboard.
//!
//! Implements [`Backend`] against a hosted Supabase project: GoTrue for auth,
//! PostgREST for the `bookmarks` relation and Realtime for the change feed.
//! Row visibility is enforced by the project's row-level security; the client
//! only adds an owner filter to its reads.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::services::backend::{Backend, ChangeFeed, FeedHandle};
use crate::services::realtime::{self, RealtimeChannel};
use crate::services::session_store::{SessionStore, SessionStoreTrait};
use crate::types::bookmark::{Bookmark, NewBookmark};
use crate::types::change::FeedFilter;
use crate::types::config::{HttpConfig, RealtimeConfig};
use crate::types::errors::BackendError;
use crate::types::session::{AuthSession, Identity};

/// GoTrue password-grant response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: Identity,
}

/// Backend talking to a hosted Supabase project.
pub struct SupabaseBackend {
    base_url: String,
    anon_key: String,
    http: reqwest::Client,
    realtime: RealtimeConfig,
    session: RwLock<Option<AuthSession>>,
    session_store: Option<SessionStore>,
    channels: Mutex<HashMap<String, RealtimeChannel>>,
}

/// Trims whitespace and trailing slashes off a project URL.
pub fn normalize_base_url(base_url: &str) -> Result<String, BackendError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(BackendError::NetworkError("supabase url is missing".to_string()));
    }
    Ok(trimmed.to_string())
}

fn network_err(e: reqwest::Error) -> BackendError {
    BackendError::NetworkError(e.to_string())
}

fn http_error(status: StatusCode, body: &[u8]) -> BackendError {
    let body = String::from_utf8_lossy(body).trim().to_string();
    let body = if body.is_empty() { "<empty>".to_string() } else { body };
    BackendError::HttpError(status.as_u16(), body)
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(network_err)?;
    if !status.is_success() {
        return Err(http_error(status, &bytes));
    }
    serde_json::from_slice::<T>(&bytes).map_err(|e| BackendError::DecodeError(e.to_string()))
}

async fn expect_success(response: reqwest::Response) -> Result<(), BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let bytes = response.bytes().await.map_err(network_err)?;
    Err(http_error(status, &bytes))
}

impl SupabaseBackend {
    /// Creates a backend for the project at `base_url`.
    ///
    /// A session saved in `session_store` is restored; a corrupt one is discarded.
    pub fn new(
        base_url: &str,
        anon_key: &str,
        http: &HttpConfig,
        realtime: &RealtimeConfig,
        session_store: Option<SessionStore>,
    ) -> Result<Self, BackendError> {
        let base_url = normalize_base_url(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(network_err)?;

        let session = match session_store.as_ref().map(|s| s.restore_session()) {
            Some(Ok(session)) => session,
            Some(Err(e)) => {
                warn!(error = %e, "discarding unreadable saved session");
                None
            }
            None => None,
        };

        Ok(Self {
            base_url,
            anon_key: anon_key.to_string(),
            http: client,
            realtime: realtime.clone(),
            session: RwLock::new(session),
            session_store,
            channels: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a path under the project.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn has_session(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Number of realtime channels currently open.
    pub fn open_channel_count(&self) -> usize {
        self.channels().len()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, RealtimeChannel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    /// Bearer token for requests: the user's access token, or the anon key when signed out.
    fn bearer(&self) -> String {
        self.access_token().unwrap_or_else(|| self.anon_key.clone())
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.endpoint(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    fn store_session(&self, session: Option<AuthSession>) {
        if let Some(store) = &self.session_store {
            let persisted = match &session {
                Some(s) => store.save_session(s),
                None => store.clear_session(),
            };
            if let Err(e) = persisted {
                warn!(error = %e, "could not persist auth session");
            }
        }
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }
}

#[async_trait]
impl Backend for SupabaseBackend {
    async fn resolve_identity(&self) -> Result<Option<Identity>, BackendError> {
        if !self.has_session() {
            return Ok(None);
        }
        let response = self
            .request(reqwest::Method::GET, "auth/v1/user")
            .send()
            .await
            .map_err(network_err)?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("saved session rejected by auth service");
                self.store_session(None);
                Ok(None)
            }
            _ => decode_json::<Identity>(response).await.map(Some),
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, BackendError> {
        let response = self
            .http
            .post(self.endpoint("auth/v1/token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(network_err)?;
        let token: TokenResponse = decode_json(response).await?;

        let user = token.user.clone();
        self.store_session(Some(AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user: token.user,
        }));
        info!(user_id = %user.id, "signed in");
        Ok(user)
    }

    async fn query_bookmarks(&self, owner: &Identity) -> Result<Vec<Bookmark>, BackendError> {
        let owner_filter = format!("eq.{}", owner.id);
        let response = self
            .request(reqwest::Method::GET, "rest/v1/bookmarks")
            .query(&[
                ("select", "*"),
                ("user_id", owner_filter.as_str()),
                ("order", "created_at.desc"),
            ])
            .send()
            .await
            .map_err(network_err)?;
        decode_json(response).await
    }

    async fn insert_bookmark(&self, bookmark: NewBookmark) -> Result<Bookmark, BackendError> {
        let response = self
            .request(reqwest::Method::POST, "rest/v1/bookmarks")
            .header("Prefer", "return=representation")
            .json(&[bookmark])
            .send()
            .await
            .map_err(network_err)?;
        let mut rows: Vec<Bookmark> = decode_json(response).await?;
        if rows.is_empty() {
            return Err(BackendError::DecodeError(
                "insert returned no representation".to_string(),
            ));
        }
        Ok(rows.swap_remove(0))
    }

    async fn delete_bookmark(&self, id: &str) -> Result<(), BackendError> {
        let id_filter = format!("eq.{}", id);
        let response = self
            .request(reqwest::Method::DELETE, "rest/v1/bookmarks")
            .query(&[("id", id_filter.as_str())])
            .send()
            .await
            .map_err(network_err)?;
        expect_success(response).await
    }

    async fn open_change_feed(&self, filter: FeedFilter) -> Result<ChangeFeed, BackendError> {
        let url = realtime::socket_url(&self.base_url, &self.anon_key)?;
        let (channel, events) =
            RealtimeChannel::connect(&url, &self.bearer(), &filter, &self.realtime).await?;

        let handle = FeedHandle::generate();
        self.channels().insert(handle.id().to_string(), channel);
        Ok(ChangeFeed { handle, events })
    }

    fn close_change_feed(&self, handle: FeedHandle) {
        match self.channels().remove(handle.id()) {
            Some(mut channel) => {
                debug!(topic = channel.topic(), "closing realtime channel");
                channel.close();
            }
            None => debug!(handle = handle.id(), "close of unknown feed"),
        }
    }

    /// Signs out server-side and always forgets the local session.
    async fn sign_out(&self) -> Result<(), BackendError> {
        if !self.has_session() {
            return Ok(());
        }
        let result = match self
            .request(reqwest::Method::POST, "auth/v1/logout")
            .send()
            .await
        {
            Ok(response) => expect_success(response).await,
            Err(e) => Err(network_err(e)),
        };
        self.store_session(None);
        result
    }
}
