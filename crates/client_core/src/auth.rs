//! Identity provider access: sessions, sign-in flows and session-change notifications.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use storage::HandoffStore;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

const SESSION_KEY: &str = "auth.session";
const PKCE_VERIFIER_KEY: &str = "auth.pkce_verifier";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

impl AuthUser {
    /// Users created through a magic link have no password until they set one.
    pub fn has_password(&self) -> bool {
        self.user_metadata
            .get("has_password")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= Utc::now().timestamp())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    SignedIn(AuthSession),
    UserUpdated(AuthUser),
    SignedOut,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    Rejected(String),
    #[error("no active session")]
    NoSession,
    #[error("auth provider unavailable: {0}")]
    Unavailable(String),
}

impl AuthError {
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, Self::Rejected(msg) if msg.contains("Invalid login credentials"))
    }

    pub fn is_already_registered(&self) -> bool {
        matches!(self, Self::Rejected(msg) if msg.contains("User already registered"))
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn session(&self) -> Option<AuthSession>;
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<AuthSession, AuthError>;
    async fn sign_up(&self, email: &str, password: &str, redirect_to: &str)
        -> Result<(), AuthError>;
    async fn sign_in_with_magic_link(&self, email: &str, redirect_to: &str)
        -> Result<(), AuthError>;
    async fn exchange_code_for_session(&self, code: &str) -> Result<AuthSession, AuthError>;
    async fn user(&self) -> Result<AuthUser, AuthError>;
    async fn update_password(&self, password: &str) -> Result<AuthUser, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    fn subscribe(&self) -> broadcast::Receiver<SessionChange>;
}

pub struct MissingAuthProvider {
    events: broadcast::Sender<SessionChange>,
}

impl Default for MissingAuthProvider {
    fn default() -> Self {
        let (events, _) = broadcast::channel(1);
        Self { events }
    }
}

#[async_trait]
impl AuthProvider for MissingAuthProvider {
    async fn session(&self) -> Option<AuthSession> {
        None
    }

    async fn sign_in_with_password(&self, _email: &str, _password: &str) -> Result<AuthSession, AuthError> {
        Err(AuthError::Unavailable("auth provider is not configured".into()))
    }

    async fn sign_up(&self, _email: &str, _password: &str, _redirect_to: &str) -> Result<(), AuthError> {
        Err(AuthError::Unavailable("auth provider is not configured".into()))
    }

    async fn sign_in_with_magic_link(&self, _email: &str, _redirect_to: &str) -> Result<(), AuthError> {
        Err(AuthError::Unavailable("auth provider is not configured".into()))
    }

    async fn exchange_code_for_session(&self, _code: &str) -> Result<AuthSession, AuthError> {
        Err(AuthError::Unavailable("auth provider is not configured".into()))
    }

    async fn user(&self) -> Result<AuthUser, AuthError> {
        Err(AuthError::NoSession)
    }

    async fn update_password(&self, _password: &str) -> Result<AuthUser, AuthError> {
        Err(AuthError::NoSession)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for a GoTrue-compatible identity provider (`/auth/v1/...`).
///
/// The current session and the PKCE verifier of an outstanding magic link
/// are kept in the handoff store so they survive across separate runs.
pub struct GoTrueAuth {
    http: Client,
    base_url: String,
    anon_key: String,
    store: Arc<dyn HandoffStore>,
    session: RwLock<Option<AuthSession>>,
    pkce_lock: Mutex<()>,
    events: broadcast::Sender<SessionChange>,
}

impl GoTrueAuth {
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        store: Arc<dyn HandoffStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            store,
            session: RwLock::new(None),
            pkce_lock: Mutex::new(()),
            events,
        }
    }

    /// Loads a previously persisted session. Unreadable or expired sessions are dropped.
    pub async fn restore(&self) -> Option<AuthSession> {
        let raw = match self.store.get(SESSION_KEY).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!("failed to read persisted session: {err:#}");
                return None;
            }
        };
        match serde_json::from_str::<AuthSession>(&raw) {
            Ok(session) if !session.is_expired() => {
                *self.session.write().await = Some(session.clone());
                Some(session)
            }
            Ok(_) => {
                info!("persisted session expired");
                let _ = self.store.remove(SESSION_KEY).await;
                None
            }
            Err(err) => {
                warn!("discarding unreadable persisted session: {err}");
                let _ = self.store.remove(SESSION_KEY).await;
                None
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", &self.anon_key)
    }

    async fn access_token(&self) -> Result<String, AuthError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.access_token.clone())
            .ok_or(AuthError::NoSession)
    }

    async fn store_session(&self, session: AuthSession) -> AuthSession {
        match serde_json::to_string(&session) {
            Ok(raw) => {
                if let Err(err) = self.store.put(SESSION_KEY, &raw).await {
                    warn!("failed to persist session: {err:#}");
                }
            }
            Err(err) => warn!("failed to encode session: {err}"),
        }
        *self.session.write().await = Some(session.clone());
        let _ = self.events.send(SessionChange::SignedIn(session.clone()));
        session
    }

    async fn drop_session(&self) {
        *self.session.write().await = None;
        if let Err(err) = self.store.remove(SESSION_KEY).await {
            warn!("failed to remove persisted session: {err:#}");
        }
        let _ = self.events.send(SessionChange::SignedOut);
    }

    /// Creates a fresh PKCE verifier, remembers it, and returns its S256 challenge.
    async fn start_pkce(&self) -> Result<String, AuthError> {
        let _guard = self.pkce_lock.lock().await;
        let verifier = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        self.store
            .put(PKCE_VERIFIER_KEY, &verifier)
            .await
            .map_err(|err| AuthError::Unavailable(format!("{err:#}")))?;
        Ok(pkce_challenge(&verifier))
    }
}

pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

async fn provider_result(response: Response) -> Result<Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ProviderErrorBody>(&body)
        .ok()
        .and_then(|parsed| {
            parsed
                .msg
                .or(parsed.message)
                .or(parsed.error_description)
                .or(parsed.error)
        })
        .unwrap_or_else(|| format!("auth provider returned {status}"));
    if status.is_server_error() {
        Err(AuthError::Unavailable(message))
    } else {
        Err(AuthError::Rejected(message))
    }
}

#[async_trait]
impl AuthProvider for GoTrueAuth {
    async fn session(&self) -> Option<AuthSession> {
        let session = self.session.read().await.clone()?;
        if session.is_expired() {
            return None;
        }
        Some(session)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let response = self
            .request(self.http.post(self.url("token")))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let session: AuthSession = provider_result(response).await?.json().await?;
        info!(user_id = %session.user.id, "signed in with password");
        Ok(self.store_session(session).await)
    }

    async fn sign_up(&self, email: &str, password: &str, redirect_to: &str) -> Result<(), AuthError> {
        let response = self
            .request(self.http.post(self.url("signup")))
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "has_password": true },
            }))
            .send()
            .await?;
        provider_result(response).await?;
        info!("sign-up submitted; waiting for email verification");
        Ok(())
    }

    async fn sign_in_with_magic_link(&self, email: &str, redirect_to: &str) -> Result<(), AuthError> {
        let challenge = self.start_pkce().await?;
        let response = self
            .request(self.http.post(self.url("otp")))
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({
                "email": email,
                "create_user": true,
                "code_challenge": challenge,
                "code_challenge_method": "s256",
            }))
            .send()
            .await?;
        provider_result(response).await?;
        info!("magic link requested");
        Ok(())
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<AuthSession, AuthError> {
        let verifier = {
            let _guard = self.pkce_lock.lock().await;
            self.store
                .get(PKCE_VERIFIER_KEY)
                .await
                .map_err(|err| AuthError::Unavailable(format!("{err:#}")))?
                .ok_or_else(|| AuthError::Rejected("no sign-in is pending for this code".into()))?
        };
        let response = self
            .request(self.http.post(self.url("token")))
            .query(&[("grant_type", "pkce")])
            .json(&json!({ "auth_code": code, "code_verifier": verifier }))
            .send()
            .await?;
        let session: AuthSession = provider_result(response).await?.json().await?;
        let _ = self.store.remove(PKCE_VERIFIER_KEY).await;
        Ok(self.store_session(session).await)
    }

    async fn user(&self) -> Result<AuthUser, AuthError> {
        let token = self.access_token().await?;
        let response = self
            .request(self.http.get(self.url("user")))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(provider_result(response).await?.json().await?)
    }

    async fn update_password(&self, password: &str) -> Result<AuthUser, AuthError> {
        let token = self.access_token().await?;
        let response = self
            .request(self.http.put(self.url("user")))
            .bearer_auth(token)
            .json(&json!({ "password": password, "data": { "has_password": true } }))
            .send()
            .await?;
        let user: AuthUser = provider_result(response).await?.json().await?;

        let updated = {
            let mut guard = self.session.write().await;
            guard.as_mut().map(|session| {
                session.user = user.clone();
                session.clone()
            })
        };
        if let Some(session) = updated {
            if let Ok(raw) = serde_json::to_string(&session) {
                if let Err(err) = self.store.put(SESSION_KEY, &raw).await {
                    warn!("failed to persist updated session: {err:#}");
                }
            }
        }
        let _ = self.events.send(SessionChange::UserUpdated(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let token = match self.access_token().await {
            Ok(token) => token,
            Err(_) => {
                self.drop_session().await;
                return Ok(());
            }
        };
        let response = self
            .request(self.http.post(self.url("logout")))
            .bearer_auth(token)
            .send()
            .await?;
        provider_result(response).await?;
        self.drop_session().await;
        info!("signed out");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
