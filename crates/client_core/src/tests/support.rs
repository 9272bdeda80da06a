use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use axum::{
    extract::{Multipart, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use storage::MemoryHandoffStore;
use tokio::{
    net::TcpListener,
    sync::{broadcast, Mutex},
};

use crate::{
    api::PresentationClient,
    auth::{AuthError, AuthProvider, AuthSession, AuthUser, SessionChange},
    context::HandoffContext,
    workflow::{Workflow, WorkflowConfig},
};

pub const TOKEN: &str = "token-abc";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub endpoint: String,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone, Default)]
pub struct ApiServerState {
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
    failures: Arc<Mutex<HashMap<String, u16>>>,
}

impl ApiServerState {
    pub async fn fail(&self, endpoint: &str, status: u16) {
        self.failures
            .lock()
            .await
            .insert(endpoint.to_string(), status);
    }

    pub async fn endpoints(&self) -> Vec<String> {
        self.requests
            .lock()
            .await
            .iter()
            .map(|request| request.endpoint.clone())
            .collect()
    }

    pub async fn last(&self, endpoint: &str) -> Option<RecordedRequest> {
        self.requests
            .lock()
            .await
            .iter()
            .rev()
            .find(|request| request.endpoint == endpoint)
            .cloned()
    }

    async fn record(
        &self,
        endpoint: &str,
        headers: &HeaderMap,
        body: Value,
    ) -> Result<(), (StatusCode, String)> {
        let authorization = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.requests.lock().await.push(RecordedRequest {
            endpoint: endpoint.to_string(),
            authorization,
            body,
        });
        match self.failures.lock().await.get(endpoint) {
            Some(status) => Err((
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                format!("{endpoint} failed"),
            )),
            None => Ok(()),
        }
    }
}

type Reply = Result<Json<Value>, (StatusCode, String)>;

pub fn outline_json() -> Value {
    json!([
        { "title": "Cells", "subtopics": ["Membranes", "Nucleus"] },
        { "title": "Energy", "subtopics": ["ATP"] },
    ])
}

fn slide_json(index: u32) -> Value {
    json!({
        "slideIndex": index,
        "title": format!("Slide {index}"),
        "slide_png_url": format!("http://localhost:8000/pngs/{index}.png"),
        "audio_url": format!("http://localhost:8000/audio/{index}.mp3"),
    })
}

async fn upload_materials(
    State(state): State<ApiServerState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Reply {
    let mut files = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().unwrap_or_default().to_string();
        let size = field.bytes().await.map(|bytes| bytes.len()).unwrap_or(0);
        files.push(json!({ "field": name, "filename": filename, "size": size }));
    }
    let keys: Vec<String> = files
        .iter()
        .map(|file| format!("materials/{}", file["filename"].as_str().unwrap_or("")))
        .collect();
    state
        .record("upload_materials", &headers, json!({ "files": files }))
        .await?;
    Ok(Json(json!({ "material_keys": keys })))
}

async fn analyze_materials(
    State(state): State<ApiServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    state.record("analyze_materials", &headers, body).await?;
    Ok(Json(json!({ "job_id": "job-42", "outline": outline_json() })))
}

async fn topic_outline(
    State(state): State<ApiServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    state.record("topic_outline", &headers, body).await?;
    Ok(Json(json!({ "job_id": "job-7", "outline": outline_json() })))
}

async fn build_presentation(
    State(state): State<ApiServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let job_id = body["job_id"].clone();
    state.record("build_presentation", &headers, body).await?;
    // Deliberately out of order.
    Ok(Json(json!({
        "job_id": job_id,
        "slides": [slide_json(1), slide_json(0), slide_json(2)],
    })))
}

async fn export_video(
    State(state): State<ApiServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let job_id = body["job_id"].as_str().unwrap_or_default().to_string();
    state.record("export_video", &headers, body).await?;
    Ok(Json(json!({
        "video_url": format!("http://localhost:8000/videos/{job_id}.mp4"),
    })))
}

pub async fn spawn_api_server() -> anyhow::Result<(String, ApiServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ApiServerState::default();
    let app = Router::new()
        .route("/presentation/upload_materials", post(upload_materials))
        .route("/presentation/analyze_materials", post(analyze_materials))
        .route("/presentation/topic_outline", post(topic_outline))
        .route("/presentation/build_presentation", post(build_presentation))
        .route("/presentation/export_video", post(export_video))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

pub fn user(has_password: bool) -> AuthUser {
    AuthUser {
        id: "user-1".to_string(),
        email: Some("ada@example.com".to_string()),
        user_metadata: json!({ "has_password": has_password }),
    }
}

pub fn session(has_password: bool) -> AuthSession {
    AuthSession {
        access_token: TOKEN.to_string(),
        refresh_token: Some("refresh-abc".to_string()),
        expires_at: None,
        user: user(has_password),
    }
}

/// In-memory auth provider with scripted outcomes.
pub struct StaticAuth {
    session: Mutex<Option<AuthSession>>,
    has_password: bool,
    error: Option<AuthError>,
    pub calls: Mutex<Vec<String>>,
    events: broadcast::Sender<SessionChange>,
}

impl StaticAuth {
    fn build(session: Option<AuthSession>, has_password: bool, error: Option<AuthError>) -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            session: Mutex::new(session),
            has_password,
            error,
            calls: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn signed_in() -> Self {
        Self::build(Some(session(true)), true, None)
    }

    pub fn signed_out() -> Self {
        Self::build(None, true, None)
    }

    /// Signed out; every provider call fails with `error`.
    pub fn failing(error: AuthError) -> Self {
        Self::build(None, true, Some(error))
    }

    /// Signed out; a code exchange yields a user without a password.
    pub fn magic_link_user() -> Self {
        Self::build(None, false, None)
    }

    async fn call(&self, name: &str) -> Result<(), AuthError> {
        self.calls.lock().await.push(name.to_string());
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn session(&self) -> Option<AuthSession> {
        self.session.lock().await.clone()
    }

    async fn sign_in_with_password(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<AuthSession, AuthError> {
        self.call("sign_in_with_password").await?;
        let session = session(self.has_password);
        *self.session.lock().await = Some(session.clone());
        Ok(session)
    }

    async fn sign_up(&self, _email: &str, _password: &str, redirect_to: &str) -> Result<(), AuthError> {
        self.call(&format!("sign_up {redirect_to}")).await
    }

    async fn sign_in_with_magic_link(&self, _email: &str, redirect_to: &str) -> Result<(), AuthError> {
        self.call(&format!("magic_link {redirect_to}")).await
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<AuthSession, AuthError> {
        self.call(&format!("exchange {code}")).await?;
        let session = session(self.has_password);
        *self.session.lock().await = Some(session.clone());
        Ok(session)
    }

    async fn user(&self) -> Result<AuthUser, AuthError> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.user.clone())
            .ok_or(AuthError::NoSession)
    }

    async fn update_password(&self, _password: &str) -> Result<AuthUser, AuthError> {
        self.call("update_password").await?;
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(AuthError::NoSession)?;
        session.user = user(true);
        Ok(session.user.clone())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.call("sign_out").await?;
        *self.session.lock().await = None;
        let _ = self.events.send(SessionChange::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }
}

pub fn workflow(api_url: Option<String>, auth: Arc<StaticAuth>) -> Workflow {
    let context = HandoffContext::new(Arc::new(MemoryHandoffStore::new()));
    Workflow::new(
        Arc::new(PresentationClient::new(api_url)),
        auth,
        context,
        WorkflowConfig::default(),
    )
}
