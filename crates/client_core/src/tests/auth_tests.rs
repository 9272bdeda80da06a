use super::*;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use storage::MemoryHandoffStore;
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct ProviderState {
    requests: Arc<Mutex<Vec<(String, Value)>>>,
    missing_apikey: Arc<Mutex<bool>>,
}

impl ProviderState {
    async fn record(&self, name: String, headers: &HeaderMap, body: Value) {
        if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some("anon-key") {
            *self.missing_apikey.lock().await = true;
        }
        self.requests.lock().await.push((name, body));
    }

    async fn body_of(&self, name: &str) -> Option<Value> {
        self.requests
            .lock()
            .await
            .iter()
            .rev()
            .find(|(recorded, _)| recorded == name)
            .map(|(_, body)| body.clone())
    }
}

fn session_json(has_password: bool) -> Value {
    json!({
        "access_token": "access-1",
        "refresh_token": "refresh-1",
        "expires_at": Utc::now().timestamp() + 3600,
        "user": {
            "id": "user-1",
            "email": "ada@example.com",
            "user_metadata": { "has_password": has_password },
        },
    })
}

async fn token(
    State(state): State<ProviderState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let grant_type = query.get("grant_type").cloned().unwrap_or_default();
    state
        .record(format!("token:{grant_type}"), &headers, body.clone())
        .await;
    match grant_type.as_str() {
        "password" if body["password"] == "correct horse" => Ok(Json(session_json(true))),
        "password" => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials",
            })),
        )),
        "pkce" => Ok(Json(session_json(false))),
        _ => Err((StatusCode::BAD_REQUEST, Json(json!({ "msg": "bad grant" })))),
    }
}

async fn signup(
    State(state): State<ProviderState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state.record("signup".into(), &headers, body.clone()).await;
    if body["email"] == "taken@example.com" {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "code": 422, "msg": "User already registered" })),
        ));
    }
    Ok(Json(json!({ "id": "user-2" })))
}

async fn otp(State(state): State<ProviderState>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    state.record("otp".into(), &headers, body).await;
    Json(json!({}))
}

async fn get_user(State(state): State<ProviderState>, headers: HeaderMap) -> Json<Value> {
    state.record("user:get".into(), &headers, Value::Null).await;
    Json(session_json(false)["user"].clone())
}

async fn put_user(
    State(state): State<ProviderState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("user:put".into(), &headers, body).await;
    Json(session_json(true)["user"].clone())
}

async fn logout(State(state): State<ProviderState>, headers: HeaderMap) -> StatusCode {
    state.record("logout".into(), &headers, Value::Null).await;
    StatusCode::NO_CONTENT
}

async fn spawn_provider() -> anyhow::Result<(String, ProviderState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ProviderState::default();
    let app = Router::new()
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/signup", post(signup))
        .route("/auth/v1/otp", post(otp))
        .route("/auth/v1/user", get(get_user).put(put_user))
        .route("/auth/v1/logout", post(logout))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

fn provider(url: &str, store: Arc<dyn HandoffStore>) -> GoTrueAuth {
    GoTrueAuth::new(url, "anon-key", store)
}

#[test]
fn pkce_challenge_matches_s256_reference() {
    assert_eq!(
        pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
        "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
    );
}

#[tokio::test]
async fn password_sign_in_persists_session_for_restore() {
    let (url, state) = spawn_provider().await.expect("spawn provider");
    let store: Arc<dyn HandoffStore> = Arc::new(MemoryHandoffStore::new());
    let auth = provider(&url, store.clone());
    let mut changes = auth.subscribe();

    let session = auth
        .sign_in_with_password("ada@example.com", "correct horse")
        .await
        .expect("sign in");
    assert_eq!(session.access_token, "access-1");
    assert!(session.user.has_password());
    assert!(matches!(changes.recv().await, Ok(SessionChange::SignedIn(_))));
    assert!(!*state.missing_apikey.lock().await);

    let restored = provider(&url, store).restore().await.expect("restored");
    assert_eq!(restored, session);
}

#[tokio::test]
async fn invalid_credentials_are_recognisable() {
    let (url, _state) = spawn_provider().await.expect("spawn provider");
    let auth = provider(&url, Arc::new(MemoryHandoffStore::new()));

    let err = auth
        .sign_in_with_password("ada@example.com", "wrong")
        .await
        .expect_err("must fail");
    assert!(err.is_invalid_credentials(), "{err:?}");
    assert!(auth.session().await.is_none());
}

#[tokio::test]
async fn sign_up_marks_password_and_reports_existing_accounts() {
    let (url, state) = spawn_provider().await.expect("spawn provider");
    let auth = provider(&url, Arc::new(MemoryHandoffStore::new()));

    auth.sign_up("new@example.com", "secret1", "http://localhost:3000/auth/callback")
        .await
        .expect("sign up");
    let body = state.body_of("signup").await.expect("recorded");
    assert_eq!(body["data"]["has_password"], true);

    let err = auth
        .sign_up("taken@example.com", "secret1", "http://localhost:3000/auth/callback")
        .await
        .expect_err("must fail");
    assert!(err.is_already_registered(), "{err:?}");
}

#[tokio::test]
async fn magic_link_exchange_sends_the_verifier_behind_the_challenge() {
    let (url, state) = spawn_provider().await.expect("spawn provider");
    let store: Arc<dyn HandoffStore> = Arc::new(MemoryHandoffStore::new());
    let auth = provider(&url, store.clone());

    auth.sign_in_with_magic_link("ada@example.com", "http://localhost:3000/auth/callback")
        .await
        .expect("magic link");
    let otp = state.body_of("otp").await.expect("otp recorded");
    assert_eq!(otp["code_challenge_method"], "s256");

    let session = auth
        .exchange_code_for_session("code-123")
        .await
        .expect("exchange");
    assert!(!session.user.has_password());

    let exchange = state.body_of("token:pkce").await.expect("exchange recorded");
    assert_eq!(exchange["auth_code"], "code-123");
    let verifier = exchange["code_verifier"].as_str().expect("verifier");
    assert_eq!(otp["code_challenge"], pkce_challenge(verifier));
    assert_eq!(store.get(PKCE_VERIFIER_KEY).await.expect("get"), None);
}

#[tokio::test]
async fn exchange_without_pending_verifier_is_rejected() {
    let (url, _state) = spawn_provider().await.expect("spawn provider");
    let auth = provider(&url, Arc::new(MemoryHandoffStore::new()));

    let err = auth
        .exchange_code_for_session("code-123")
        .await
        .expect_err("must fail");
    assert!(matches!(err, AuthError::Rejected(_)));
}

#[tokio::test]
async fn update_password_refreshes_the_session_user() {
    let (url, state) = spawn_provider().await.expect("spawn provider");
    let auth = provider(&url, Arc::new(MemoryHandoffStore::new()));
    assert_eq!(auth.update_password("secret1").await, Err(AuthError::NoSession));

    auth.sign_in_with_magic_link("ada@example.com", "http://localhost:3000/auth/callback")
        .await
        .expect("magic link");
    auth.exchange_code_for_session("code-1").await.expect("exchange");
    assert!(!auth.user().await.expect("user").has_password());

    let user = auth.update_password("secret1").await.expect("update");
    assert!(user.has_password());
    let session = auth.session().await.expect("session");
    assert!(session.user.has_password());
    let body = state.body_of("user:put").await.expect("recorded");
    assert_eq!(body["password"], "secret1");
    assert_eq!(body["data"]["has_password"], true);
}

#[tokio::test]
async fn sign_out_forgets_the_persisted_session() {
    let (url, _state) = spawn_provider().await.expect("spawn provider");
    let store: Arc<dyn HandoffStore> = Arc::new(MemoryHandoffStore::new());
    let auth = provider(&url, store.clone());
    auth.sign_in_with_password("ada@example.com", "correct horse")
        .await
        .expect("sign in");
    let mut changes = auth.subscribe();

    auth.sign_out().await.expect("sign out");

    assert!(auth.session().await.is_none());
    assert_eq!(store.get(SESSION_KEY).await.expect("get"), None);
    assert_eq!(changes.recv().await.expect("change"), SessionChange::SignedOut);
}

#[tokio::test]
async fn expired_persisted_session_is_not_restored() {
    let store: Arc<dyn HandoffStore> = Arc::new(MemoryHandoffStore::new());
    let mut expired = session_json(true);
    expired["expires_at"] = json!(Utc::now().timestamp() - 10);
    store
        .put(SESSION_KEY, &expired.to_string())
        .await
        .expect("put");

    let auth = provider("http://127.0.0.1:9", store.clone());
    assert!(auth.restore().await.is_none());
    assert_eq!(store.get(SESSION_KEY).await.expect("get"), None);
}
