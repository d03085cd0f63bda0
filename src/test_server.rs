//! In-process stand-in for the Firebase REST endpoints used in tests.
//!
//! Serves the Identity Toolkit, Secure Token and Firestore document routes
//! on `127.0.0.1:0`, shaped like the real emulators so the clients can be
//! pointed at it through the emulator-host config.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

pub const API_KEY: &str = "test-key";
pub const PASSWORD: &str = "correct-horse";
pub const EXISTING_EMAIL: &str = "taken@example.test";

const DOCUMENTS_ROOT: &str = "projects/demo-readahead/databases/(default)/documents";

type Reply = (StatusCode, Json<Value>);

#[derive(Clone)]
pub struct MockFirebase {
    /// Firestore documents by path (relative to the documents root), holding
    /// the encoded `fields` object.
    pub documents: Arc<Mutex<HashMap<String, Value>>>,
    /// Number of token refreshes served.
    pub refreshes: Arc<AtomicUsize>,
    /// `Authorization` header of the last Firestore request.
    pub last_authorization: Arc<Mutex<Option<String>>>,
    /// `expiresIn` returned by sign-in and sign-up.
    pub expires_in: Arc<Mutex<String>>,
}

impl Default for MockFirebase {
    fn default() -> Self {
        Self {
            documents: Arc::default(),
            refreshes: Arc::default(),
            last_authorization: Arc::default(),
            expires_in: Arc::new(Mutex::new("3600".to_owned())),
        }
    }
}

impl MockFirebase {
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn document(&self, path: &str) -> Option<Value> {
        self.documents.lock().unwrap().get(path).cloned()
    }

    pub fn put_document(&self, path: &str, fields: Value) {
        self.documents.lock().unwrap().insert(path.to_owned(), fields);
    }

    pub fn authorization(&self) -> Option<String> {
        self.last_authorization.lock().unwrap().clone()
    }
}

/// Serve `mock` and return its origin (`http://127.0.0.1:<port>`).
pub async fn spawn(mock: MockFirebase) -> String {
    let router = Router::new()
        .route("/identitytoolkit.googleapis.com/v1/accounts:signInWithPassword", post(sign_in))
        .route("/identitytoolkit.googleapis.com/v1/accounts:signUp", post(sign_up))
        .route("/securetoken.googleapis.com/v1/token", post(refresh))
        .route(
            &format!("/v1/{DOCUMENTS_ROOT}/{{*path}}"),
            get(get_document).patch(patch_document).delete(delete_document),
        )
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn error(status: StatusCode, message: &str) -> Reply {
    (status, Json(json!({ "error": { "code": status.as_u16(), "message": message } })))
}

fn uid_for(email: &str) -> String {
    format!("uid-{}", email.split('@').next().unwrap_or_default())
}

fn check_key(query: &HashMap<String, String>) -> Option<Reply> {
    (query.get("key").map(String::as_str) != Some(API_KEY)).then(|| error(StatusCode::BAD_REQUEST, "API_KEY_INVALID"))
}

fn session_reply(mock: &MockFirebase, email: &str, generation: usize) -> Reply {
    let expires_in = mock.expires_in.lock().unwrap().clone();
    (
        StatusCode::OK,
        Json(json!({
            "kind": "identitytoolkit#VerifyPasswordResponse",
            "localId": uid_for(email),
            "email": email,
            "displayName": "",
            "idToken": format!("id-token-{generation}"),
            "refreshToken": format!("refresh-{generation}"),
            "expiresIn": expires_in,
        })),
    )
}

async fn sign_in(
    State(mock): State<MockFirebase>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Reply {
    if let Some(reply) = check_key(&query) {
        return reply;
    }
    if body["returnSecureToken"] != json!(true) {
        return error(StatusCode::BAD_REQUEST, "MISSING_RETURN_SECURE_TOKEN");
    }
    if body["password"] != json!(PASSWORD) {
        return error(StatusCode::BAD_REQUEST, "INVALID_PASSWORD");
    }
    let email = body["email"].as_str().unwrap_or_default();
    session_reply(&mock, email, 0)
}

async fn sign_up(
    State(mock): State<MockFirebase>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Reply {
    if let Some(reply) = check_key(&query) {
        return reply;
    }
    let email = body["email"].as_str().unwrap_or_default();
    if email == EXISTING_EMAIL {
        return error(StatusCode::BAD_REQUEST, "EMAIL_EXISTS");
    }
    session_reply(&mock, email, 0)
}

async fn refresh(
    State(mock): State<MockFirebase>,
    Query(query): Query<HashMap<String, String>>,
    Form(form): Form<HashMap<String, String>>,
) -> Reply {
    if let Some(reply) = check_key(&query) {
        return reply;
    }
    if form.get("grant_type").map(String::as_str) != Some("refresh_token") {
        return error(StatusCode::BAD_REQUEST, "INVALID_GRANT_TYPE");
    }
    if !form.get("refresh_token").is_some_and(|t| t.starts_with("refresh-")) {
        return error(StatusCode::BAD_REQUEST, "INVALID_REFRESH_TOKEN");
    }
    let generation = mock.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
    (
        StatusCode::OK,
        Json(json!({
            "access_token": format!("id-token-{generation}"),
            "expires_in": "3600",
            "token_type": "Bearer",
            "refresh_token": format!("refresh-{generation}"),
            "id_token": format!("id-token-{generation}"),
            "user_id": "unused",
            "project_id": "demo-readahead",
        })),
    )
}

fn record_authorization(mock: &MockFirebase, headers: &HeaderMap) {
    let value = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    *mock.last_authorization.lock().unwrap() = value;
}

fn document_reply(path: &str, fields: &Value) -> Reply {
    (StatusCode::OK, Json(json!({ "name": format!("{DOCUMENTS_ROOT}/{path}"), "fields": fields })))
}

async fn get_document(State(mock): State<MockFirebase>, Path(path): Path<String>, headers: HeaderMap) -> Reply {
    record_authorization(&mock, &headers);
    match mock.document(&path) {
        Some(fields) => document_reply(&path, &fields),
        None => error(StatusCode::NOT_FOUND, &format!("Document \"{DOCUMENTS_ROOT}/{path}\" not found.")),
    }
}

async fn patch_document(
    State(mock): State<MockFirebase>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    record_authorization(&mock, &headers);
    let fields = body.get("fields").cloned().unwrap_or_else(|| json!({}));
    mock.put_document(&path, fields.clone());
    document_reply(&path, &fields)
}

async fn delete_document(State(mock): State<MockFirebase>, Path(path): Path<String>, headers: HeaderMap) -> Reply {
    record_authorization(&mock, &headers);
    mock.documents.lock().unwrap().remove(&path);
    (StatusCode::OK, Json(json!({})))
}
