//! Mock PostgREST + auth server for exercising `RestBackend` over real HTTP.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{Request, Response, StatusCode};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub const ANON_KEY: &str = "anon-key";
pub const USER_TOKEN: &str = "user-token";
pub const USER_ID: &str = "5f0c6c1e-8a51-4c4e-a0a4-1bb5b1a2f0aa";
pub const PASSWORD: &str = "secret1";
pub const PENDING_USER_ID: &str = "0b7e3a52-39d4-4f0e-9a1c-6d2f4e8b9c10";
pub const UNCONFIRMED_DOMAIN: &str = "@confirm.plotpot.app";

/// A captured request for assertions.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub authorization: Option<String>,
    pub apikey: Option<String>,
    pub prefer: Option<String>,
    pub body: Value,
}

impl CapturedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

pub struct MockPostgrest {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockPostgrest {
    pub async fn start() -> Self {
        let state = MockState::default();
        let requests = state.requests.clone();

        let app = Router::new().fallback(handle).with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn last_request(&self) -> CapturedRequest {
        self.requests
            .lock()
            .await
            .last()
            .cloned()
            .expect("no request captured")
    }
}

async fn handle(State(state): State<MockState>, req: Request<Body>) -> Response<Body> {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let captured = CapturedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map(|q| q.0)
            .unwrap_or_default(),
        authorization: header("authorization"),
        apikey: header("apikey"),
        prefer: header("prefer"),
        body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
    };
    state.requests.lock().await.push(captured.clone());

    route(&captured).await
}

async fn route(req: &CapturedRequest) -> Response<Body> {
    let bearer = format!("Bearer {}", USER_TOKEN);
    let signed_in = req.authorization.as_deref() == Some(bearer.as_str());

    match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/auth/v1/token") => {
            if req.body["password"] == json!(PASSWORD) {
                json_response(StatusCode::OK, session(&req.body["email"]))
            } else {
                json_response(
                    StatusCode::BAD_REQUEST,
                    json!({ "code": 400, "error_code": "invalid_credentials", "msg": "Invalid login credentials" }),
                )
            }
        }
        // Addresses on this domain need email confirmation: no session yet.
        ("POST", "/auth/v1/signup") if is_unconfirmed(&req.body["email"]) => json_response(
            StatusCode::OK,
            json!({
                "id": PENDING_USER_ID,
                "email": req.body["email"],
                "confirmation_sent_at": "2025-03-01T08:15:00+00:00"
            }),
        ),
        ("POST", "/auth/v1/signup") => json_response(StatusCode::OK, session(&req.body["email"])),
        ("POST", "/auth/v1/logout") => Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Body::empty())
            .unwrap(),
        ("GET", "/rest/v1/stories") => json_response(
            StatusCode::OK,
            json!([story(1, "Fog", false), story(2, "Ash", false)]),
        ),
        ("POST", "/rest/v1/stories") if !signed_in => json_response(
            StatusCode::UNAUTHORIZED,
            json!({ "code": "42501", "message": "new row violates row-level security policy for table \"stories\"" }),
        ),
        ("POST", "/rest/v1/stories") => {
            let mut row = req.body.clone();
            row["id"] = json!(42);
            row["created_at"] = json!("2025-03-01T08:15:00+00:00");
            json_response(StatusCode::CREATED, json!([row]))
        }
        ("PATCH", "/rest/v1/stories") => {
            let mut row = story(42, "Fog", false);
            if let Some(done) = req.body.get("is_completed") {
                row["is_completed"] = done.clone();
            }
            json_response(StatusCode::OK, json!([row]))
        }
        ("GET", "/rest/v1/challenges") => Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Body::from("boom"))
            .unwrap(),
        ("GET", "/rest/v1/animations") => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            json_response(StatusCode::OK, json!([]))
        }
        _ => json_response(StatusCode::NOT_FOUND, json!({ "message": "no route" })),
    }
}

fn is_unconfirmed(email: &Value) -> bool {
    email.as_str().is_some_and(|e| e.ends_with(UNCONFIRMED_DOMAIN))
}

fn session(email: &Value) -> Value {
    json!({
        "access_token": USER_TOKEN,
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": "refresh",
        "user": { "id": USER_ID, "email": email }
    })
}

fn story(id: i64, title: &str, completed: bool) -> Value {
    json!({
        "id": id,
        "title": title,
        "description": null,
        "created_by": USER_ID,
        "created_at": "2025-03-01T08:15:00+00:00",
        "is_completed": completed,
        "total_sentences": 10
    })
}

fn json_response(status: StatusCode, body: Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
