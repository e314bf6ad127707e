use axum::{
    body::Body,
    extract::{Json, State},
    http::StatusCode,
    response::Response,
    routing::post,
    Router,
};
use hyper::header;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    borrow::Cow,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;

const VERIFY_PATH: &str = "/turnstile/v0/siteverify";

/// An in-process stand-in for Cloudflare's Turnstile `siteverify` endpoint.
#[derive(Clone)]
pub struct FakeTurnstile {
    required_secret: Cow<'static, str>,
    required_token: Option<String>,
    return_invalid_response: bool,
    return_token_timeout: bool,
    received: Arc<Mutex<Vec<VerifyRequest>>>,
}

/// A verification request as received by [`FakeTurnstile`].
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct VerifyRequest {
    pub secret: String,
    pub response: String,
    pub remoteip: Option<String>,
}

#[derive(Serialize)]
struct VerifyResponsePayload {
    success: bool,
    #[serde(rename = "error-codes")]
    error_codes: Vec<String>,
}

impl FakeTurnstile {
    pub fn new(required_secret: impl Into<Cow<'static, str>>) -> Self {
        Self {
            required_secret: required_secret.into(),
            required_token: None,
            return_invalid_response: false,
            return_token_timeout: false,
            received: Default::default(),
        }
    }

    pub fn require_token(self, required_token: impl AsRef<str>) -> Self {
        Self {
            required_token: Some(required_token.as_ref().into()),
            ..self
        }
    }

    pub fn return_invalid_response(self) -> Self {
        Self {
            return_invalid_response: true,
            ..self
        }
    }

    pub fn return_token_timeout(self) -> Self {
        Self {
            return_token_timeout: true,
            ..self
        }
    }

    /// Binds an ephemeral port, serves in the background and returns the verify URL.
    pub async fn start(&self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let app = Router::new()
            .route(VERIFY_PATH, post(verify))
            .with_state(self.clone());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{address}{VERIFY_PATH}")
    }

    pub fn received_requests(&self) -> Vec<VerifyRequest> {
        self.received.lock().unwrap().clone()
    }
}

async fn verify(
    State(state): State<FakeTurnstile>,
    Json(payload): Json<VerifyRequest>,
) -> Response<Body> {
    state.received.lock().unwrap().push(payload.clone());
    if state.return_invalid_response {
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("Invalid response"))
            .unwrap()
    } else if state.return_token_timeout {
        json_response(false, &["timeout-or-duplicate"])
    } else if payload.secret != state.required_secret {
        json_response(false, &["invalid-input-secret"])
    } else if payload.response.is_empty() {
        json_response(false, &["missing-input-response"])
    } else if state.required_token.is_some() && Some(payload.response) != state.required_token {
        json_response(false, &["invalid-input-response"])
    } else {
        json_response(true, &[])
    }
}

fn json_response(success: bool, error_codes: &[&str]) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!(VerifyResponsePayload {
                success,
                error_codes: error_codes.iter().map(|code| code.to_string()).collect(),
            })
            .to_string(),
        ))
        .unwrap()
}
