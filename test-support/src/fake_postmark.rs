use axum::{
    body::Body,
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::post,
    Router,
};
use hyper::header;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    borrow::Cow,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;

const EMAIL_PATH: &str = "/email";
const SERVER_TOKEN_HEADER: &str = "X-Postmark-Server-Token";

/// An in-process stand-in for Postmark's single-email endpoint which records what it receives.
#[derive(Clone)]
pub struct FakePostmark {
    required_token: Cow<'static, str>,
    failing_recipients: Vec<String>,
    reject_all: bool,
    received: Arc<Mutex<Vec<ReceivedEmail>>>,
}

/// An email accepted by [`FakePostmark`], together with the token it was sent with.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ReceivedEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub message_stream: String,
    pub reply_to: Option<String>,
    #[serde(skip)]
    pub server_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkResponsePayload<'a> {
    to: &'a str,
    #[serde(rename = "MessageID")]
    message_id: &'a str,
    error_code: u32,
    message: &'a str,
}

impl FakePostmark {
    pub fn new(required_token: impl Into<Cow<'static, str>>) -> Self {
        Self {
            required_token: required_token.into(),
            failing_recipients: vec![],
            reject_all: false,
            received: Default::default(),
        }
    }

    /// Answers with an `Invalid 'To' address` error for any email whose `To` contains
    /// `recipient`.
    pub fn fail_for_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.failing_recipients.push(recipient.into());
        self
    }

    pub fn reject_all(self) -> Self {
        Self {
            reject_all: true,
            ..self
        }
    }

    /// Binds an ephemeral port, serves in the background and returns the email endpoint URL.
    pub async fn start(&self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let app = Router::new()
            .route(EMAIL_PATH, post(send_email))
            .with_state(self.clone());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{address}{EMAIL_PATH}")
    }

    /// All emails delivered so far, in order of arrival. Emails which were answered with an error
    /// are not included.
    pub fn received_emails(&self) -> Vec<ReceivedEmail> {
        self.received.lock().unwrap().clone()
    }
}

async fn send_email(
    State(state): State<FakePostmark>,
    headers: HeaderMap,
    Json(mut email): Json<ReceivedEmail>,
) -> Response<Body> {
    debug!("Got email to {} with subject {}", email.to, email.subject);
    let token = headers
        .get(SERVER_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if token != state.required_token {
        return error_response(
            StatusCode::UNAUTHORIZED,
            10,
            "Request does not contain a valid Server token.",
        );
    }
    if state.reject_all
        || state
            .failing_recipients
            .iter()
            .any(|recipient| email.to.contains(recipient.as_str()))
    {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            300,
            "Invalid 'To' address.",
        );
    }
    email.server_token = token.into();
    let body = json!(PostmarkResponsePayload {
        to: &email.to,
        message_id: "b7bc2f4a-e38e-4336-af7d-e6c392c2f817",
        error_code: 0,
        message: "OK",
    })
    .to_string();
    state.received.lock().unwrap().push(email);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn error_response(status: StatusCode, error_code: u32, message: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!(PostmarkResponsePayload {
                to: "",
                message_id: "",
                error_code,
                message,
            })
            .to_string(),
        ))
        .unwrap()
}
