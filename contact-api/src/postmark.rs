use crate::email::Email;
use reqwest::{header::ACCEPT, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const SERVER_TOKEN_HEADER: &str = "X-Postmark-Server-Token";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends single emails through Postmark's HTTP API.
#[derive(Clone)]
pub struct PostmarkClient {
    client: Client,
    api_url: String,
}

#[derive(Debug, Error)]
pub enum PostmarkError {
    #[error("Failed to send request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Postmark error {error_code} (HTTP {status}): {message}")]
    Rejected {
        status: StatusCode,
        error_code: i64,
        message: String,
    },
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct PostmarkResponse {
    error_code: i64,
    message: String,
}

impl PostmarkClient {
    pub fn new(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }

    pub async fn send(&self, token: &str, email: &Email) -> Result<(), PostmarkError> {
        let response = self
            .client
            .post(&self.api_url)
            .header(ACCEPT, "application/json")
            .header(SERVER_TOKEN_HEADER, token)
            .timeout(SEND_TIMEOUT)
            .json(email)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        // An unreadable error body still fails the send, just without Postmark's details.
        let PostmarkResponse {
            error_code,
            message,
        } = response.json::<PostmarkResponse>().await.unwrap_or_default();
        Err(PostmarkError::Rejected {
            status,
            error_code,
            message,
        })
    }
}
