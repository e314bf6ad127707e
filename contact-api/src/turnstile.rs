use crate::contact::ContactFormError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;
use tracing::warn;

/// Checks anti-automation tokens against Cloudflare Turnstile's `siteverify` endpoint.
#[derive(Clone)]
pub struct TurnstileVerifier {
    client: Client,
    secret: String,
    verify_url: String,
}

impl TurnstileVerifier {
    pub fn new(client: Client, secret: impl Into<String>, verify_url: impl Into<String>) -> Self {
        Self {
            client,
            secret: secret.into(),
            verify_url: verify_url.into(),
        }
    }

    pub async fn verify_token(
        &self,
        token: &str,
        remote_ip: Option<IpAddr>,
    ) -> Result<(), TurnstileError> {
        let remote_ip = remote_ip.map(|ip| ip.to_string());
        let payload = TurnstileVerifyPayload {
            secret: &self.secret,
            response: token,
            remoteip: remote_ip.as_deref(),
        };
        let response_body: TurnstileResponse = self
            .client
            .post(&self.verify_url)
            .json(&payload)
            .send()
            .await
            .map_err(TurnstileError::Transport)?
            .json()
            .await
            .map_err(TurnstileError::InvalidResponse)?;
        if response_body.success {
            Ok(())
        } else {
            warn!(
                "Turnstile verification failed: {:?}",
                response_body.error_codes
            );
            Err(TurnstileError::Rejected(response_body.error_codes))
        }
    }
}

#[derive(Serialize)]
struct TurnstileVerifyPayload<'a> {
    secret: &'a str,
    response: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remoteip: Option<&'a str>,
}

#[derive(Deserialize)]
struct TurnstileResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

#[derive(Debug, Error)]
pub enum TurnstileError {
    #[error("Error contacting Turnstile: {0}")]
    Transport(reqwest::Error),
    #[error("Unreadable response from Turnstile: {0}")]
    InvalidResponse(reqwest::Error),
    #[error("Token rejected: {0:?}")]
    Rejected(Vec<String>),
}

impl TurnstileError {
    pub fn into_contact_form_error(self) -> ContactFormError {
        match self {
            TurnstileError::Rejected(error_codes) => {
                ContactFormError::VerificationFailed(error_codes)
            }
            error => ContactFormError::VerificationUnavailable(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{TurnstileError, TurnstileVerifier};
    use googletest::prelude::*;
    use reqwest::Client;
    use std::net::{IpAddr, Ipv4Addr};
    use test_support::fake_turnstile::{FakeTurnstile, VerifyRequest};

    const SECRET: &str = "turnstile secret";
    const CORRECT_TOKEN: &str = "correct token";

    #[googletest::test]
    #[tokio::test]
    async fn accepts_correct_token_and_forwards_remote_ip() {
        let fake_turnstile = FakeTurnstile::new(SECRET).require_token(CORRECT_TOKEN);
        let subject = TurnstileVerifier::new(Client::new(), SECRET, fake_turnstile.start().await);

        let result = subject
            .verify_token(CORRECT_TOKEN, Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))))
            .await;

        expect_that!(result, ok(anything()));
        expect_that!(
            fake_turnstile.received_requests(),
            elements_are![eq(VerifyRequest {
                secret: SECRET.into(),
                response: CORRECT_TOKEN.into(),
                remoteip: Some("203.0.113.7".into()),
            })]
        );
    }

    #[tokio::test]
    async fn rejects_incorrect_token() -> Result<()> {
        let fake_turnstile = FakeTurnstile::new(SECRET).require_token(CORRECT_TOKEN);
        let subject = TurnstileVerifier::new(Client::new(), SECRET, fake_turnstile.start().await);

        let result = subject.verify_token("incorrect token", None).await;

        verify_that!(
            result,
            err(matches_pattern!(TurnstileError::Rejected(elements_are![eq(
                "invalid-input-response"
            )])))
        )
    }

    #[tokio::test]
    async fn rejects_expired_token() -> Result<()> {
        let fake_turnstile = FakeTurnstile::new(SECRET).return_token_timeout();
        let subject = TurnstileVerifier::new(Client::new(), SECRET, fake_turnstile.start().await);

        let result = subject.verify_token(CORRECT_TOKEN, None).await;

        verify_that!(
            result,
            err(matches_pattern!(TurnstileError::Rejected(anything())))
        )
    }

    #[tokio::test]
    async fn reports_unreadable_response() -> Result<()> {
        let fake_turnstile = FakeTurnstile::new(SECRET).return_invalid_response();
        let subject = TurnstileVerifier::new(Client::new(), SECRET, fake_turnstile.start().await);

        let result = subject.verify_token(CORRECT_TOKEN, None).await;

        verify_that!(
            result,
            err(matches_pattern!(TurnstileError::InvalidResponse(anything())))
        )
    }

    #[tokio::test]
    async fn reports_unreachable_endpoint() -> Result<()> {
        let subject = TurnstileVerifier::new(
            Client::new(),
            SECRET,
            "http://nonexistent.host.invalid/siteverify",
        );

        let result = subject.verify_token(CORRECT_TOKEN, None).await;

        verify_that!(
            result,
            err(matches_pattern!(TurnstileError::Transport(anything())))
        )
    }
}
