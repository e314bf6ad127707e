use crate::{
    config::{Config, Delivery, DeliveryConfigError, PostmarkConfig},
    email::{self, EmailError},
    postmark::{PostmarkClient, PostmarkError},
    turnstile::{TurnstileError, TurnstileVerifier},
    validation::{ContactForm, FieldError, ValidatedContactForm, ValidationErrors},
};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use chrono_tz::America::Los_Angeles;
use reqwest::Client;
use serde::Serialize;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use thiserror::Error;
use tracing::{error, info, warn};

const SUCCESS_MESSAGE: &str = "Message sent successfully";
const TIMESTAMP_FORMAT: &str = "%A, %B %-d, %Y at %-I:%M %p %Z";

pub fn router(handler: Arc<ContactFormHandler>) -> Router<()> {
    Router::new()
        .route("/api/contact", post(submit).options(crate::accept_options))
        .with_state(handler)
}

async fn submit(
    State(handler): State<Arc<ContactFormHandler>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> Response {
    let remote_ip = connect_info.map(|ConnectInfo(address)| address.ip());
    handler.handle(&body, remote_ip).await
}

/// Takes a contact form submission from decoding through to delivery of both emails.
pub struct ContactFormHandler {
    postmark_config: PostmarkConfig,
    postmark: PostmarkClient,
    turnstile_verifier: Option<TurnstileVerifier>,
}

impl ContactFormHandler {
    pub fn new(config: &Config, client: Client) -> Self {
        let turnstile_verifier = config.turnstile.secret.as_ref().map(|secret| {
            TurnstileVerifier::new(client.clone(), secret, &config.turnstile.verify_url)
        });
        Self {
            postmark_config: config.postmark.clone(),
            postmark: PostmarkClient::new(client, &config.postmark.api_url),
            turnstile_verifier,
        }
    }

    pub async fn handle(&self, body: &[u8], remote_ip: Option<IpAddr>) -> Response {
        match self.process_message(body, remote_ip).await {
            Ok(Submission::Accepted { first_name, email }) => (
                StatusCode::OK,
                Json(ContactResponse {
                    success: true,
                    message: Some(SUCCESS_MESSAGE),
                    data: Some(ContactData { first_name, email }),
                    ..Default::default()
                }),
            )
                .into_response(),
            // Looks like any other success so that bots learn nothing.
            Ok(Submission::Discarded) => (
                StatusCode::OK,
                Json(ContactResponse {
                    success: true,
                    message: Some(SUCCESS_MESSAGE),
                    ..Default::default()
                }),
            )
                .into_response(),
            Err(error) => {
                error.log(remote_ip);
                error.into_response()
            }
        }
    }

    async fn process_message(
        &self,
        body: &[u8],
        remote_ip: Option<IpAddr>,
    ) -> Result<Submission, ContactFormError> {
        let form: ContactForm = serde_json::from_slice(body)?;
        if form.is_honeypot_filled() {
            warn!(?remote_ip, "Honeypot triggered - likely bot submission");
            return Ok(Submission::Discarded);
        }
        self.verify_token(&form.turnstile_token, remote_ip).await?;

        let form = form.trimmed();
        let delivery = self.postmark_config.delivery()?;
        let validated_form = form.validate().map_err(ContactFormError::ValidationFailed)?;

        let submitted_at = submission_timestamp(Utc::now());
        let notification = email::lead_notification(
            &validated_form,
            &delivery,
            &self.postmark_config.message_stream,
            &submitted_at,
        )?;
        self.postmark.send(&delivery.token, &notification).await?;

        if let Err(error) = self.send_thank_you(&validated_form, &delivery).await {
            warn!("Failed to send thank you email: {error}");
        }

        info!(
            "Contact form submitted successfully: {} {} <{}>",
            validated_form.first_name, validated_form.last_name, validated_form.email
        );
        Ok(Submission::Accepted {
            first_name: validated_form.first_name.into(),
            email: validated_form.email.into(),
        })
    }

    async fn verify_token(
        &self,
        token: &str,
        remote_ip: Option<IpAddr>,
    ) -> Result<(), ContactFormError> {
        let Some(verifier) = &self.turnstile_verifier else {
            return Ok(());
        };
        if token.is_empty() {
            return Err(ContactFormError::MissingToken);
        }
        verifier
            .verify_token(token, remote_ip)
            .await
            .map_err(TurnstileError::into_contact_form_error)
    }

    async fn send_thank_you(
        &self,
        form: &ValidatedContactForm<'_>,
        delivery: &Delivery,
    ) -> Result<(), ContactFormError> {
        let email = email::thank_you(form, delivery, &self.postmark_config.message_stream)?;
        self.postmark.send(&delivery.token, &email).await?;
        Ok(())
    }
}

/// Leads are stamped in the business's own time zone.
fn submission_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Los_Angeles)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

enum Submission {
    Accepted { first_name: String, email: String },
    /// Caught by the honeypot; nothing was sent.
    Discarded,
}

#[derive(Serialize, Default)]
struct ContactResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<ContactData>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContactData {
    first_name: String,
    email: String,
}

#[derive(Debug, Error)]
pub enum ContactFormError {
    #[error("Failed to decode request body: {0}")]
    MalformedBody(#[from] serde_json::Error),
    #[error("Missing Turnstile token")]
    MissingToken,
    #[error("Turnstile rejected the token: {0:?}")]
    VerificationFailed(Vec<String>),
    #[error("Turnstile verification error: {0}")]
    VerificationUnavailable(String),
    #[error("Validation failed: {:?}", .0.errors())]
    ValidationFailed(ValidationErrors),
    #[error("Server configuration error: {0}")]
    Misconfigured(#[from] DeliveryConfigError),
    #[error("Failed to build contact form email: {0}")]
    Compose(#[from] EmailError),
    #[error("Failed to send contact form email: {0}")]
    Send(#[from] PostmarkError),
}

impl ContactFormError {
    fn status(&self) -> StatusCode {
        match self {
            ContactFormError::MalformedBody(_)
            | ContactFormError::MissingToken
            | ContactFormError::VerificationFailed(_)
            | ContactFormError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            ContactFormError::VerificationUnavailable(_)
            | ContactFormError::Misconfigured(_)
            | ContactFormError::Compose(_)
            | ContactFormError::Send(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn log(&self, remote_ip: Option<IpAddr>) {
        if self.status().is_server_error() {
            error!(?remote_ip, "Internal error handling contact form: {}", self);
        } else {
            warn!(?remote_ip, "Client error handling contact form: {}", self);
        }
    }

    fn into_response(self) -> Response {
        let status = self.status();
        let (error, errors) = match self {
            ContactFormError::MalformedBody(_) => ("Invalid request body", None),
            ContactFormError::MissingToken => ("Please complete the security check", None),
            ContactFormError::VerificationFailed(_) => {
                ("Security check failed. Please try again.", None)
            }
            ContactFormError::VerificationUnavailable(_) => {
                ("Security verification failed. Please try again.", None)
            }
            ContactFormError::ValidationFailed(errors) => {
                ("Validation failed", Some(errors.into_errors()))
            }
            ContactFormError::Misconfigured(_) => ("Server configuration error", None),
            ContactFormError::Compose(_) | ContactFormError::Send(_) => {
                ("Failed to send message. Please try again.", None)
            }
        };
        (
            status,
            Json(ContactResponse {
                success: false,
                error: Some(error),
                errors,
                ..Default::default()
            }),
        )
            .into_response()
    }
}
