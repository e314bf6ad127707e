use anyhow::Context;
use axum::http::HeaderValue;
use lettre::message::Mailbox;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:1313";
pub const DEFAULT_MESSAGE_STREAM: &str = "outbound";
pub const POSTMARK_API_URL: &str = "https://api.postmarkapp.com/email";
pub const TURNSTILE_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Runtime configuration of the service, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub postmark: PostmarkConfig,
    pub turnstile: TurnstileConfig,
}

#[derive(Clone, Debug)]
pub struct PostmarkConfig {
    pub token: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub message_stream: String,
    pub api_url: String,
}

#[derive(Clone, Debug)]
pub struct TurnstileConfig {
    /// When absent, submissions are accepted without bot verification.
    pub secret: Option<String>,
    pub verify_url: String,
}

/// Everything needed to deliver mail, present only when the configuration is complete.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub token: String,
    pub from: Mailbox,
    pub to: Mailbox,
}

#[derive(Debug, Error, PartialEq)]
pub enum DeliveryConfigError {
    #[error("missing email configuration: token={token}, to={to}, from={from}")]
    Missing { token: bool, to: bool, from: bool },
    #[error("invalid mailbox in {variable}: {value}")]
    InvalidMailbox {
        variable: &'static str,
        value: String,
    },
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = match env_var("PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {port}"))?,
            None => DEFAULT_PORT,
        };
        let allowed_origins =
            parse_origins(&env_var("ALLOWED_ORIGINS").unwrap_or(DEFAULT_ALLOWED_ORIGINS.into()));
        Ok(Self {
            port,
            allowed_origins,
            postmark: PostmarkConfig {
                token: env_var("POSTMARK_TOKEN"),
                from: env_var("POSTMARK_FROM"),
                to: env_var("POSTMARK_TO"),
                message_stream: env_var("POSTMARK_MESSAGE_STREAM")
                    .unwrap_or(DEFAULT_MESSAGE_STREAM.into()),
                api_url: env_var("POSTMARK_API_URL").unwrap_or(POSTMARK_API_URL.into()),
            },
            turnstile: TurnstileConfig {
                secret: env_var("TURNSTILE_SECRET_KEY"),
                verify_url: env_var("TURNSTILE_VERIFY_URL").unwrap_or(TURNSTILE_VERIFY_URL.into()),
            },
        })
    }

    /// The allow-list as header values, failing on any origin that cannot appear in a header.
    pub fn origin_header_values(&self) -> anyhow::Result<Vec<HeaderValue>> {
        self.allowed_origins
            .iter()
            .map(|origin| {
                anyhow::ensure!(
                    origin != "*",
                    "Wildcard origin is not supported in ALLOWED_ORIGINS, list origins explicitly"
                );
                HeaderValue::from_str(origin)
                    .with_context(|| format!("Invalid allowed origin: {origin}"))
            })
            .collect()
    }
}

impl PostmarkConfig {
    pub fn delivery(&self) -> Result<Delivery, DeliveryConfigError> {
        let (Some(token), Some(to), Some(from)) = (&self.token, &self.to, &self.from) else {
            return Err(DeliveryConfigError::Missing {
                token: self.token.is_some(),
                to: self.to.is_some(),
                from: self.from.is_some(),
            });
        };
        Ok(Delivery {
            token: token.clone(),
            from: parse_mailbox("POSTMARK_FROM", from)?,
            to: parse_mailbox("POSTMARK_TO", to)?,
        })
    }
}

fn parse_mailbox(variable: &'static str, value: &str) -> Result<Mailbox, DeliveryConfigError> {
    value
        .parse()
        .map_err(|_| DeliveryConfigError::InvalidMailbox {
            variable,
            value: value.into(),
        })
}

fn parse_origins(origins: &str) -> Vec<String> {
    origins
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{parse_origins, Config, DeliveryConfigError, PostmarkConfig, TurnstileConfig};
    use googletest::prelude::*;

    fn postmark_config() -> PostmarkConfig {
        PostmarkConfig {
            token: Some("server token".into()),
            from: Some("Web contact form <noreply@example.com>".into()),
            to: Some("leads@example.com".into()),
            message_stream: "outbound".into(),
            api_url: "http://localhost/email".into(),
        }
    }

    #[test]
    fn splits_and_trims_allowed_origins() -> Result<()> {
        verify_that!(
            parse_origins(" https://example.com ,,http://localhost:1313"),
            elements_are![eq("https://example.com"), eq("http://localhost:1313")]
        )
    }

    #[test]
    fn refuses_wildcard_origin() -> Result<()> {
        let config = Config {
            port: 8080,
            allowed_origins: vec!["https://example.com".into(), "*".into()],
            postmark: postmark_config(),
            turnstile: TurnstileConfig {
                secret: None,
                verify_url: "http://localhost/siteverify".into(),
            },
        };

        verify_that!(config.origin_header_values().map(|_| ()), err(anything()))
    }

    #[test]
    fn resolves_complete_delivery_configuration() -> Result<()> {
        let delivery = postmark_config().delivery().unwrap();

        verify_that!(delivery.from.email.to_string(), eq("noreply@example.com"))?;
        verify_that!(delivery.to.to_string(), eq("leads@example.com"))
    }

    #[test]
    fn reports_which_delivery_settings_are_missing() -> Result<()> {
        let config = PostmarkConfig {
            token: None,
            ..postmark_config()
        };

        verify_that!(
            config.delivery().map(|_| ()),
            err(eq(DeliveryConfigError::Missing {
                token: false,
                to: true,
                from: true
            }))
        )
    }

    #[test]
    fn rejects_unparseable_recipient() -> Result<()> {
        let config = PostmarkConfig {
            to: Some("not an address".into()),
            ..postmark_config()
        };

        verify_that!(
            config.delivery().map(|_| ()),
            err(eq(DeliveryConfigError::InvalidMailbox {
                variable: "POSTMARK_TO",
                value: "not an address".into()
            }))
        )
    }
}
