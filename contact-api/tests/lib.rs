use contact_api::config::{Config, PostmarkConfig, TurnstileConfig};
use googletest::prelude::*;
use reqwest::{header, Client, Method, StatusCode};
use serde_json::{json, Value};
use std::net::Ipv4Addr;
use test_support::{
    fake_postmark::FakePostmark, fake_turnstile::FakeTurnstile, setup_logging,
};
use tokio::net::TcpListener;

const ALLOWED_ORIGIN: &str = "https://momentumbusiness.org";
const POSTMARK_TOKEN: &str = "postmark token";
const TURNSTILE_SECRET: &str = "turnstile secret";

async fn start_server(postmark_url: String, turnstile_url: String) -> String {
    let config = Config {
        port: 0,
        allowed_origins: vec![ALLOWED_ORIGIN.into(), "http://localhost:1313".into()],
        postmark: PostmarkConfig {
            token: Some(POSTMARK_TOKEN.into()),
            from: Some("Web contact form <noreply@momentumbusiness.org>".into()),
            to: Some("Cade <cade@momentumbusiness.org>".into()),
            message_stream: "outbound".into(),
            api_url: postmark_url,
        },
        turnstile: TurnstileConfig {
            secret: Some(TURNSTILE_SECRET.into()),
            verify_url: turnstile_url,
        },
    };
    let router = contact_api::router(&config).unwrap();
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(contact_api::serve(listener, router));
    format!("http://{address}")
}

async fn start_default_server() -> String {
    start_server(
        FakePostmark::new(POSTMARK_TOKEN).start().await,
        FakeTurnstile::new(TURNSTILE_SECRET).start().await,
    )
    .await
}

#[googletest::test]
#[tokio::test]
async fn reports_health() {
    let base_url = start_default_server().await;

    let response = reqwest::get(format!("{base_url}/api/health")).await.unwrap();

    expect_that!(response.status(), eq(StatusCode::OK));
    expect_that!(
        response.json::<Value>().await.unwrap(),
        eq(json!({"status": "ok"}))
    );
}

#[googletest::test]
#[tokio::test]
async fn reflects_allow_listed_origin() {
    let base_url = start_default_server().await;

    let response = Client::new()
        .get(format!("{base_url}/api/health"))
        .header(header::ORIGIN, ALLOWED_ORIGIN)
        .send()
        .await
        .unwrap();

    expect_that!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|value| value.to_str().unwrap().to_string()),
        some(eq(ALLOWED_ORIGIN))
    );
    expect_that!(
        response
            .headers()
            .get_all(header::VARY)
            .iter()
            .map(|value| value.to_str().unwrap().to_lowercase())
            .collect::<Vec<_>>(),
        contains(contains_substring("origin"))
    );
}

#[tokio::test]
async fn does_not_reflect_unknown_origin() -> Result<()> {
    let base_url = start_default_server().await;

    let response = Client::new()
        .get(format!("{base_url}/api/health"))
        .header(header::ORIGIN, "https://evil.example")
        .send()
        .await
        .unwrap();

    verify_that!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
        none()
    )
}

#[googletest::test]
#[tokio::test]
async fn answers_preflight_request() {
    let base_url = start_default_server().await;

    let response = Client::new()
        .request(Method::OPTIONS, format!("{base_url}/api/contact"))
        .header(header::ORIGIN, ALLOWED_ORIGIN)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .send()
        .await
        .unwrap();

    expect_that!(response.status(), eq(StatusCode::OK));
    expect_that!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_METHODS)
            .map(|value| value.to_str().unwrap().to_string()),
        some(contains_substring("POST"))
    );
    expect_that!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
            .map(|value| value.to_str().unwrap().to_lowercase()),
        some(contains_substring("content-type"))
    );
}

#[tokio::test]
async fn accepts_options_request_without_preflight_headers() -> Result<()> {
    let base_url = start_default_server().await;

    let response = Client::new()
        .request(Method::OPTIONS, format!("{base_url}/api/contact"))
        .send()
        .await
        .unwrap();

    verify_that!(response.status(), eq(StatusCode::OK))
}

#[googletest::test]
#[tokio::test]
async fn delivers_lead_end_to_end() {
    setup_logging();
    let fake_postmark = FakePostmark::new(POSTMARK_TOKEN);
    let fake_turnstile = FakeTurnstile::new(TURNSTILE_SECRET).require_token("browser token");
    let base_url = start_server(
        fake_postmark.start().await,
        fake_turnstile.start().await,
    )
    .await;

    let response = Client::new()
        .post(format!("{base_url}/api/contact"))
        .header(header::ORIGIN, ALLOWED_ORIGIN)
        .json(&json!({
            "first-name": "Jane",
            "last-name": "Doe",
            "email": "jane@example.com",
            "phone-number": "+1 509 554 8022",
            "annual-revenue": "1m-5m",
            "services": ["complete-support"],
            "message": "",
            "website": "",
            "cf-turnstile-response": "browser token",
        }))
        .send()
        .await
        .unwrap();

    expect_that!(response.status(), eq(StatusCode::OK));
    expect_that!(
        response.json::<Value>().await.unwrap()["data"],
        eq(json!({"firstName": "Jane", "email": "jane@example.com"}))
    );
    expect_that!(
        fake_turnstile
            .received_requests()
            .into_iter()
            .map(|request| request.remoteip)
            .collect::<Vec<_>>(),
        elements_are![some(eq("127.0.0.1"))]
    );
    let emails = fake_postmark.received_emails();
    expect_that!(emails, len(eq(2)));
    expect_that!(emails[0].to, contains_substring("cade@momentumbusiness.org"));
    expect_that!(emails[0].server_token, eq(POSTMARK_TOKEN));
    expect_that!(emails[0].text_body, contains_substring("$1,000,000 - $5,000,000"));
    expect_that!(emails[0].text_body, contains_substring("Complete Business Support"));
    expect_that!(emails[1].to, contains_substring("jane@example.com"));
}
