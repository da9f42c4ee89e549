use std::sync::Arc;
use std::time::Duration;

use fetchkit::{ErrorCode, RequestConfig, ResponseType};
use serde_json::Value;
use url::Url;

use crate::common::{ScriptedTransport, Step, builder, client};

#[tokio::test]
async fn per_call_headers_override_client_headers() {
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(200, "null")));
    let client = builder(&transport)
        .header("X-Api-Key", "global")
        .header("x-client", "fetchkit")
        .build()
        .unwrap();

    let _: Value = client
        .execute("/data", RequestConfig::new().header("x-api-key", "call"))
        .await
        .unwrap();

    let sent = transport.last_request();
    assert_eq!(sent.headers.get("x-api-key").map(String::as_str), Some("call"));
    assert_eq!(sent.headers.get("x-client").map(String::as_str), Some("fetchkit"));
}

#[tokio::test]
async fn configure_applies_to_later_calls() {
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(200, "null")));
    let client = client(&transport);

    client.configure(
        RequestConfig::new()
            .header("x-late", "1")
            .base_url(Url::parse("http://other.local/api/").unwrap())
            .timeout(Duration::from_secs(1)),
    );
    assert_eq!(client.config().timeout, Duration::from_secs(1));

    let _: Value = client.get("items").await.unwrap();
    let sent = transport.last_request();
    assert_eq!(sent.url.as_str(), "http://other.local/api/items");
    assert_eq!(sent.headers.get("x-late").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn text_responses_decode_to_strings() {
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(200, "plain body")));
    let client = builder(&transport)
        .response_type(ResponseType::Text)
        .build()
        .unwrap();

    let out: String = client.get("/readme").await.unwrap();
    assert_eq!(out, "plain body");
}

#[tokio::test]
async fn invalid_json_is_a_serialize_error() {
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(200, "{oops")));
    let client = client(&transport);

    let err = client.get::<Value>("/broken").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Serialize);
}

#[tokio::test]
async fn custom_status_validator_accepts_redirect_range() {
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(304, "")));
    let client = builder(&transport)
        .validate_status(|s| (200..400).contains(&s))
        .build()
        .unwrap();

    let out: Value = client.get("/etag").await.unwrap();
    assert_eq!(out, Value::Null);
}

#[tokio::test]
async fn relative_url_without_base_is_a_config_error() {
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(200, "null")));
    let client = fetchkit::FetchClient::builder()
        .transport(transport.clone())
        .build()
        .unwrap();

    let err = client.get::<Value>("/data").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Config);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn typed_decode_failures_keep_the_config() {
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(200, r#"{"a":1}"#)));
    let client = client(&transport);

    let err = client.get::<Vec<u8>>("/shape").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Serialize);
    let config = err.config().expect("config attached");
    assert_eq!(config.url, "/shape");
    assert_eq!(config.target_url().unwrap().as_str(), "http://mock.local/shape");
}
