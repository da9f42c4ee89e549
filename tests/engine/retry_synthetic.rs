use std::sync::Arc;
use std::time::Duration;

use fetchkit::{ErrorCode, FetchError, Method, RequestConfig, RetryOverride, TransportErrorKind};
use serde_json::{Value, json};

use crate::common::{ScriptedTransport, Step, client};

#[tokio::test(start_paused = true)]
async fn exhausted_retries_wrap_the_last_error() {
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(503, "busy")));
    let client = client(&transport);

    let err = client
        .execute::<Value>("/flaky", RequestConfig::new())
        .await
        .unwrap_err();

    // default policy: 3 retries on top of the first attempt
    assert_eq!(transport.calls(), 4);
    assert_eq!(err.code(), ErrorCode::Retry);
    assert_eq!(err.status(), Some(503));
    match err {
        FetchError::Retry { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.code(), ErrorCode::Http);
        }
        other => panic!("expected ERETRY, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn post_recovers_after_two_backoff_delays() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::Respond(200, r#"{"ok":true}"#))
            .script([Step::Respond(503, ""), Step::Respond(503, "")]),
    );
    let client = client(&transport);

    let started = tokio::time::Instant::now();
    let out: Value = client
        .execute(
            "/submit",
            RequestConfig::new()
                .method(Method::POST)
                .json(&json!({"name": "demo"}))
                .unwrap()
                .retry_status_codes([503]),
        )
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(out, json!({"ok": true}));
    assert_eq!(transport.calls(), 3);
    // 1000ms then 2000ms
    assert!(elapsed >= Duration::from_millis(3000), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(3100), "elapsed {elapsed:?}");

    let sent = transport.last_request();
    assert_eq!(sent.method, Method::POST);
    assert_eq!(
        sent.headers.get("content-type").map(String::as_str),
        Some("application/json")
    );
}

#[tokio::test(start_paused = true)]
async fn delays_are_capped_by_max_delay() {
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(429, "")));
    let client = client(&transport);

    let started = tokio::time::Instant::now();
    let err = client
        .execute::<Value>(
            "/limited",
            RequestConfig::new().retry(RetryOverride {
                attempts: Some(4),
                max_delay: Some(Duration::from_millis(1500)),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.code(), ErrorCode::Retry);
    assert_eq!(transport.calls(), 5);
    // 1000 + 1500 + 1500 + 1500
    assert!(elapsed >= Duration::from_millis(5500), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(5600), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn ineligible_status_fails_immediately() {
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(404, "missing")));
    let client = client(&transport);

    let err = client.get::<Value>("/nope").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Http);
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.response().unwrap().text().unwrap(), "missing");
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn ineligible_error_after_a_retry_is_returned_unwrapped() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::Respond(404, "")).script([Step::Respond(503, "")]),
    );
    let client = client(&transport);

    let err = client.get::<Value>("/moved").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Http);
    assert_eq!(err.status(), Some(404));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_connections_are_retried() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::Respond(200, "[1,2,3]"))
            .script([Step::Fail(TransportErrorKind::Aborted)]),
    );
    let client = client(&transport);

    let out: Vec<u32> = client.get("/list").await.unwrap();
    assert_eq!(out, vec![1, 2, 3]);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn other_transport_failures_are_terminal() {
    let transport = Arc::new(ScriptedTransport::new(Step::Fail(TransportErrorKind::Other)));
    let client = client(&transport);

    let err = client.get::<Value>("/bad").await.unwrap_err();
    assert!(matches!(
        err,
        FetchError::Transport {
            kind: TransportErrorKind::Other,
            ..
        }
    ));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn no_retry_disables_the_policy() {
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(503, "")));
    let client = client(&transport);

    let err = client
        .execute::<Value>("/flaky", RequestConfig::new().no_retry())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Http);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_attempts_wraps_the_first_failure() {
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(503, "")));
    let client = client(&transport);

    let err = client
        .execute::<Value>("/flaky", RequestConfig::new().retry_attempts(0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Retry);
    assert_eq!(transport.calls(), 1);
}
