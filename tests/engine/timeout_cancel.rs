use std::sync::Arc;
use std::time::Duration;

use fetchkit::{ErrorCode, FetchError, RequestConfig, RetryOverride};
use futures::future::join_all;
use serde_json::Value;

use crate::common::{ScriptedTransport, Step, builder, client};

async fn wait_for_in_flight(client: &fetchkit::FetchClient, n: usize) {
    while client.in_flight_count() < n {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn slow_transport_times_out() {
    let transport = Arc::new(ScriptedTransport::new(Step::Hang));
    let client = client(&transport);

    let started = tokio::time::Instant::now();
    let err = client
        .execute::<Value>("/slow", RequestConfig::new().timeout(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Timeout);
    assert!(matches!(err, FetchError::Timeout { timeout_ms: 100, .. }));
    assert!(err.to_string().contains("100"));
    assert!(started.elapsed() >= Duration::from_millis(100));
    // timeouts are terminal unless opted in
    assert_eq!(transport.calls(), 1);
    assert_eq!(client.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn timeouts_retry_when_opted_in() {
    let transport = Arc::new(ScriptedTransport::new(Step::Hang));
    let client = builder(&transport)
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let err = client
        .execute::<Value>(
            "/slow",
            RequestConfig::new().retry(RetryOverride {
                attempts: Some(1),
                retry_on_timeout: Some(true),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Retry);
    match err {
        FetchError::Retry { last, .. } => assert_eq!(last.code(), ErrorCode::Timeout),
        other => panic!("expected ERETRY, got {other:?}"),
    }
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancel_by_url_aborts_only_the_matching_request() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::Respond(200, "null"))
            .route("/slow", Step::Hang)
            .route("/other", Step::Delay(Duration::from_millis(50), 200, r#"{"id":7}"#)),
    );
    let client = client(&transport);

    let slow = tokio::spawn({
        let client = client.clone();
        async move { client.get::<Value>("/slow").await }
    });
    let other = tokio::spawn({
        let client = client.clone();
        async move { client.get::<Value>("/other").await }
    });
    wait_for_in_flight(&client, 2).await;

    assert!(client.cancel_by_url("/slow"));

    let slow = slow.await.unwrap().unwrap_err();
    assert_eq!(slow.code(), ErrorCode::Cancelled);
    assert!(matches!(&slow, FetchError::Cancelled { url, .. } if url == "http://mock.local/slow"));

    let other = other.await.unwrap().unwrap();
    assert_eq!(other["id"], 7);

    // cancellation is terminal
    assert_eq!(transport.calls_to("/slow"), 1);
    assert_eq!(client.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_by_unknown_url_is_a_no_op() {
    let transport = Arc::new(ScriptedTransport::new(Step::Hang));
    let client = client(&transport);

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.get::<Value>("/a").await }
    });
    wait_for_in_flight(&client, 1).await;

    assert!(!client.cancel_by_url("/b"));
    assert_eq!(client.in_flight_count(), 1);

    assert!(client.cancel_by_url("http://mock.local/a"));
    assert_eq!(pending.await.unwrap().unwrap_err().code(), ErrorCode::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn cancel_all_aborts_everything() {
    let transport = Arc::new(ScriptedTransport::new(Step::Hang));
    let client = client(&transport);

    let handles: Vec<_> = ["/a", "/b", "/a"]
        .into_iter()
        .map(|path| {
            let client = client.clone();
            tokio::spawn(async move { client.get::<Value>(path).await })
        })
        .collect();
    wait_for_in_flight(&client, 3).await;

    assert_eq!(client.cancel_all(), 3);
    for outcome in join_all(handles).await {
        assert_eq!(outcome.unwrap().unwrap_err().code(), ErrorCode::Cancelled);
    }
    assert_eq!(client.in_flight_count(), 0);
    assert_eq!(client.cancel_all(), 0);
}

#[tokio::test(start_paused = true)]
async fn registry_is_empty_after_success_and_failure() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::Respond(200, "1")).script([Step::Respond(500, "")]),
    );
    let client = client(&transport);

    assert!(client.get::<Value>("/x").await.is_err());
    assert_eq!(client.in_flight_count(), 0);
    assert_eq!(client.get::<u8>("/x").await.unwrap(), 1);
    assert_eq!(client.in_flight_count(), 0);
}
