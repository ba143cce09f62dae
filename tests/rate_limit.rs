//! Per-client admission control over real connections.

use reqwest::StatusCode;
use serde_json::Value;

mod common;

#[tokio::test]
async fn test_burst_then_too_many_requests() {
    let app = common::spawn_app(common::test_config()).await;
    let client = common::client();

    for i in 0..4 {
        let res = client.get(app.url("/v1/healthcheck")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "request {i} within burst");
    }

    let res = client.get(app.url("/v1/healthcheck")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "rate limit exceeded");

    app.signal();
    app.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_tokens_refill_over_time() {
    let app = common::spawn_app(common::test_config()).await;
    let client = common::client();

    for _ in 0..4 {
        client.get(app.url("/v1/healthcheck")).send().await.unwrap();
    }
    let res = client.get(app.url("/v1/healthcheck")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

    // 2 tokens per second: one is back after half a second.
    tokio::time::sleep(std::time::Duration::from_millis(600)).await;
    let res = client.get(app.url("/v1/healthcheck")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    app.signal();
    app.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_disabled_limiter_admits_everything() {
    let mut config = common::test_config();
    config.rate_limit.enabled = false;
    let app = common::spawn_app(config).await;
    let client = common::client();

    for _ in 0..20 {
        let res = client.get(app.url("/v1/healthcheck")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    app.signal();
    app.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_forwarded_clients_have_separate_buckets() {
    let mut config = common::test_config();
    config.rate_limit.trust_proxy_headers = true;
    config.rate_limit.burst = 1;
    let app = common::spawn_app(config).await;
    let client = common::client();

    let send = |ip: &'static str| {
        client
            .get(app.url("/v1/healthcheck"))
            .header("x-forwarded-for", ip)
            .send()
    };

    assert_eq!(send("203.0.113.1").await.unwrap().status(), StatusCode::OK);
    assert_eq!(
        send("203.0.113.1").await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(send("203.0.113.2").await.unwrap().status(), StatusCode::OK);

    app.signal();
    app.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_forwarding_headers_ignored_when_untrusted() {
    let mut config = common::test_config();
    config.rate_limit.burst = 1;
    let app = common::spawn_app(config).await;
    let client = common::client();

    let res = client
        .get(app.url("/v1/healthcheck"))
        .header("x-forwarded-for", "203.0.113.1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Same peer, different claimed origin: still the same bucket.
    let res = client
        .get(app.url("/v1/healthcheck"))
        .header("x-forwarded-for", "203.0.113.2")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

    app.signal();
    app.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unknown_route_uses_error_envelope() {
    let app = common::spawn_app(common::test_config()).await;

    let res = common::client()
        .get(app.url("/v1/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.headers().contains_key("x-request-id"));
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].is_string());

    app.signal();
    app.handle.await.unwrap().unwrap();
}
