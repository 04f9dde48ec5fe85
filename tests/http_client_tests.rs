mod common;

use common::{http_response, TestServer};
use moe_scraper::config::ClientConfig;
use moe_scraper::error::Error;
use moe_scraper::http_client::{HttpClient, RequestOptions};
use moe_scraper::proxy_pool::ProxyPool;

fn client_with(max_retries: u32) -> HttpClient {
    HttpClient::with_config(ClientConfig {
        max_retries,
        retry_backoff_ms: 10,
        timeout_secs: 5,
        ..ClientConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_success_returns_wrapped_response() {
    let server = TestServer::spawn(vec![http_response(
        200,
        &[("Content-Type", "application/json")],
        r#"{"ok": true}"#,
    )])
    .await;

    let client = client_with(2);
    let response = client.get(&server.url()).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.text, r#"{"ok": true}"#);
    assert_eq!(response.json.as_ref().unwrap()["ok"], true);
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_non_special_statuses_pass_through() {
    let server = TestServer::spawn(vec![http_response(404, &[], "gone")]).await;

    let client = client_with(2);
    let response = client.get(&server.url()).await.unwrap();

    // providers interpret 404 themselves; the core does not retry it
    assert_eq!(response.status, 404);
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_too_many_retries_after_budget_exhausted() {
    let server = TestServer::spawn(vec![http_response(503, &[], "down")]).await;

    let client = client_with(2);
    let result = client.get(&server.url()).await;

    match result {
        Err(Error::TooManyRetries {
            attempts,
            last_status,
            ..
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last_status, Some(503));
        }
        other => panic!("expected TooManyRetries, got {other:?}"),
    }
    // initial attempt plus two retries
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn test_preexceeded_retry_budget_does_no_io() {
    let server = TestServer::spawn(vec![http_response(200, &[], "never sent")]).await;

    let client = client_with(6);
    let result = client
        .request(RequestOptions {
            url: Some(server.url()),
            retries: 7,
            ..RequestOptions::default()
        })
        .await;

    assert!(matches!(result, Err(Error::TooManyRetries { .. })));
    assert_eq!(server.hits(), 0);
}

#[tokio::test]
async fn test_missing_url_is_fatal() {
    let client = client_with(2);
    let result = client.request(RequestOptions::default()).await;
    assert!(matches!(result, Err(Error::MissingUrl)));
}

#[tokio::test]
async fn test_rate_limit_raises_by_default() {
    let server =
        TestServer::spawn(vec![http_response(429, &[("Retry-After", "3")], "slow down")]).await;

    let client = client_with(2);
    let result = client.get(&server.url()).await;

    match result {
        Err(Error::RateLimited { retry_after, .. }) => assert_eq!(retry_after, 3.0),
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_rate_limit_retries_when_opted_in() {
    let server = TestServer::spawn(vec![
        http_response(429, &[("Retry-After", "0")], ""),
        http_response(200, &[], "recovered"),
    ])
    .await;

    let client = client_with(2);
    let response = client
        .request(RequestOptions {
            url: Some(server.url()),
            ratelimit_retry: true,
            ..RequestOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.text, "recovered");
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_ignored_server_errors_pass_through() {
    let server = TestServer::spawn(vec![http_response(503, &[], "maintenance page")]).await;

    let client = client_with(2);
    let response = client
        .request(RequestOptions {
            url: Some(server.url()),
            ignore_codes: vec![503],
            ..RequestOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(response.status, 503);
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_server_error_rotates_to_next_proxy() {
    // each fake proxy answers the absolute-form request itself
    let bad_proxy = TestServer::spawn(vec![http_response(503, &[], "")]).await;
    let good_proxy = TestServer::spawn(vec![http_response(200, &[], "proxied")]).await;

    let mut pool = ProxyPool::new();
    pool.add_url(&bad_proxy.url()).unwrap();
    pool.add_url(&good_proxy.url()).unwrap();

    let client = client_with(3).with_pool(pool);
    let response = client.get("http://upstream.invalid/page").await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.text, "proxied");
    assert_eq!(bad_proxy.hits(), 1);
    assert_eq!(good_proxy.hits(), 1);

    // both proxies were scored on the way
    let mut tracked = client.pool().lock().unwrap();
    assert!(tracked.get_by_url(&bad_proxy.url()).unwrap().latency.is_some());
    assert!(tracked.get_by_url(&good_proxy.url()).unwrap().latency.is_some());
    assert_eq!(tracked.get_by_url(&bad_proxy.url()).unwrap().use_count, 1);
}

#[tokio::test]
async fn test_set_cookie_carries_to_next_request() {
    let server = TestServer::spawn(vec![
        http_response(200, &[("Set-Cookie", "sid=abc123; Path=/; HttpOnly")], "hello"),
        http_response(200, &[], "again"),
    ])
    .await;

    let client = client_with(2);
    client.get(&server.url()).await.unwrap();
    client.get(&server.url()).await.unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].to_lowercase().contains("cookie: sid=abc123"));
    assert!(requests[1].to_lowercase().contains("cookie: sid=abc123"));
}

#[tokio::test]
async fn test_set_cookie_opt_out() {
    let server = TestServer::spawn(vec![http_response(
        200,
        &[("Set-Cookie", "sid=abc123; Path=/")],
        "hello",
    )])
    .await;

    let client = client_with(2);
    client
        .request(RequestOptions {
            url: Some(server.url()),
            ignore_set_cookie: true,
            ..RequestOptions::default()
        })
        .await
        .unwrap();

    assert!(client.default_headers().get("cookie").is_none());
}

#[tokio::test]
async fn test_base_url_and_query_params() {
    let server = TestServer::spawn(vec![http_response(200, &[], "results")]).await;

    let client = HttpClient::with_config(ClientConfig {
        base_url: Some(format!("{}/", server.url())),
        ..ClientConfig::default()
    })
    .unwrap();

    client
        .request(RequestOptions {
            url: Some("search/all".to_string()),
            params: Some(vec![("q".to_string(), "bebop".to_string())]),
            ..RequestOptions::default()
        })
        .await
        .unwrap();

    let requests = server.requests();
    assert!(requests[0].starts_with("GET /search/all?q=bebop"));
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = TestServer::spawn(vec![http_response(200, &[], "{}")]).await;

    let client = client_with(2);
    client
        .request(RequestOptions {
            url: Some(server.url()),
            method: reqwest::Method::POST,
            json: Some(serde_json::json!({"query": "{animes}"})),
            ..RequestOptions::default()
        })
        .await
        .unwrap();

    let requests = server.requests();
    assert!(requests[0].starts_with("POST /"));
    assert!(requests[0].contains(r#"{"query":"{animes}"}"#));
}
