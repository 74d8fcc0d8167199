//! Integration tests for the CDX client: retry/backoff sequencing against a
//! hand-rolled response-sequence server, and pagination/dedup against
//! mockito.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wayback_mirror::cdx::{self, CdxError, CdxRow};
use wayback_mirror::progress::NoOpProgress;

const ROWS_BODY: &str = r#"[["timestamp","original"],
    ["20230101000000","https://example.com/"],
    ["20230201000000","https://example.com/about"]]"#;

fn http_response(status_line: &str, headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n{headers}\r\n{body}",
        body.len()
    )
}

fn unavailable_retry_after_1s() -> String {
    http_response("503 Service Unavailable", "Retry-After: 1\r\n", "")
}

fn ok_rows() -> String {
    http_response("200 OK", "Content-Type: application/json\r\n", ROWS_BODY)
}

/// Serve a fixed sequence of canned HTTP responses on a local port; the last
/// response repeats once the sequence is exhausted. Returns the endpoint URL
/// and a counter of requests served.
async fn serve_sequence(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    let served = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&served);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            // Drain the request head before answering.
            let mut buf = [0u8; 4096];
            let mut head = Vec::new();
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        head.extend_from_slice(&buf[..n]);
                        if head.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                }
            }
            let idx = counter.fetch_add(1, Ordering::SeqCst);
            let response = &responses[idx.min(responses.len() - 1)];
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}/cdx/search/xd"), served)
}

fn variants(url: &str) -> Vec<String> {
    vec![url.to_string()]
}

#[tokio::test]
async fn exact_fetch_parses_rows() {
    let (endpoint, served) = serve_sequence(vec![ok_rows()]).await;
    let client = cdx::cdx_client().expect("client");

    let rows = cdx::fetch_all(
        &client,
        &endpoint,
        &variants("https://example.com/"),
        true,
        None,
        None,
        6000,
        0,
        &NoOpProgress,
    )
    .await
    .expect("fetch succeeds");

    assert_eq!(served.load(Ordering::SeqCst), 1);
    assert_eq!(
        rows,
        vec![
            CdxRow {
                timestamp: "20230101000000".to_string(),
                original_url: "https://example.com/".to_string(),
            },
            CdxRow {
                timestamp: "20230201000000".to_string(),
                original_url: "https://example.com/about".to_string(),
            },
        ]
    );
}

// Two 503s then a 200: succeeds because the retry budget (2) covers them.
#[tokio::test]
async fn retriable_statuses_are_retried_until_success() {
    let (endpoint, served) = serve_sequence(vec![
        unavailable_retry_after_1s(),
        unavailable_retry_after_1s(),
        ok_rows(),
    ])
    .await;
    let client = cdx::cdx_client().expect("client");

    let rows = cdx::fetch_all(
        &client,
        &endpoint,
        &variants("https://example.com/"),
        true,
        None,
        None,
        6000,
        2,
        &NoOpProgress,
    )
    .await
    .expect("retries should recover");

    assert_eq!(served.load(Ordering::SeqCst), 3);
    assert_eq!(rows.len(), 2);
}

// Same sequence with only one retry allowed: the budget is exhausted first.
#[tokio::test]
async fn retries_exhausted_yields_typed_error() {
    let (endpoint, served) = serve_sequence(vec![
        unavailable_retry_after_1s(),
        unavailable_retry_after_1s(),
        ok_rows(),
    ])
    .await;
    let client = cdx::cdx_client().expect("client");

    let err = cdx::fetch_all(
        &client,
        &endpoint,
        &variants("https://example.com/"),
        true,
        None,
        None,
        6000,
        1,
        &NoOpProgress,
    )
    .await
    .expect_err("budget of one retry cannot cover two failures");

    assert_eq!(served.load(Ordering::SeqCst), 2);
    match err {
        CdxError::RetriesExhausted {
            status, retries, ..
        } => {
            assert_eq!(status, 503);
            assert_eq!(retries, 1);
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn non_retriable_status_fails_immediately() {
    let (endpoint, served) =
        serve_sequence(vec![http_response("403 Forbidden", "", "")]).await;
    let client = cdx::cdx_client().expect("client");

    let err = cdx::fetch_all(
        &client,
        &endpoint,
        &variants("https://example.com/"),
        true,
        None,
        None,
        6000,
        5,
        &NoOpProgress,
    )
    .await
    .expect_err("403 is not retriable");

    assert_eq!(served.load(Ordering::SeqCst), 1, "no retry may happen");
    assert!(matches!(err, CdxError::Status { status: 403, .. }));
}

#[tokio::test]
async fn blank_body_is_zero_results() {
    let (endpoint, _served) =
        serve_sequence(vec![http_response("200 OK", "", "")]).await;
    let client = cdx::cdx_client().expect("client");

    let rows = cdx::fetch_all(
        &client,
        &endpoint,
        &variants("https://example.com/"),
        true,
        None,
        None,
        6000,
        0,
        &NoOpProgress,
    )
    .await
    .expect("blank body is fine");
    assert!(rows.is_empty());
}

#[tokio::test]
async fn wildcard_mode_paginates_until_empty_page() {
    let mut server = mockito::Server::new_async().await;
    let page0 = server
        .mock("GET", "/")
        .match_query(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("url".into(), "https://example.com/*".into()),
            mockito::Matcher::UrlEncoded("page".into(), "0".into()),
        ]))
        .with_status(200)
        .with_body(ROWS_BODY)
        .create_async()
        .await;
    let page1 = server
        .mock("GET", "/")
        .match_query(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("url".into(), "https://example.com/*".into()),
            mockito::Matcher::UrlEncoded("page".into(), "1".into()),
        ]))
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let client = cdx::cdx_client().expect("client");
    let rows = cdx::fetch_all(
        &client,
        &server.url(),
        &variants("https://example.com/"),
        false,
        None,
        None,
        6000,
        0,
        &NoOpProgress,
    )
    .await
    .expect("pagination succeeds");

    page0.assert_async().await;
    page1.assert_async().await;
    assert_eq!(rows.len(), 2);
}

// A failing variant ends its own pagination; other variants still run.
#[tokio::test]
async fn wildcard_variant_error_does_not_abort_other_variants() {
    let mut server = mockito::Server::new_async().await;
    let _broken = server
        .mock("GET", "/")
        .match_query(mockito::Matcher::UrlEncoded(
            "url".into(),
            "https://broken.example.com/*".into(),
        ))
        .with_status(400)
        .create_async()
        .await;
    let _good0 = server
        .mock("GET", "/")
        .match_query(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("url".into(), "https://example.com/*".into()),
            mockito::Matcher::UrlEncoded("page".into(), "0".into()),
        ]))
        .with_status(200)
        .with_body(ROWS_BODY)
        .create_async()
        .await;
    let _good1 = server
        .mock("GET", "/")
        .match_query(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("url".into(), "https://example.com/*".into()),
            mockito::Matcher::UrlEncoded("page".into(), "1".into()),
        ]))
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let client = cdx::cdx_client().expect("client");
    let rows = cdx::fetch_all(
        &client,
        &server.url(),
        &[
            "https://broken.example.com/".to_string(),
            "https://example.com/".to_string(),
        ],
        false,
        None,
        None,
        6000,
        0,
        &NoOpProgress,
    )
    .await
    .expect("one broken variant must not abort the fetch");

    assert_eq!(rows.len(), 2);
}

// The same capture reported under two variants appears once; distinct
// timestamps of the same URL both survive.
#[tokio::test]
async fn rows_are_deduplicated_by_timestamp_and_url() {
    let mut server = mockito::Server::new_async().await;
    let overlapping = r#"[["timestamp","original"],
        ["20230101000000","https://example.com/"],
        ["20240101000000","https://example.com/"]]"#;
    let _a = server
        .mock("GET", "/")
        .match_query(mockito::Matcher::UrlEncoded(
            "url".into(),
            "https://example.com/".into(),
        ))
        .with_status(200)
        .with_body(overlapping)
        .create_async()
        .await;
    let _b = server
        .mock("GET", "/")
        .match_query(mockito::Matcher::UrlEncoded(
            "url".into(),
            "https://www.example.com/".into(),
        ))
        .with_status(200)
        .with_body(overlapping)
        .create_async()
        .await;

    let client = cdx::cdx_client().expect("client");
    let rows = cdx::fetch_all(
        &client,
        &server.url(),
        &[
            "https://example.com/".to_string(),
            "https://www.example.com/".to_string(),
        ],
        true,
        None,
        None,
        6000,
        0,
        &NoOpProgress,
    )
    .await
    .expect("fetch succeeds");

    assert_eq!(
        rows,
        vec![
            CdxRow {
                timestamp: "20230101000000".to_string(),
                original_url: "https://example.com/".to_string(),
            },
            CdxRow {
                timestamp: "20240101000000".to_string(),
                original_url: "https://example.com/".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn timestamp_window_is_forwarded() {
    let mut server = mockito::Server::new_async().await;
    let windowed = server
        .mock("GET", "/")
        .match_query(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("from".into(), "20200101000000".into()),
            mockito::Matcher::UrlEncoded("to".into(), "20221231235959".into()),
            mockito::Matcher::UrlEncoded("url".into(), "https://example.com/".into()),
        ]))
        .with_status(200)
        .with_body(ROWS_BODY)
        .create_async()
        .await;

    let client = cdx::cdx_client().expect("client");
    let rows = cdx::fetch_all(
        &client,
        &server.url(),
        &variants("https://example.com/"),
        true,
        Some("20200101000000"),
        Some("20221231235959"),
        6000,
        0,
        &NoOpProgress,
    )
    .await
    .expect("fetch succeeds");

    windowed.assert_async().await;
    assert_eq!(rows.len(), 2);
}
