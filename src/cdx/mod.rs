//! Wayback Machine CDX index client.
//!
//! Fetches the capture index for every URL variant, paginating wildcard
//! queries, rate limiting all requests through a token bucket, and retrying
//! throttled or failing responses with capped exponential backoff.

mod rate_limiter;

pub use rate_limiter::CdxRateLimiter;

use std::collections::HashSet;
use std::time::Duration;

use log::debug;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use thiserror::Error;

use crate::progress::ProgressReporter;

/// Public CDX search endpoint.
pub const CDX_SEARCH_ENDPOINT: &str = "https://web.archive.org/cdx/search/xd";

/// Safety cap on wildcard pagination per variant.
const MAX_WILDCARD_PAGES: u32 = 100;

/// Request timeout for CDX calls.
const CDX_TIMEOUT: Duration = Duration::from_secs(60);

/// `Retry-After` values above this are clamped.
const RETRY_AFTER_CAP: Duration = Duration::from_secs(120);

/// One CDX result row: a capture of `original_url` at `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdxRow {
    /// 14-digit `YYYYMMDDhhmmss` capture timestamp.
    pub timestamp: String,
    /// URL as it was at archive time.
    pub original_url: String,
}

/// Errors from the CDX client.
#[derive(Debug, Error)]
pub enum CdxError {
    #[error("cdx request URL: {0}")]
    InvalidRequestUrl(#[from] url::ParseError),
    #[error("cdx GET {url}: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },
    #[error("cdx read body for {url}: {source}")]
    Body {
        url: String,
        source: reqwest::Error,
    },
    #[error("cdx HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("cdx HTTP {status} after {retries} retries for {url}")]
    RetriesExhausted {
        status: u16,
        retries: u32,
        url: String,
    },
    #[error("cdx json decode for {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },
}

/// Build the HTTP client used for CDX requests.
pub fn cdx_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(CDX_TIMEOUT)
        .gzip(true)
        .user_agent(concat!("wayback-mirror/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Collect every CDX row for all URL variants.
///
/// `endpoint` is normally [`CDX_SEARCH_ENDPOINT`]; tests point it at a local
/// server. With `exact_url`, each variant is fetched once, unpaginated, and
/// any error aborts the whole fetch. Otherwise each variant is expanded to
/// `variant/*` and paginated until a page comes back empty, a page errors
/// (which only ends that variant), or the page cap is reached. Results are
/// deduplicated across variants by `timestamp|originalURL`; a resource
/// legitimately archived at several timestamps keeps all of them.
///
/// `progress` advances by one for each page successfully fetched.
#[allow(clippy::too_many_arguments)]
pub async fn fetch_all(
    client: &reqwest::Client,
    endpoint: &str,
    variants: &[String],
    exact_url: bool,
    from_ts: Option<&str>,
    to_ts: Option<&str>,
    rate_per_min: u32,
    max_retries: u32,
    progress: &dyn ProgressReporter,
) -> Result<Vec<CdxRow>, CdxError> {
    let mut limiter = CdxRateLimiter::new(rate_per_min);
    let mut seen: HashSet<String> = HashSet::new();
    let mut all: Vec<CdxRow> = Vec::new();

    for variant in variants {
        if exact_url {
            let rows = fetch_page(
                client,
                &mut limiter,
                endpoint,
                variant,
                None,
                from_ts,
                to_ts,
                max_retries,
            )
            .await?;
            progress.inc();
            dedup_extend(&mut all, &mut seen, rows);
        } else {
            let wildcard = format!("{}/*", variant.trim_end_matches('/'));
            for page in 0..MAX_WILDCARD_PAGES {
                let rows = match fetch_page(
                    client,
                    &mut limiter,
                    endpoint,
                    &wildcard,
                    Some(page),
                    from_ts,
                    to_ts,
                    max_retries,
                )
                .await
                {
                    Ok(rows) => rows,
                    Err(err) => {
                        // A failing page ends pagination for this variant
                        // only; the remaining variants still run.
                        debug!("cdx pagination for {wildcard} stopped at page {page}: {err}");
                        break;
                    }
                };
                progress.inc();
                if rows.is_empty() {
                    break;
                }
                dedup_extend(&mut all, &mut seen, rows);
            }
        }
    }

    Ok(all)
}

fn dedup_extend(all: &mut Vec<CdxRow>, seen: &mut HashSet<String>, rows: Vec<CdxRow>) {
    for row in rows {
        let key = format!("{}|{}", row.timestamp, row.original_url);
        if seen.insert(key) {
            all.push(row);
        }
    }
}

/// Fetch a single CDX page. `page == None` means no pagination parameter
/// (exact-URL mode fetches everything at once).
///
/// Retries 429/503/5xx responses up to `max_retries` times, honoring
/// `Retry-After` and otherwise backing off exponentially.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn fetch_page(
    client: &reqwest::Client,
    limiter: &mut CdxRateLimiter,
    endpoint: &str,
    target_url: &str,
    page: Option<u32>,
    from_ts: Option<&str>,
    to_ts: Option<&str>,
    max_retries: u32,
) -> Result<Vec<CdxRow>, CdxError> {
    let mut params: Vec<(&str, String)> = vec![
        ("output", "json".to_string()),
        ("fl", "timestamp,original".to_string()),
        ("collapse", "digest".to_string()),
        ("gzip", "false".to_string()),
        ("filter", "statuscode:200".to_string()),
    ];
    if let Some(from) = from_ts {
        params.push(("from", from.to_string()));
    }
    if let Some(to) = to_ts {
        params.push(("to", to.to_string()));
    }
    params.push(("url", target_url.to_string()));
    if let Some(page) = page {
        params.push(("page", page.to_string()));
    }

    let api_url = url::Url::parse_with_params(endpoint, &params)?;

    let mut attempt: u32 = 0;
    loop {
        limiter.acquire().await;

        let resp = client
            .get(api_url.clone())
            .send()
            .await
            .map_err(|source| CdxError::Http {
                url: api_url.to_string(),
                source,
            })?;

        let status = resp.status();
        if status == StatusCode::OK {
            let body = resp.text().await.map_err(|source| CdxError::Body {
                url: api_url.to_string(),
                source,
            })?;
            return parse_rows(&body, api_url.as_str());
        }

        let retriable = status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::SERVICE_UNAVAILABLE
            || status.is_server_error();
        if !retriable {
            return Err(CdxError::Status {
                status: status.as_u16(),
                url: api_url.to_string(),
            });
        }
        if attempt == max_retries {
            return Err(CdxError::RetriesExhausted {
                status: status.as_u16(),
                retries: max_retries,
                url: api_url.to_string(),
            });
        }

        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let delay = retry_delay(attempt, retry_after.as_deref());
        debug!("cdx HTTP {status} for {target_url}, retry {attempt} in {delay:?}");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// How long to wait before the next attempt. Honors a positive integer
/// `Retry-After` (capped at 120 s), otherwise exponential backoff capped at
/// 60 s: 5 s, 10 s, 20 s, 40 s, 60 s, …
fn retry_delay(attempt: u32, retry_after: Option<&str>) -> Duration {
    if let Some(value) = retry_after {
        if let Ok(secs) = value.trim().parse::<u64>() {
            if secs > 0 {
                return Duration::from_secs(secs).min(RETRY_AFTER_CAP);
            }
        }
    }
    let secs = (5u64 << attempt.min(4)).min(60);
    Duration::from_secs(secs)
}

/// Decode a CDX response body: a JSON array of string arrays whose first row
/// is the column header. A blank body means zero results.
fn parse_rows(body: &str, api_url: &str) -> Result<Vec<CdxRow>, CdxError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<Vec<String>> =
        serde_json::from_str(body).map_err(|source| CdxError::Decode {
            url: api_url.to_string(),
            source,
        })?;

    Ok(rows
        .into_iter()
        .skip(1) // header row: ["timestamp","original"]
        .filter(|row| row.len() >= 2)
        .map(|row| {
            let mut fields = row.into_iter();
            let timestamp = fields.next().unwrap_or_default();
            let original_url = fields.next().unwrap_or_default();
            CdxRow {
                timestamp,
                original_url,
            }
        })
        .collect())
}
