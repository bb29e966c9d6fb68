//! Timeline page fetching.
//!
//! [`Fetcher`] is the seam the sync loop drives; [`TimelineClient`] is the
//! real implementation against `statuses/user_timeline`. One call is one
//! signed GET. Nothing here retries: throttling and transport failures are
//! handed straight back to the caller.

use crate::config::{ApiConfig, Credentials};
use crate::error::{Result, SyncError};
use crate::model::{Cursor, RawItem};
use crate::oauth::OAuthSigner;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const TIMELINE_PATH: &str = "statuses/user_timeline.json";

/// Source of timeline pages, newest first.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch up to `page_size` items strictly older than `cursor`, or the
    /// newest items when `cursor` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Auth`], [`SyncError::Network`],
    /// [`SyncError::RateLimit`] or [`SyncError::MalformedResponse`].
    async fn fetch_page(&self, cursor: Option<&Cursor>, page_size: u32) -> Result<Vec<RawItem>>;
}

/// OAuth-signed client for one account's timeline.
pub struct TimelineClient {
    client: Client,
    endpoint: Url,
    screen_name: String,
    credentials: Credentials,
}

impl TimelineClient {
    /// Build a client for `screen_name`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] if the API base URL does not
    /// parse, or [`SyncError::Network`] if the HTTP client cannot be built.
    pub fn new(api: &ApiConfig, credentials: &Credentials, screen_name: &str) -> Result<Self> {
        let base = api.base_url.trim_end_matches('/');
        let endpoint = Url::parse(&format!("{base}/{TIMELINE_PATH}")).map_err(|e| {
            SyncError::invalid_argument(format!("invalid API base URL '{}': {e}", api.base_url))
        })?;

        let mut builder = Client::builder()
            .user_agent(format!("xsync/{}", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = api.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(SyncError::network)?;

        Ok(Self {
            client,
            endpoint,
            screen_name: screen_name.to_string(),
            credentials: credentials.clone(),
        })
    }

    /// The endpoint every page request targets.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn query(&self, cursor: Option<&Cursor>, page_size: u32) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("screen_name", self.screen_name.clone()),
            ("count", page_size.to_string()),
            ("tweet_mode", "extended".to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("max_id", cursor.exclusive_max_id()));
        }
        query
    }
}

#[async_trait]
impl Fetcher for TimelineClient {
    async fn fetch_page(&self, cursor: Option<&Cursor>, page_size: u32) -> Result<Vec<RawItem>> {
        let query = self.query(cursor, page_size);
        let authorization = OAuthSigner::new(&self.credentials).authorization_header(
            "GET",
            self.endpoint.as_str(),
            &query,
        )?;

        debug!(
            screen_name = %self.screen_name,
            cursor = cursor.map(Cursor::as_str),
            page_size,
            "Requesting timeline page"
        );

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&query)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(SyncError::network)?;

        let response = check_status(response).await?;
        let body = response.text().await.map_err(SyncError::network)?;
        parse_page(&body)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    // 420 is the v1 "Enhance Your Calm" throttle.
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 420 {
        let retry_after = extract_retry_after(&response);
        warn!(status = status.as_u16(), retry_after, "Rate limited");
        return Err(SyncError::RateLimit { retry_after });
    }

    let body = response.text().await.unwrap_or_default();
    let detail = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SyncError::auth(detail));
    }
    Err(SyncError::network(detail))
}

/// Seconds until the rate-limit window resets, from `retry-after` or the
/// epoch-seconds `x-rate-limit-reset` header.
fn extract_retry_after(response: &Response) -> Option<u64> {
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    if let Some(secs) = header("retry-after") {
        return u64::try_from(secs).ok();
    }
    header("x-rate-limit-reset").map(|reset| {
        let now = chrono::Utc::now().timestamp();
        u64::try_from(reset - now).unwrap_or(0)
    })
}

/// Parse a response body into its items.
///
/// # Errors
///
/// Returns [`SyncError::MalformedResponse`] unless the body is a JSON array.
pub fn parse_page(body: &str) -> Result<Vec<RawItem>> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(other) => Err(SyncError::malformed_response(format!(
            "expected a JSON array, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(SyncError::malformed_response(e.to_string())),
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
