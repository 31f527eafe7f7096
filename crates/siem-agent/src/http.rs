//! Shared HTTP plumbing for the Azure clients.

use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::config::HttpConfig;
use crate::{Error, Result};

/// Header Azure uses to correlate a request with provider-side logs.
pub const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(concat!("siem-agent/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Append path segments to a base URL, percent-encoding each one.
///
/// Segments are caller data (tenant ids, workspace and table names), so they
/// are never concatenated into the path as raw text.
pub fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::Config(format!("'{}' cannot be used as a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Read an error body without letting a broken stream mask the status.
pub async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(text) if !text.is_empty() => text,
        Ok(_) => format!("HTTP {} with empty body", status),
        Err(e) => format!("HTTP {} (failed to read body: {})", status, e),
    }
}
