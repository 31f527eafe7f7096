//! Azure AD client-credentials token acquisition.
//!
//! Tokens are requested from the v1 `oauth2/token` endpoint with a `resource`
//! parameter. An optional in-process cache keyed by (tenant, client, resource)
//! reuses a token until shortly before it expires.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};
use url::Url;

use crate::config::ClientCredentials;
use crate::http::{self, CLIENT_REQUEST_ID_HEADER};
use crate::{Error, Result};

/// Resource URI for Azure Resource Manager (Sentinel / Log Analytics).
pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com";

/// Resource URI for the Defender for Endpoint API.
pub const DEFENDER_RESOURCE: &str = "https://api.securitycenter.microsoft.com";

/// Cached tokens are dropped this long before the provider-reported expiry.
const EXPIRY_SKEW_SECONDS: i64 = 300;

/// Bearer token with its provider-reported expiry.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the token can still be handed out at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(EXPIRY_SKEW_SECONDS) < expires_at,
            None => false,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TokenCacheKey {
    tenant_id: String,
    client_id: String,
    resource: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    // v1 endpoint returns these as strings, v2 as numbers
    expires_in: Option<Value>,
    expires_on: Option<Value>,
}

impl TokenResponse {
    fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if let Some(epoch) = self.expires_on.as_ref().and_then(as_i64) {
            if let Some(at) = DateTime::<Utc>::from_timestamp(epoch, 0) {
                return Some(at);
            }
        }
        self.expires_in
            .as_ref()
            .and_then(as_i64)
            .map(|seconds| now + Duration::seconds(seconds))
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Client for the Azure AD token endpoint.
#[derive(Clone)]
pub struct AzureAdClient {
    client: reqwest::Client,
    login_url: Url,
    cache: Option<Arc<Mutex<HashMap<TokenCacheKey, AccessToken>>>>,
}

impl AzureAdClient {
    pub fn new(client: reqwest::Client, login_url: Url) -> Self {
        Self {
            client,
            login_url,
            cache: None,
        }
    }

    /// Reuse tokens across calls until shortly before expiry
    pub fn with_token_cache(mut self) -> Self {
        self.cache = Some(Arc::new(Mutex::new(HashMap::new())));
        self
    }

    /// Acquire a bearer token for `resource` with the client-credentials grant.
    pub async fn acquire_token(
        &self,
        credentials: &ClientCredentials,
        resource: &str,
    ) -> Result<AccessToken> {
        if !credentials.is_complete() {
            return Err(Error::Authentication(format!(
                "client credentials for resource {} are not configured",
                resource
            )));
        }

        let key = TokenCacheKey {
            tenant_id: credentials.tenant_id.clone(),
            client_id: credentials.client_id.clone(),
            resource: resource.to_string(),
        };

        if let Some(token) = self.cached(&key) {
            debug!("Using cached access token for resource {}", resource);
            return Ok(token);
        }

        let url = http::endpoint(&self.login_url, &[credentials.tenant_id.as_str(), "oauth2", "token"])?;
        let request_id = http::new_request_id();
        info!(
            "Requesting access token for resource {} (request id {})",
            resource, request_id
        );

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("resource", resource),
        ];

        let response = self
            .client
            .post(url)
            .header(CLIENT_REQUEST_ID_HEADER, &request_id)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Authentication(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = http::error_body(response).await;
            error!("Token request failed. Response Status: {}", status);
            error!("Response Body: {}", body);
            return Err(Error::Authentication(format!(
                "token endpoint returned HTTP {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Authentication(format!("invalid token response: {}", e)))?;

        let secret = match token_response.access_token.as_deref() {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => {
                return Err(Error::Authentication(format!(
                    "Failed to retrieve access token for resource: {}",
                    resource
                )))
            }
        };

        let token = AccessToken::new(secret, token_response.expires_at(Utc::now()));
        self.store(key, &token);
        Ok(token)
    }

    fn cached(&self, key: &TokenCacheKey) -> Option<AccessToken> {
        let cache = self.cache.as_ref()?;
        let guard = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let token = guard
            .get(key)
            .filter(|token| token.is_fresh(Utc::now()))
            .cloned();
        token
    }

    fn store(&self, key: TokenCacheKey, token: &AccessToken) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        // Tokens without a known expiry are never reused
        if token.expires_at.is_none() {
            return;
        }
        let mut guard = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.insert(key, token.clone());
    }
}
