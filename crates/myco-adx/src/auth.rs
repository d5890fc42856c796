//! AAD client-credentials token provider.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Tokens are refreshed this long before their reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// OAuth2 client-credentials grant against the AAD v2 token endpoint,
/// scoped to the ingest cluster. Concurrent flushes share one cached token.
pub struct AadTokenProvider {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

impl AadTokenProvider {
    pub fn new(
        http: reqwest::Client,
        tenant_id: &str,
        client_id: String,
        client_secret: String,
        resource: &str,
    ) -> Self {
        Self {
            http,
            token_url: format!("https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token"),
            client_id,
            client_secret,
            scope: format!("{}/.default", resource.trim_end_matches('/')),
            cached: Mutex::new(None),
        }
    }

    pub async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if Instant::now() < entry.expires_at {
                return Ok(entry.token.clone());
            }
        }

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await
            .context("token request failed")?
            .error_for_status()
            .context("token endpoint rejected credentials")?
            .json::<TokenResponse>()
            .await
            .context("malformed token response")?;

        let lifetime =
            Duration::from_secs(response.expires_in).saturating_sub(REFRESH_MARGIN);
        let token = response.access_token.clone();
        *cached = Some(CachedToken {
            token: response.access_token,
            expires_at: Instant::now() + lifetime,
        });
        Ok(token)
    }
}
