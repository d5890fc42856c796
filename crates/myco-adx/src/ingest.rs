//! The ingest call itself.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::auth::AadTokenProvider;

/// Upper bound on one ingest call, flush-context equivalent.
pub const INGEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Destination for one flush worth of newline-delimited JSON records.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn ingest(&self, payload: Bytes, record_count: usize) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct AdxIngestConfig {
    pub ingest_uri: String,
    pub database: String,
    pub table: String,
    pub mapping: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Streaming-ingest client bound to one database/table/mapping. Cloned
/// handles share the HTTP pool and token cache, so overlapping flushes are
/// independent calls.
#[derive(Clone)]
pub struct AdxIngestClient {
    http: reqwest::Client,
    ingest_url: String,
    tokens: Arc<AadTokenProvider>,
}

impl AdxIngestClient {
    pub fn new(config: AdxIngestConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(INGEST_TIMEOUT)
            .build()
            .context("failed to build ingest http client")?;
        let ingest_url = build_ingest_url(
            &config.ingest_uri,
            &config.database,
            &config.table,
            &config.mapping,
        );
        let tokens = AadTokenProvider::new(
            http.clone(),
            &config.tenant_id,
            config.client_id,
            config.client_secret,
            &config.ingest_uri,
        );
        Ok(Self {
            http,
            ingest_url,
            tokens: Arc::new(tokens),
        })
    }
}

fn build_ingest_url(ingest_uri: &str, database: &str, table: &str, mapping: &str) -> String {
    format!(
        "{}/v1/rest/ingest/{}/{}?streamFormat=MultiJSON&mappingName={}",
        ingest_uri.trim_end_matches('/'),
        database,
        table,
        mapping
    )
}

#[async_trait]
impl RecordSink for AdxIngestClient {
    async fn ingest(&self, payload: Bytes, record_count: usize) -> Result<()> {
        let token = self.tokens.bearer_token().await?;
        let response = self
            .http
            .post(&self.ingest_url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(payload)
            .send()
            .await
            .context("ingest request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("ingest rejected with {status}: {body}");
        }
        debug!(records = record_count, "ingested record batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_url_carries_format_and_mapping() {
        assert_eq!(
            build_ingest_url(
                "https://ingest-cluster.kusto.windows.net/",
                "telemetry",
                "RawEnvelopes",
                "raw-envelope-v1",
            ),
            "https://ingest-cluster.kusto.windows.net/v1/rest/ingest/telemetry/RawEnvelopes?streamFormat=MultiJSON&mappingName=raw-envelope-v1"
        );
    }

    #[test]
    fn ingest_url_without_trailing_slash_is_unchanged() {
        let url = build_ingest_url("https://x.net", "db", "t", "m");
        assert_eq!(
            url,
            "https://x.net/v1/rest/ingest/db/t?streamFormat=MultiJSON&mappingName=m"
        );
    }
}
