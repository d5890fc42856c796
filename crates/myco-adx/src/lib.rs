//! Azure Data Explorer streaming ingestion.
//!
//! One flush of the ingest pipeline becomes one `MultiJSON` streaming-ingest
//! call carrying newline-delimited records, addressed to a fixed
//! database/table/mapping configured at client construction. Authentication
//! is an AAD client-credentials grant with an in-process token cache.

pub mod auth;
pub mod ingest;

pub use auth::AadTokenProvider;
pub use ingest::{AdxIngestClient, AdxIngestConfig, RecordSink, INGEST_TIMEOUT};

#[cfg(any(test, feature = "testing"))]
pub use ingest::MockRecordSink;
