use config::{Config, ConfigError, Environment};
use myco_eventhub::parse_entity_path;
use serde::Deserialize;

/// Environment-driven configuration. Required variables fail the load;
/// the batching and dedup knobs fall back to their defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    pub iothub_eventhub_connection_string: String,

    /// Explicit hub name; otherwise taken from `EntityPath=` in the
    /// connection string.
    #[serde(default)]
    pub eventhub_name: Option<String>,

    #[serde(default = "default_consumer_group")]
    pub eventhub_consumer_group: String,

    pub device_registry_path: String,

    pub adx_ingest_uri: String,
    pub adx_database: String,
    pub adx_raw_table: String,
    pub adx_raw_mapping: String,
    pub adx_tenant_id: String,
    pub adx_client_id: String,
    pub adx_client_secret: String,

    /// Flush once this many records are batched.
    #[serde(default = "default_batch_max_events")]
    pub batch_max_events: usize,

    /// Flush at least this often, in milliseconds.
    #[serde(default = "default_batch_max_ms")]
    pub batch_max_ms: u64,

    /// Sliding dedup window, in milliseconds.
    #[serde(default = "default_dedup_ttl_ms")]
    pub dedup_ttl_ms: u64,
}

fn default_consumer_group() -> String {
    "$Default".to_string()
}

fn default_batch_max_events() -> usize {
    200
}

fn default_batch_max_ms() -> u64 {
    2_000
}

fn default_dedup_ttl_ms() -> u64 {
    // 48 hours.
    172_800_000
}

impl IngestConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::default())
            .build()?
            .try_deserialize()
    }

    pub fn event_hub_name(&self) -> Option<String> {
        self.eventhub_name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| parse_entity_path(&self.iothub_eventhub_connection_string))
    }
}
