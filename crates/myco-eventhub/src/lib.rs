//! Event Hubs partition consumption, behind narrow traits.
//!
//! The ingest pipeline only needs two operations from the broker: enumerate
//! partitions and pull bounded batches of framed payloads from one
//! partition. Everything AMQP-specific stays inside the adapter in
//! [`client`]; the rest of the workspace works (and is tested) against the
//! traits in [`traits`].

pub mod client;
pub mod connection;
pub mod traits;

pub use client::EventHubSource;
pub use connection::parse_entity_path;
pub use traits::{PartitionReceiver, PartitionSource, ReceivedEvent};

#[cfg(any(test, feature = "testing"))]
pub use traits::{MockPartitionReceiver, MockPartitionSource};
