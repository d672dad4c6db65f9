//! ISP Health - probing and aggregation engine for internet connection health
//!
//! This library runs independent, interval-governed network probes (ICMP
//! echo, DNS queries, traceroute, bandwidth tests and public identity
//! lookups) and reduces their raw samples into timestamped sensor readings
//! that consumers pull on demand or receive as push notifications.

pub mod aggregate;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod probe;
pub mod sensor;
pub mod store;

// Re-export main types
pub use config::{MonitorConfig, ProbeTarget};
pub use coordinator::{Coordinator, Probes, RunState, Trigger};
pub use error::{ConfigError, Error, IdentityError, ProbeError};
pub use identity::{IdentityRecord, ProviderChain};
pub use sensor::{Attributes, SensorReading, SensorStatus, SensorType, SensorValue};
pub use store::ReadingStore;

/// Result type used by the public coordinator API
pub type Result<T> = std::result::Result<T, Error>;
