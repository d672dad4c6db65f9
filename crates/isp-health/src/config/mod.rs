//! Monitor configuration.
//!
//! One [`MonitorConfig`] value is supplied at startup and replaced wholesale
//! on change. It is validated before any timer is armed.

mod methods;
mod types;
mod validation;

pub use types::{
    DnsConfigSettings, DnsReliabilitySettings, IdentityConfig, IpInfoSettings, MonitorConfig,
    ProbeTarget, ProviderConfig, RateLimit, RoundTripSettings, RouteStabilitySettings, Schedule,
    SensorsConfig, ThroughputSettings,
};
