//! Configuration types for the monitor.
//!
//! Every field carries a default so an empty document is a working
//! zero-configuration setup.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identity::ProviderKind;
use crate::sensor::SensorType;

fn default_true() -> bool {
    true
}

/// One host or address probed by a sensor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "TargetSpec")]
pub struct ProbeTarget {
    /// Hostname or IP address (optionally `ip:port` for DNS servers)
    pub address: String,

    /// Human readable name used in attributes
    pub label: String,
}

impl ProbeTarget {
    /// Target labelled with its own address
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        Self { label: address.clone(), address }
    }

    pub fn labelled(address: impl Into<String>, label: impl Into<String>) -> Self {
        Self { address: address.into(), label: label.into() }
    }
}

/// Accepts either `"8.8.8.8"` or `{ address = "8.8.8.8", label = "Google" }`
#[derive(Deserialize)]
#[serde(untagged)]
enum TargetSpec {
    Bare(String),
    Full { address: String, label: Option<String> },
}

impl From<TargetSpec> for ProbeTarget {
    fn from(spec: TargetSpec) -> Self {
        match spec {
            TargetSpec::Bare(address) => ProbeTarget::new(address),
            TargetSpec::Full { address, label: Some(label) } => ProbeTarget::labelled(address, label),
            TargetSpec::Full { address, label: None } => ProbeTarget::new(address),
        }
    }
}

fn targets(addresses: &[&str]) -> Vec<ProbeTarget> {
    addresses.iter().copied().map(ProbeTarget::new).collect()
}

/// Enablement and timer period shared by every sensor section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Falls back to the sensor type's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self { enabled: true, interval_seconds: None }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IpInfoSettings {
    #[serde(flatten)]
    pub schedule: Schedule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfigSettings {
    #[serde(flatten)]
    pub schedule: Schedule,

    /// Files scanned in order for upstream `nameserver` lines
    pub resolv_conf_paths: Vec<PathBuf>,

    /// Name resolved against the primary server to confirm it works
    pub test_name: String,

    pub timeout_ms: u64,
}

impl Default for DnsConfigSettings {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            resolv_conf_paths: vec![
                PathBuf::from("/etc/resolv.conf"),
                PathBuf::from("/run/systemd/resolve/resolv.conf"),
            ],
            test_name: "google.com".to_string(),
            timeout_ms: 2000,
        }
    }
}

impl DnsConfigSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Settings shared by the latency, packet loss and jitter sensors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundTripSettings {
    #[serde(flatten)]
    pub schedule: Schedule,

    pub targets: Vec<ProbeTarget>,

    /// Echo attempts per target and run; defaults depend on the sensor type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,

    /// Wait for each echo reply
    pub timeout_ms: u64,
}

impl Default for RoundTripSettings {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            targets: targets(&["8.8.8.8", "1.1.1.1"]),
            count: None,
            timeout_ms: 1000,
        }
    }
}

impl RoundTripSettings {
    pub fn count(&self, sensor: SensorType) -> u32 {
        self.count.unwrap_or(match sensor {
            SensorType::Latency => 4,
            _ => 10,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThroughputSettings {
    #[serde(flatten)]
    pub schedule: Schedule,

    /// Base URL of the speed test service
    pub endpoint: String,

    pub download_bytes: u64,
    pub upload_bytes: u64,

    /// Bound on the whole test (latency, download and upload)
    pub timeout_secs: u64,
}

impl Default for ThroughputSettings {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            endpoint: "https://speed.cloudflare.com".to_string(),
            download_bytes: 25_000_000,
            upload_bytes: 10_000_000,
            timeout_secs: 60,
        }
    }
}

impl ThroughputSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsReliabilitySettings {
    #[serde(flatten)]
    pub schedule: Schedule,

    /// Resolvers under test, `ip` or `ip:port`
    pub servers: Vec<ProbeTarget>,

    /// Names queried against every server
    pub queries: Vec<String>,

    pub timeout_ms: u64,
}

impl Default for DnsReliabilitySettings {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            servers: targets(&["8.8.8.8", "1.1.1.1"]),
            queries: vec!["google.com".into(), "cloudflare.com".into(), "github.com".into()],
            timeout_ms: 2000,
        }
    }
}

impl DnsReliabilitySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteStabilitySettings {
    #[serde(flatten)]
    pub schedule: Schedule,

    pub targets: Vec<ProbeTarget>,
    pub max_hops: u32,
    pub hop_timeout_secs: u64,

    /// Bound on one complete trace
    pub timeout_secs: u64,

    /// Snapshots kept per target for change detection
    pub history: usize,
}

impl Default for RouteStabilitySettings {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            targets: targets(&["google.com", "cloudflare.com"]),
            max_hops: 15,
            hop_timeout_secs: 2,
            timeout_secs: 30,
            history: 5,
        }
    }
}

impl RouteStabilitySettings {
    pub fn hop_timeout(&self) -> Duration {
        Duration::from_secs(self.hop_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    pub ip_info: IpInfoSettings,
    pub dns_config: DnsConfigSettings,
    pub latency: RoundTripSettings,
    pub packet_loss: RoundTripSettings,
    pub jitter: RoundTripSettings,
    pub throughput: ThroughputSettings,
    pub dns_reliability: DnsReliabilitySettings,
    pub route_stability: RouteStabilitySettings,
}

/// Requests allowed per period for one identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests: u32,
    pub period_secs: u64,
}

impl RateLimit {
    pub fn new(requests: u32, period_secs: u64) -> Self {
        Self { requests, period_secs }
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self { requests: 60, period_secs: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API key or token, when the provider takes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,

    /// Falls back to the provider's documented free tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), enabled: true, credential: None, rate_limit: None }
    }

    pub fn effective_rate_limit(&self) -> RateLimit {
        self.rate_limit
            .or_else(|| ProviderKind::from_name(&self.name).map(|kind| kind.default_rate_limit()))
            .unwrap_or_default()
    }

    pub fn has_credential(&self) -> bool {
        self.credential.as_deref().is_some_and(|credential| !credential.trim().is_empty())
    }
}

/// Aliases such as `ip-api` and `ipapi` name the same provider
fn same_provider(a: &str, b: &str) -> bool {
    match (ProviderKind::from_name(a), ProviderKind::from_name(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Preferred provider, tried before the rest of the chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Credential for the preferred provider when its entry has none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,

    /// Bound on each provider lookup
    pub timeout_secs: u64,

    /// Providers in priority order
    pub providers: Vec<ProviderConfig>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            source: None,
            credential: None,
            timeout_secs: 5,
            providers: ProviderKind::ALL
                .iter()
                .map(|kind| ProviderConfig::new(kind.name()))
                .collect(),
        }
    }
}

impl IdentityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Providers in the order the chain tries them
    ///
    /// The preferred `source` moves to the front and receives `credential`
    /// unless its own entry already carries one.
    pub fn ordered_providers(&self) -> Vec<ProviderConfig> {
        let mut providers = self.providers.clone();
        let Some(source) = self.source.as_deref() else {
            return providers;
        };

        let preferred = match providers.iter().position(|provider| same_provider(&provider.name, source)) {
            Some(position) => providers.remove(position),
            None => ProviderConfig::new(ProviderKind::from_name(source).map_or(source, |kind| kind.name())),
        };
        let preferred = ProviderConfig {
            credential: preferred.credential.clone().or_else(|| self.credential.clone()),
            ..preferred
        };
        providers.insert(0, preferred);
        providers
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Cap on per-run target parallelism
    pub max_concurrency: usize,

    pub identity: IdentityConfig,
    pub sensors: SensorsConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            identity: IdentityConfig::default(),
            sensors: SensorsConfig::default(),
        }
    }
}
