use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Kind of measurement published by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    IpInfo,
    DnsConfig,
    Latency,
    PacketLoss,
    Jitter,
    Throughput,
    DnsReliability,
    RouteStability,
}

impl SensorType {
    pub const ALL: [SensorType; 8] = [
        SensorType::IpInfo,
        SensorType::DnsConfig,
        SensorType::Latency,
        SensorType::PacketLoss,
        SensorType::Jitter,
        SensorType::Throughput,
        SensorType::DnsReliability,
        SensorType::RouteStability,
    ];

    /// Position in [`SensorType::ALL`]
    pub fn index(&self) -> usize {
        match self {
            SensorType::IpInfo => 0,
            SensorType::DnsConfig => 1,
            SensorType::Latency => 2,
            SensorType::PacketLoss => 3,
            SensorType::Jitter => 4,
            SensorType::Throughput => 5,
            SensorType::DnsReliability => 6,
            SensorType::RouteStability => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::IpInfo => "ip_info",
            SensorType::DnsConfig => "dns_config",
            SensorType::Latency => "latency",
            SensorType::PacketLoss => "packet_loss",
            SensorType::Jitter => "jitter",
            SensorType::Throughput => "throughput",
            SensorType::DnsReliability => "dns_reliability",
            SensorType::RouteStability => "route_stability",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SensorType::IpInfo => "Public WAN IP",
            SensorType::DnsConfig => "WAN DNS Server",
            SensorType::Latency => "WAN Latency",
            SensorType::PacketLoss => "WAN Packet Loss",
            SensorType::Jitter => "WAN Jitter",
            SensorType::Throughput => "WAN Throughput",
            SensorType::DnsReliability => "DNS Reliability",
            SensorType::RouteStability => "Route Stability",
        }
    }

    /// Unit of the reading state, `None` for textual states
    pub fn unit(&self) -> Option<&'static str> {
        match self {
            SensorType::IpInfo | SensorType::DnsConfig => None,
            SensorType::Latency | SensorType::Jitter => Some("ms"),
            SensorType::PacketLoss | SensorType::DnsReliability => Some("%"),
            SensorType::Throughput => Some("Mbit/s"),
            SensorType::RouteStability => Some("score"),
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.unit().is_some()
    }

    pub fn default_interval_secs(&self) -> u64 {
        match self {
            SensorType::IpInfo | SensorType::DnsConfig | SensorType::Latency => 60,
            SensorType::PacketLoss | SensorType::Jitter => 120,
            SensorType::Throughput => 3600,
            SensorType::DnsReliability => 180,
            SensorType::RouteStability => 1800,
        }
    }

    /// Inclusive bounds accepted for `interval_seconds`
    pub fn interval_bounds(&self) -> (u64, u64) {
        match self {
            SensorType::Throughput => (3600, 86_400),
            SensorType::RouteStability => (30, 3600),
            _ => (30, 600),
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown sensor type {0:?}")]
pub struct UnknownSensorType(pub String);

impl FromStr for SensorType {
    type Err = UnknownSensorType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        SensorType::ALL
            .into_iter()
            .find(|sensor| sensor.as_str() == value)
            .ok_or_else(|| UnknownSensorType(value.to_string()))
    }
}

/// Outcome of the sub-probes behind one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    Ok,
    Degraded,
    Error,
}

impl SensorStatus {
    /// All sub-probes succeeded, some did, or none did
    pub fn from_counts(succeeded: usize, total: usize) -> Self {
        if succeeded == 0 || total == 0 {
            SensorStatus::Error
        } else if succeeded >= total {
            SensorStatus::Ok
        } else {
            SensorStatus::Degraded
        }
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorStatus::Ok => write!(f, "ok"),
            SensorStatus::Degraded => write!(f, "degraded"),
            SensorStatus::Error => write!(f, "error"),
        }
    }
}

/// Scalar state of a reading; `Unknown` serializes as `null`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Number(f64),
    Text(String),
    Unknown,
}

impl SensorValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SensorValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SensorValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Number(value) => write!(f, "{value}"),
            SensorValue::Text(value) => f.write_str(value),
            SensorValue::Unknown => f.write_str("unknown"),
        }
    }
}

pub type Attributes = BTreeMap<String, Value>;

/// Latest published value for one sensor type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Sensor type this reading belongs to
    pub sensor_type: SensorType,

    /// When the run that produced this reading completed
    pub timestamp: DateTime<Utc>,

    /// Headline value (number or string)
    pub state: SensorValue,

    /// Per-target detail and diagnostics
    pub attributes: Attributes,

    /// Whether all, some or none of the sub-probes succeeded
    pub status: SensorStatus,
}

impl SensorReading {
    pub fn new(
        sensor_type: SensorType,
        state: SensorValue,
        attributes: Attributes,
        status: SensorStatus,
    ) -> Self {
        Self { sensor_type, timestamp: Utc::now(), state, attributes, status }
    }

    /// True when the attributes were carried forward from an earlier run
    pub fn is_stale(&self) -> bool {
        matches!(self.attributes.get("stale"), Some(Value::Bool(true)))
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}
