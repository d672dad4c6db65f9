//! Accessors and builder-style helpers for [`MonitorConfig`].

use std::time::Duration;

use super::types::{MonitorConfig, ProbeTarget, ProviderConfig, Schedule, SensorsConfig};
use crate::error::ConfigError;
use crate::sensor::SensorType;

impl SensorsConfig {
    pub fn schedule(&self, sensor: SensorType) -> &Schedule {
        match sensor {
            SensorType::IpInfo => &self.ip_info.schedule,
            SensorType::DnsConfig => &self.dns_config.schedule,
            SensorType::Latency => &self.latency.schedule,
            SensorType::PacketLoss => &self.packet_loss.schedule,
            SensorType::Jitter => &self.jitter.schedule,
            SensorType::Throughput => &self.throughput.schedule,
            SensorType::DnsReliability => &self.dns_reliability.schedule,
            SensorType::RouteStability => &self.route_stability.schedule,
        }
    }

    pub fn schedule_mut(&mut self, sensor: SensorType) -> &mut Schedule {
        match sensor {
            SensorType::IpInfo => &mut self.ip_info.schedule,
            SensorType::DnsConfig => &mut self.dns_config.schedule,
            SensorType::Latency => &mut self.latency.schedule,
            SensorType::PacketLoss => &mut self.packet_loss.schedule,
            SensorType::Jitter => &mut self.jitter.schedule,
            SensorType::Throughput => &mut self.throughput.schedule,
            SensorType::DnsReliability => &mut self.dns_reliability.schedule,
            SensorType::RouteStability => &mut self.route_stability.schedule,
        }
    }

    /// Target list of the sensor types that probe targets
    pub fn targets(&self, sensor: SensorType) -> Option<&[ProbeTarget]> {
        match sensor {
            SensorType::Latency => Some(&self.latency.targets),
            SensorType::PacketLoss => Some(&self.packet_loss.targets),
            SensorType::Jitter => Some(&self.jitter.targets),
            SensorType::DnsReliability => Some(&self.dns_reliability.servers),
            SensorType::RouteStability => Some(&self.route_stability.targets),
            SensorType::IpInfo | SensorType::DnsConfig | SensorType::Throughput => None,
        }
    }

    fn targets_mut(&mut self, sensor: SensorType) -> Option<&mut Vec<ProbeTarget>> {
        match sensor {
            SensorType::Latency => Some(&mut self.latency.targets),
            SensorType::PacketLoss => Some(&mut self.packet_loss.targets),
            SensorType::Jitter => Some(&mut self.jitter.targets),
            SensorType::DnsReliability => Some(&mut self.dns_reliability.servers),
            SensorType::RouteStability => Some(&mut self.route_stability.targets),
            SensorType::IpInfo | SensorType::DnsConfig | SensorType::Throughput => None,
        }
    }
}

impl MonitorConfig {
    /// Parse a TOML document; validation is a separate step
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        toml::from_str(document).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn is_enabled(&self, sensor: SensorType) -> bool {
        self.sensors.schedule(sensor).enabled
    }

    pub fn interval_secs(&self, sensor: SensorType) -> u64 {
        self.sensors
            .schedule(sensor)
            .interval_seconds
            .unwrap_or_else(|| sensor.default_interval_secs())
    }

    pub fn interval(&self, sensor: SensorType) -> Duration {
        Duration::from_secs(self.interval_secs(sensor))
    }

    pub fn enabled_sensors(&self) -> Vec<SensorType> {
        SensorType::ALL.into_iter().filter(|sensor| self.is_enabled(*sensor)).collect()
    }

    /// Enable or disable one sensor type
    pub fn with_sensor(mut self, sensor: SensorType, enabled: bool) -> Self {
        self.sensors.schedule_mut(sensor).enabled = enabled;
        self
    }

    /// Enable exactly the given sensor types
    pub fn with_only(mut self, sensors: &[SensorType]) -> Self {
        for sensor in SensorType::ALL {
            self.sensors.schedule_mut(sensor).enabled = sensors.contains(&sensor);
        }
        self
    }

    pub fn with_interval(mut self, sensor: SensorType, seconds: u64) -> Self {
        self.sensors.schedule_mut(sensor).interval_seconds = Some(seconds);
        self
    }

    /// Replace the targets of a target-probing sensor type; ignored otherwise
    pub fn with_targets(mut self, sensor: SensorType, targets: Vec<ProbeTarget>) -> Self {
        if let Some(slot) = self.sensors.targets_mut(sensor) {
            *slot = targets;
        }
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    pub fn with_identity_providers(mut self, providers: Vec<ProviderConfig>) -> Self {
        self.identity.providers = providers;
        self
    }
}
