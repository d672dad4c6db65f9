//! Configuration validation, run before any timer is armed.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use super::types::{MonitorConfig, ProbeTarget};
use crate::error::ConfigError;
use crate::identity::ProviderKind;
use crate::sensor::SensorType;

impl MonitorConfig {
    /// Check every bound; returns the first violation found
    pub fn validate(&self) -> Result<(), ConfigError> {
        in_range("max_concurrency", self.max_concurrency as u64, 1, 64)?;

        for sensor in SensorType::ALL {
            validate_interval(sensor, self.interval_secs(sensor))?;
        }

        for sensor in [SensorType::Latency, SensorType::PacketLoss, SensorType::Jitter] {
            let settings = match sensor {
                SensorType::Latency => &self.sensors.latency,
                SensorType::PacketLoss => &self.sensors.packet_loss,
                _ => &self.sensors.jitter,
            };
            in_range("count", u64::from(settings.count(sensor)), 1, 100)?;
            in_range("timeout_ms", settings.timeout_ms, 100, 10_000)?;
            if settings.schedule.enabled {
                validate_hosts(sensor, &settings.targets)?;
            }
        }

        let dns = &self.sensors.dns_reliability;
        in_range("dns_reliability.timeout_ms", dns.timeout_ms, 100, 10_000)?;
        if dns.schedule.enabled {
            validate_servers(&dns.servers)?;
            if dns.queries.is_empty() {
                return Err(ConfigError::EmptyTargets(SensorType::DnsReliability));
            }
        }

        let route = &self.sensors.route_stability;
        in_range("max_hops", u64::from(route.max_hops), 5, 30)?;
        in_range("hop_timeout_secs", route.hop_timeout_secs, 1, 10)?;
        in_range("route_stability.timeout_secs", route.timeout_secs, 10, 120)?;
        in_range("history", route.history as u64, 2, 20)?;
        if route.schedule.enabled {
            validate_hosts(SensorType::RouteStability, &route.targets)?;
        }

        let throughput = &self.sensors.throughput;
        in_range("throughput.timeout_secs", throughput.timeout_secs, 10, 120)?;
        in_range("download_bytes", throughput.download_bytes, 1_000_000, 1_000_000_000)?;
        in_range("upload_bytes", throughput.upload_bytes, 1_000_000, 1_000_000_000)?;
        if url::Url::parse(&throughput.endpoint).is_err() {
            return Err(ConfigError::InvalidTarget {
                sensor: SensorType::Throughput,
                target: throughput.endpoint.clone(),
                reason: "not a valid URL".to_string(),
            });
        }

        in_range("dns_config.timeout_ms", self.sensors.dns_config.timeout_ms, 100, 10_000)?;

        self.validate_identity()
    }

    fn validate_identity(&self) -> Result<(), ConfigError> {
        in_range("identity.timeout_secs", self.identity.timeout_secs, 1, 30)?;

        let providers = self.identity.ordered_providers();
        let mut seen = HashSet::new();
        let mut credential_free = false;
        for provider in &providers {
            let kind = ProviderKind::from_name(&provider.name)
                .ok_or_else(|| ConfigError::UnknownProvider(provider.name.clone()))?;
            if !seen.insert(kind) {
                return Err(ConfigError::DuplicateProvider(provider.name.clone()));
            }
            let rate_limit = provider.effective_rate_limit();
            in_range("rate_limit.requests", u64::from(rate_limit.requests), 1, u64::from(u32::MAX))?;
            in_range("rate_limit.period_secs", rate_limit.period_secs, 1, 31 * 86_400)?;
            if provider.enabled && !kind.requires_credential() {
                credential_free = true;
            }
        }

        if credential_free { Ok(()) } else { Err(ConfigError::NoCredentialFreeProvider) }
    }
}

fn validate_interval(sensor: SensorType, interval: u64) -> Result<(), ConfigError> {
    let (min, max) = sensor.interval_bounds();
    if interval < min || interval > max {
        return Err(ConfigError::InvalidInterval { sensor, interval, min, max });
    }
    Ok(())
}

fn in_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange { field, value, min, max });
    }
    Ok(())
}

/// Hostnames end up as command arguments, so they must not look like flags
fn validate_hosts(sensor: SensorType, targets: &[ProbeTarget]) -> Result<(), ConfigError> {
    if targets.is_empty() {
        return Err(ConfigError::EmptyTargets(sensor));
    }

    for target in targets {
        let address = target.address.as_str();
        let reason = if address.is_empty() {
            Some("empty address")
        } else if address.starts_with('-') {
            Some("address must not start with '-'")
        } else if address.chars().any(|c| c.is_whitespace() || c.is_control()) {
            Some("address contains whitespace")
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(ConfigError::InvalidTarget {
                sensor,
                target: target.address.clone(),
                reason: reason.to_string(),
            });
        }
    }
    validate_unique(sensor, targets)
}

fn validate_servers(servers: &[ProbeTarget]) -> Result<(), ConfigError> {
    if servers.is_empty() {
        return Err(ConfigError::EmptyTargets(SensorType::DnsReliability));
    }

    for server in servers {
        let address = server.address.as_str();
        if address.parse::<SocketAddr>().is_err() && address.parse::<IpAddr>().is_err() {
            return Err(ConfigError::InvalidTarget {
                sensor: SensorType::DnsReliability,
                target: server.address.clone(),
                reason: "expected an IP address or ip:port".to_string(),
            });
        }
    }
    validate_unique(SensorType::DnsReliability, servers)
}

/// Readings key per-target detail by label, and route history by address
fn validate_unique(sensor: SensorType, targets: &[ProbeTarget]) -> Result<(), ConfigError> {
    let mut addresses = HashSet::new();
    let mut labels = HashSet::new();
    for target in targets {
        let reason = if !addresses.insert(target.address.as_str()) {
            "duplicate address"
        } else if !labels.insert(target.label.as_str()) {
            "duplicate label"
        } else {
            continue;
        };
        return Err(ConfigError::InvalidTarget {
            sensor,
            target: target.address.clone(),
            reason: reason.to_string(),
        });
    }
    Ok(())
}
