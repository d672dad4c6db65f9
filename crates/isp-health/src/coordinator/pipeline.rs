//! One probe-and-reduce pass for a sensor type.

use crate::aggregate::{self, Measurement, RouteHistory};
use crate::config::{MonitorConfig, RoundTripSettings};
use crate::error::ProbeError;
use crate::probe::{self, dns::server_addr};
use crate::sensor::SensorType;

use super::Probes;

fn round_trip_settings(config: &MonitorConfig, sensor: SensorType) -> &RoundTripSettings {
    match sensor {
        SensorType::PacketLoss => &config.sensors.packet_loss,
        SensorType::Jitter => &config.sensors.jitter,
        _ => &config.sensors.latency,
    }
}

/// Probe, then reduce; never fails, failures become the measurement
pub(crate) async fn run(
    sensor: SensorType,
    config: &MonitorConfig,
    probes: &Probes,
    history: &RouteHistory,
) -> Measurement {
    let concurrency = config.max_concurrency;

    match sensor {
        SensorType::IpInfo => aggregate::identity(probes.identity.resolve_identity(&config.identity).await),

        SensorType::DnsConfig => {
            let settings = &config.sensors.dns_config;
            let detected = probes.system_dns.detect(settings).await;
            let resolution = match detected.primary().map(server_addr) {
                Some(Ok(server)) => probes.dns.query(server, &settings.test_name, settings.timeout()).await,
                Some(Err(err)) => Err(err),
                None => Err(ProbeError::ResourceUnavailable("no DNS server detected".to_string())),
            };
            aggregate::dns_config(&detected, resolution)
        }

        SensorType::Latency | SensorType::PacketLoss | SensorType::Jitter => {
            let settings = round_trip_settings(config, sensor);
            let results = probe::measure_round_trips(
                probes.pinger.as_ref(),
                &settings.targets,
                settings.count(sensor),
                settings.timeout(),
                concurrency,
            )
            .await;

            match results {
                Ok(results) => match sensor {
                    SensorType::Latency => aggregate::latency(&results),
                    SensorType::PacketLoss => aggregate::packet_loss(&results),
                    _ => aggregate::jitter(&results),
                },
                Err(err) => Measurement::from_error(&err),
            }
        }

        SensorType::Throughput => {
            aggregate::throughput(probes.bandwidth.measure_throughput(&config.sensors.throughput).await)
        }

        SensorType::DnsReliability => {
            let settings = &config.sensors.dns_reliability;
            let results = probe::measure_dns(
                probes.dns.as_ref(),
                &settings.servers,
                &settings.queries,
                settings.timeout(),
                concurrency,
            )
            .await;
            aggregate::reliability(&results)
        }

        SensorType::RouteStability => {
            let settings = &config.sensors.route_stability;
            let outcomes = probe::trace_targets(probes.tracer.as_ref(), settings, concurrency).await;
            aggregate::route_stability(&history.record_outcomes(outcomes, settings.history))
        }
    }
}
