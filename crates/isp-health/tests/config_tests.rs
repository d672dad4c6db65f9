//! Configuration parsing and validation

mod common;

use isp_health::config::{ProviderConfig, RateLimit};
use isp_health::{ConfigError, Coordinator, Error, MonitorConfig, ProbeTarget, SensorType};

#[test]
fn test_empty_document_is_valid_default() {
    let config = MonitorConfig::from_toml_str("").unwrap();
    assert_eq!(config, MonitorConfig::default());
    assert!(config.validate().is_ok());
    assert_eq!(config.enabled_sensors().len(), SensorType::ALL.len());
    assert_eq!(config.interval_secs(SensorType::Throughput), 3600);
    assert_eq!(config.interval_secs(SensorType::RouteStability), 1800);
}

#[test]
fn test_parse_sections() {
    let document = r#"
        max_concurrency = 2

        [identity]
        source = "ipinfo"
        credential = "secret"

        [sensors.latency]
        interval_seconds = 45
        count = 6
        targets = ["9.9.9.9", { address = "1.1.1.1", label = "Cloudflare" }]

        [sensors.throughput]
        enabled = false

        [sensors.dns_reliability]
        servers = ["8.8.8.8", "127.0.0.1:5353"]
        queries = ["example.com"]
    "#;
    let config = MonitorConfig::from_toml_str(document).unwrap();
    config.validate().unwrap();

    assert_eq!(config.max_concurrency, 2);
    assert_eq!(config.interval_secs(SensorType::Latency), 45);
    assert_eq!(config.sensors.latency.count(SensorType::Latency), 6);
    assert_eq!(config.sensors.latency.targets[1], ProbeTarget::labelled("1.1.1.1", "Cloudflare"));
    assert!(!config.is_enabled(SensorType::Throughput));
    assert_eq!(config.sensors.packet_loss.count(SensorType::PacketLoss), 10);

    let providers = config.identity.ordered_providers();
    assert_eq!(providers[0].name, "ipinfo");
    assert_eq!(providers[0].credential.as_deref(), Some("secret"));
    assert_eq!(providers.len(), 3);
}

#[test]
fn test_malformed_document() {
    let error = MonitorConfig::from_toml_str("[sensors.latency]\ncount = \"many\"").unwrap_err();
    assert!(matches!(error, ConfigError::Parse(_)));
}

#[test]
fn test_throughput_interval_floor() {
    let config = MonitorConfig::default().with_interval(SensorType::Throughput, 1800);
    assert_eq!(
        config.validate(),
        Err(ConfigError::InvalidInterval { sensor: SensorType::Throughput, interval: 1800, min: 3600, max: 86_400 })
    );
}

#[tokio::test]
async fn test_start_rejects_short_throughput_interval() {
    let config = MonitorConfig::default().with_interval(SensorType::Throughput, 1800);
    let result = Coordinator::start(config, common::default_probes());

    match result {
        Err(Error::InvalidConfiguration(ConfigError::InvalidInterval { sensor, interval, .. })) => {
            assert_eq!(sensor, SensorType::Throughput);
            assert_eq!(interval, 1800);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("configuration should have been rejected"),
    }
}

#[test]
fn test_interval_bounds_per_sensor() {
    assert!(MonitorConfig::default().with_interval(SensorType::Latency, 29).validate().is_err());
    assert!(MonitorConfig::default().with_interval(SensorType::Latency, 600).validate().is_ok());
    assert!(MonitorConfig::default().with_interval(SensorType::Jitter, 601).validate().is_err());
    assert!(MonitorConfig::default().with_interval(SensorType::Throughput, 86_400).validate().is_ok());
    assert!(MonitorConfig::default().with_interval(SensorType::RouteStability, 3600).validate().is_ok());
}

#[test]
fn test_empty_targets_rejected_only_when_enabled() {
    let config = MonitorConfig::default().with_targets(SensorType::Latency, Vec::new());
    assert_eq!(config.validate(), Err(ConfigError::EmptyTargets(SensorType::Latency)));

    let config = config.with_sensor(SensorType::Latency, false);
    assert!(config.validate().is_ok());
}

#[test]
fn test_flag_like_target_rejected() {
    let config = MonitorConfig::default().with_targets(SensorType::RouteStability, vec![ProbeTarget::new("-f")]);
    assert!(matches!(config.validate(), Err(ConfigError::InvalidTarget { sensor: SensorType::RouteStability, .. })));
}

#[test]
fn test_dns_servers_must_be_addresses() {
    let config = MonitorConfig::default().with_targets(SensorType::DnsReliability, vec![ProbeTarget::new("dns.google")]);
    assert!(matches!(config.validate(), Err(ConfigError::InvalidTarget { .. })));
}

#[test]
fn test_range_checks() {
    let mut config = MonitorConfig::default();
    config.sensors.route_stability.max_hops = 40;
    assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { field: "max_hops", .. })));

    let config = MonitorConfig::default().with_max_concurrency(0);
    assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { field: "max_concurrency", .. })));
}

#[test]
fn test_identity_chain_needs_credential_free_provider() {
    let config = MonitorConfig::default().with_identity_providers(vec![ProviderConfig::new("ipgeolocation")]);
    assert_eq!(config.validate(), Err(ConfigError::NoCredentialFreeProvider));

    let config = MonitorConfig::default().with_identity_providers(vec![ProviderConfig::new("maxmind")]);
    assert_eq!(config.validate(), Err(ConfigError::UnknownProvider("maxmind".into())));

    let mut limited = ProviderConfig::new("ipapi");
    limited.rate_limit = Some(RateLimit::new(0, 60));
    let config = MonitorConfig::default().with_identity_providers(vec![limited]);
    assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { field: "rate_limit.requests", .. })));
}

#[test]
fn test_toml_round_trip_keeps_defaults() {
    let config = MonitorConfig::default().with_interval(SensorType::Latency, 90);
    let document = config.to_toml_string().unwrap();
    assert_eq!(MonitorConfig::from_toml_str(&document).unwrap(), config);
}

#[test]
fn test_source_alias_matches_canonical_entry() {
    let mut config = MonitorConfig::default();
    config.identity.source = Some("ip-api".into());
    config.validate().unwrap();

    let names: Vec<String> = config.identity.ordered_providers().into_iter().map(|provider| provider.name).collect();
    assert_eq!(names, ["ipapi", "ipinfo", "ipgeolocation"]);

    let config = MonitorConfig::default()
        .with_identity_providers(vec![ProviderConfig::new("ipapi"), ProviderConfig::new("ip-api.com")]);
    assert_eq!(config.validate(), Err(ConfigError::DuplicateProvider("ip-api.com".into())));
}

#[test]
fn test_duplicate_targets_rejected() {
    let config = MonitorConfig::default().with_targets(
        SensorType::DnsReliability,
        vec![ProbeTarget::labelled("1.1.1.1", "dns"), ProbeTarget::labelled("8.8.8.8", "dns")],
    );
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidTarget { sensor: SensorType::DnsReliability, ref reason, .. }) if reason == "duplicate label"
    ));

    let config = MonitorConfig::default().with_targets(
        SensorType::RouteStability,
        vec![ProbeTarget::new("1.1.1.1"), ProbeTarget::labelled("1.1.1.1", "again")],
    );
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidTarget { sensor: SensorType::RouteStability, ref reason, .. }) if reason == "duplicate address"
    ));
}
