//! Identity provider chain fallback and rate budgets

mod common;

use common::{ScriptedProvider, chain};
use isp_health::config::{IdentityConfig, ProviderConfig, RateLimit};
use isp_health::error::FailureReason;
use isp_health::{IdentityError, IdentityRecord, ProbeError};

fn config(providers: Vec<ProviderConfig>) -> IdentityConfig {
    IdentityConfig { providers, ..IdentityConfig::default() }
}

fn limited(name: &str, requests: u32) -> ProviderConfig {
    let mut provider = ProviderConfig::new(name);
    provider.rate_limit = Some(RateLimit::new(requests, 3600));
    provider
}

#[tokio::test]
async fn test_falls_back_to_next_provider() {
    let _ = tracing_subscriber::fmt::try_init();

    let a = ScriptedProvider::failing("A");
    let b = ScriptedProvider::answering("B", "198.51.100.20");
    let chain = chain(vec![a.clone(), b.clone()]);

    let record = chain.resolve_identity(&config(vec![limited("A", 10), limited("B", 10)])).await.unwrap();

    assert_eq!(record.ip, "198.51.100.20");
    assert_eq!(record.source, "B");
    assert_eq!(a.calls(), 1);
    assert_eq!(chain.budgets().get("A").unwrap().remaining(), 9);
    assert_eq!(chain.budgets().get("B").unwrap().remaining(), 9);
}

#[tokio::test]
async fn test_first_success_wins() {
    let a = ScriptedProvider::answering("A", "192.0.2.1");
    let b = ScriptedProvider::answering("B", "192.0.2.2");
    let chain = chain(vec![a, b.clone()]);

    let record = chain.resolve_identity(&config(vec![limited("A", 10), limited("B", 10)])).await.unwrap();

    assert_eq!(record.source, "A");
    assert_eq!(b.calls(), 0);
    assert!(chain.budgets().get("B").is_none());
}

#[tokio::test]
async fn test_all_failing_is_exhausted() {
    let a = ScriptedProvider::failing("A");
    let b = ScriptedProvider::new("B", vec![Err(ProbeError::Timeout(std::time::Duration::from_secs(5)))]);
    let chain = chain(vec![a.clone(), b.clone()]);
    let config = config(vec![limited("A", 1), limited("B", 1)]);

    let error = chain.resolve_identity(&config).await.unwrap_err();
    let IdentityError::ProviderExhausted { failures } = &error;
    assert_eq!(failures.len(), 2);
    assert!(matches!(failures[0].reason, FailureReason::Failed(ProbeError::BadResponse(_))));
    assert!(matches!(failures[1].reason, FailureReason::Failed(ProbeError::Timeout(_))));

    // Budgets of one are spent; the second call must not reach either provider
    let error = chain.resolve_identity(&config).await.unwrap_err();
    assert!(error.failures().iter().all(|failure| failure.reason == FailureReason::RateLimited));
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
}

#[tokio::test]
async fn test_preferred_source_goes_first_with_credential() {
    let free = ScriptedProvider::answering("ipapi", "192.0.2.10");
    let keyed = ScriptedProvider::answering("ipgeolocation", "192.0.2.11");
    let chain = chain(vec![free, keyed]);

    let mut config = IdentityConfig::default();
    config.source = Some("ipgeolocation".into());
    config.credential = Some("key".into());

    let record = chain.resolve_identity(&config).await.unwrap();
    assert_eq!(record, IdentityRecord { source: "ipgeolocation".into(), ..IdentityRecord::new("192.0.2.11", "") });
}

#[tokio::test]
async fn test_empty_chain_is_exhausted() {
    let chain = chain(Vec::new());
    let error = chain.resolve_identity(&config(Vec::new())).await.unwrap_err();
    assert!(error.failures().is_empty());
    assert!(error.to_string().contains("no providers configured"));
}

#[tokio::test]
async fn test_source_alias_is_tried_once() {
    let failing = ScriptedProvider::failing("ipapi");
    let fallback = ScriptedProvider::answering("ipinfo", "192.0.2.30");
    let chain = chain(vec![failing.clone(), fallback]);

    let mut config = IdentityConfig::default();
    config.source = Some("ip-api".into());

    let record = chain.resolve_identity(&config).await.unwrap();
    assert_eq!(record.source, "ipinfo");
    assert_eq!(failing.calls(), 1);
    assert_eq!(chain.budgets().get("ipapi").unwrap().remaining(), 44);
}
