//! Fake probe backends shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use isp_health::config::{DnsConfigSettings, ThroughputSettings};
use isp_health::identity::{IdentityProvider, RateBudgets};
use isp_health::probe::{
    BandwidthTester, DetectedDns, DnsQuerier, Hop, Pinger, RouteSnapshot, RttSample, ServerInfo,
    SystemDnsSource, ThroughputSample, Tracer,
};
use isp_health::{IdentityRecord, ProbeError, Probes, ProviderChain};

/// Answers every echo after `delay`, recording how many run at once
pub struct FakePinger {
    pub delay: Duration,
    pub rtt_ms: f64,
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl FakePinger {
    pub fn new(delay: Duration, rtt_ms: f64) -> Arc<Self> {
        Arc::new(Self {
            delay,
            rtt_ms,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pinger for FakePinger {
    async fn echo(&self, _host: &str, _timeout: Duration) -> Result<RttSample, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(RttSample::Reply(self.rtt_ms))
    }
}

pub struct FakeDns;

#[async_trait]
impl DnsQuerier for FakeDns {
    async fn query(&self, _server: SocketAddr, _name: &str, _timeout: Duration) -> Result<Duration, ProbeError> {
        Ok(Duration::from_millis(15))
    }
}

pub struct FakeTracer;

#[async_trait]
impl Tracer for FakeTracer {
    async fn trace(&self, _target: &str, _max_hops: u32, _hop: Duration, _limit: Duration) -> Result<RouteSnapshot, ProbeError> {
        Ok(RouteSnapshot::new(
            (1..=5)
                .map(|index| Hop { index, address: Some(format!("10.0.{index}.1")), rtt_ms: Some(index as f64) })
                .collect(),
        ))
    }
}

pub struct PanickingTracer;

#[async_trait]
impl Tracer for PanickingTracer {
    async fn trace(&self, _target: &str, _max_hops: u32, _hop: Duration, _limit: Duration) -> Result<RouteSnapshot, ProbeError> {
        panic!("traceroute output could not be handled");
    }
}

/// Fails every echo as if `ping` were not installed
#[derive(Default)]
pub struct MissingPinger {
    calls: AtomicUsize,
}

impl MissingPinger {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pinger for MissingPinger {
    async fn echo(&self, _host: &str, _timeout: Duration) -> Result<RttSample, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProbeError::ResourceUnavailable("ping not found".into()))
    }
}

pub struct FakeBandwidth;

#[async_trait]
impl BandwidthTester for FakeBandwidth {
    async fn measure_throughput(&self, _settings: &ThroughputSettings) -> Result<ThroughputSample, ProbeError> {
        Ok(ThroughputSample {
            download_mbps: 100.0,
            upload_mbps: 20.0,
            latency_ms: 10.0,
            server: ServerInfo { host: "speed.example.net".into(), ..ServerInfo::default() },
        })
    }
}

pub struct FakeSystemDns;

#[async_trait]
impl SystemDnsSource for FakeSystemDns {
    async fn detect(&self, _settings: &DnsConfigSettings) -> DetectedDns {
        DetectedDns { servers: vec!["9.9.9.9".into()], source: "test".into() }
    }
}

/// Plays back scripted answers, then fails
pub struct ScriptedProvider {
    name: String,
    answers: Mutex<VecDeque<Result<IdentityRecord, ProbeError>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: &str, answers: Vec<Result<IdentityRecord, ProbeError>>) -> Arc<Self> {
        Arc::new(Self { name: name.to_string(), answers: Mutex::new(answers.into()), calls: AtomicUsize::new(0) })
    }

    pub fn answering(name: &str, ip: &str) -> Arc<Self> {
        Self::new(name, vec![Ok(IdentityRecord::new(ip, name))])
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Self::new(name, Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, _credential: Option<&str>, _timeout: Duration) -> Result<IdentityRecord, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProbeError::BadResponse("HTTP 503".into())))
    }
}

pub fn chain(providers: Vec<Arc<ScriptedProvider>>) -> ProviderChain {
    let catalog = providers
        .into_iter()
        .map(|provider| provider as Arc<dyn IdentityProvider>)
        .collect();
    ProviderChain::new(catalog, RateBudgets::new())
}

pub fn probes(pinger: Arc<FakePinger>, identity: ProviderChain) -> Probes {
    Probes {
        pinger,
        dns: Arc::new(FakeDns),
        tracer: Arc::new(FakeTracer),
        bandwidth: Arc::new(FakeBandwidth),
        system_dns: Arc::new(FakeSystemDns),
        identity: Arc::new(identity),
    }
}

pub fn default_probes() -> Probes {
    probes(
        FakePinger::new(Duration::from_millis(5), 12.0),
        chain(vec![ScriptedProvider::answering("ipapi", "203.0.113.7")]),
    )
}
