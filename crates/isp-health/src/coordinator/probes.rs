use std::sync::Arc;

use crate::error::Error;
use crate::identity::{ProviderChain, RateBudgets};
use crate::probe::{
    BandwidthTester, DnsQuerier, HttpSpeedTest, Pinger, ResolvConfSource, SystemDnsSource, SystemPinger,
    SystemTraceroute, Tracer, UdpDnsQuerier,
};

/// Backends the coordinator measures through
///
/// [`Probes::system`] wires the real ones; tests substitute fakes.
#[derive(Clone)]
pub struct Probes {
    pub pinger: Arc<dyn Pinger>,
    pub dns: Arc<dyn DnsQuerier>,
    pub tracer: Arc<dyn Tracer>,
    pub bandwidth: Arc<dyn BandwidthTester>,
    pub system_dns: Arc<dyn SystemDnsSource>,
    pub identity: Arc<ProviderChain>,
}

impl Probes {
    /// `ping` and `traceroute` subprocesses, UDP DNS, HTTP speed test and
    /// identity providers sharing one HTTP client
    pub fn system() -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("isp-health/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            pinger: Arc::new(SystemPinger),
            dns: Arc::new(UdpDnsQuerier),
            tracer: Arc::new(SystemTraceroute),
            bandwidth: Arc::new(HttpSpeedTest::new(client.clone())),
            system_dns: Arc::new(ResolvConfSource),
            identity: Arc::new(ProviderChain::http(&client, RateBudgets::new())),
        })
    }
}
