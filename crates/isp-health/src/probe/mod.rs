//! Probe primitives.
//!
//! Each probe performs one kind of network operation and returns raw
//! samples or a typed [`ProbeError`](crate::error::ProbeError). Backends sit
//! behind traits so the coordinator can run against fakes.

pub mod command;
pub mod dns;
pub mod ping;
pub mod resolv;
pub mod throughput;
pub mod trace;

pub use dns::{DnsAttempt, DnsQuerier, ServerSamples, UdpDnsQuerier, measure_dns};
pub use ping::{Pinger, RttSample, SystemPinger, TargetSamples, measure_round_trips};
pub use resolv::{DetectedDns, ResolvConfSource, SystemDnsSource};
pub use throughput::{BandwidthTester, HttpSpeedTest, ServerInfo, ThroughputSample};
pub use trace::{Hop, RouteSnapshot, SystemTraceroute, TraceOutcome, Tracer, trace_targets};
