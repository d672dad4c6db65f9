//! Hop-limited route traces.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::command::run_command;
use crate::config::{ProbeTarget, RouteStabilitySettings};
use crate::error::ProbeError;

/// One row of a trace; `address` is `None` when the hop did not answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub index: u32,
    pub address: Option<String>,
    pub rtt_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub hops: Vec<Hop>,
}

impl RouteSnapshot {
    pub fn new(hops: Vec<Hop>) -> Self {
        Self { hops }
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    pub fn hop(&self, index: u32) -> Option<&Hop> {
        self.hops.iter().find(|hop| hop.index == index)
    }
}

#[async_trait]
pub trait Tracer: Send + Sync {
    async fn trace(
        &self,
        target: &str,
        max_hops: u32,
        hop_timeout: Duration,
        limit: Duration,
    ) -> Result<RouteSnapshot, ProbeError>;
}

/// Trace through the system `traceroute` binary
#[derive(Debug, Clone, Default)]
pub struct SystemTraceroute;

#[async_trait]
impl Tracer for SystemTraceroute {
    async fn trace(
        &self,
        target: &str,
        max_hops: u32,
        hop_timeout: Duration,
        limit: Duration,
    ) -> Result<RouteSnapshot, ProbeError> {
        let args = vec![
            "-n".to_string(),
            "-q".to_string(),
            "1".to_string(),
            "-m".to_string(),
            max_hops.to_string(),
            "-w".to_string(),
            hop_timeout.as_secs().max(1).to_string(),
            target.to_string(),
        ];

        let output = run_command("traceroute", &args, limit).await?;
        let snapshot = parse_traceroute(&String::from_utf8_lossy(&output.stdout));
        if !snapshot.hops.is_empty() {
            return Ok(snapshot);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let lowered = stderr.to_ascii_lowercase();
        if lowered.contains("name or service not known") || lowered.contains("cannot handle") {
            Err(ProbeError::DnsFailure(target.to_string()))
        } else {
            Err(ProbeError::Unreachable(format!("{target}: no hops traced {stderr}").trim().to_string()))
        }
    }
}

/// Parse `traceroute -n -q 1` output into hops
pub fn parse_traceroute(output: &str) -> RouteSnapshot {
    let hops = output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let index = tokens.next()?.parse::<u32>().ok()?;
            let address = match tokens.next()? {
                "*" => None,
                address => Some(address.to_string()),
            };

            let rest: Vec<&str> = tokens.collect();
            let rtt_ms = rest
                .windows(2)
                .find(|pair| pair[1] == "ms")
                .and_then(|pair| pair[0].parse::<f64>().ok());

            Some(Hop { index, address, rtt_ms })
        })
        .collect();

    RouteSnapshot { hops }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceOutcome {
    pub target: ProbeTarget,
    pub result: Result<RouteSnapshot, ProbeError>,
}

/// Trace every configured target, at most `concurrency` at a time
pub async fn trace_targets(
    tracer: &dyn Tracer,
    settings: &RouteStabilitySettings,
    concurrency: usize,
) -> Vec<TraceOutcome> {
    let runs: Vec<_> = settings
        .targets
        .iter()
        .map(|target| async move {
            let result = tracer
                .trace(&target.address, settings.max_hops, settings.hop_timeout(), settings.timeout())
                .await;
            match &result {
                Ok(snapshot) => debug!(target = %target.address, hops = snapshot.hop_count(), "Route traced"),
                Err(err) => debug!(target = %target.address, error = %err, "Route trace failed"),
            }
            TraceOutcome { target: target.clone(), result }
        })
        .collect();
    stream::iter(runs).buffered(concurrency.max(1)).collect().await
}
