//! ICMP echo rounds.
//!
//! Attempts against one target run back to back so loss and jitter reflect
//! real spacing in time; separate targets run concurrently.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::debug;

use super::command::run_command;
use crate::config::ProbeTarget;
use crate::error::ProbeError;

/// Result of one echo attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RttSample {
    /// Round-trip time in milliseconds
    Reply(f64),
    Lost,
}

/// Every attempt made against one target during a run
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSamples {
    pub target: ProbeTarget,
    pub samples: Vec<RttSample>,

    /// Last network error seen, if any attempt failed outright
    pub error: Option<ProbeError>,
}

impl TargetSamples {
    /// Reply times in attempt order
    pub fn replies(&self) -> Vec<f64> {
        self.samples
            .iter()
            .filter_map(|sample| match sample {
                RttSample::Reply(rtt) => Some(*rtt),
                RttSample::Lost => None,
            })
            .collect()
    }

    pub fn lost(&self) -> usize {
        self.samples.iter().filter(|sample| matches!(sample, RttSample::Lost)).count()
    }
}

#[async_trait]
pub trait Pinger: Send + Sync {
    /// Send one echo request and wait up to `timeout` for the reply
    ///
    /// No reply is `Ok(RttSample::Lost)`; errors are reserved for failures
    /// to send at all.
    async fn echo(&self, host: &str, timeout: Duration) -> Result<RttSample, ProbeError>;
}

/// Echo through the system `ping` binary
#[derive(Debug, Clone, Default)]
pub struct SystemPinger;

#[async_trait]
impl Pinger for SystemPinger {
    async fn echo(&self, host: &str, timeout: Duration) -> Result<RttSample, ProbeError> {
        // ping only takes whole seconds for -W
        let wait_secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        let args = vec![
            "-n".to_string(),
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            wait_secs.to_string(),
            host.to_string(),
        ];

        let output = run_command("ping", &args, Duration::from_secs(wait_secs + 2)).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if output.status.success() {
            return parse_ping_time(&stdout)
                .map(RttSample::Reply)
                .ok_or_else(|| ProbeError::BadResponse("no time= in ping output".to_string()));
        }

        // Exit status 1 means the request went out and nothing came back
        if output.status.code() == Some(1) {
            return Ok(RttSample::Lost);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify_ping_failure(host, &stderr))
    }
}

fn classify_ping_failure(host: &str, stderr: &str) -> ProbeError {
    let lowered = stderr.to_ascii_lowercase();
    if lowered.contains("name or service not known")
        || lowered.contains("unknown host")
        || lowered.contains("temporary failure in name resolution")
    {
        ProbeError::DnsFailure(host.to_string())
    } else if lowered.contains("operation not permitted") || lowered.contains("permission denied") {
        ProbeError::ResourceUnavailable(format!("ping: {stderr}"))
    } else {
        ProbeError::Unreachable(format!("{host}: {stderr}"))
    }
}

/// Extract the RTT in milliseconds from a ping reply line
pub fn parse_ping_time(output: &str) -> Option<f64> {
    output.lines().find_map(|line| {
        let (_, rest) = line.split_once("time")?;
        let rest = rest.strip_prefix('=').or_else(|| rest.strip_prefix('<'))?;
        let number: String =
            rest.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
        number.parse().ok()
    })
}

/// Probe every target `count` times
///
/// At most `concurrency` targets are in flight at once. Only a missing
/// resource aborts the run; other failures become lost samples.
pub async fn measure_round_trips(
    pinger: &dyn Pinger,
    targets: &[ProbeTarget],
    count: u32,
    timeout: Duration,
    concurrency: usize,
) -> Result<Vec<TargetSamples>, ProbeError> {
    let runs: Vec<_> = targets.iter().map(|target| probe_target(pinger, target, count, timeout)).collect();
    stream::iter(runs).buffered(concurrency.max(1)).try_collect().await
}

async fn probe_target(
    pinger: &dyn Pinger,
    target: &ProbeTarget,
    count: u32,
    timeout: Duration,
) -> Result<TargetSamples, ProbeError> {
    let mut samples = Vec::with_capacity(count as usize);
    let mut error = None;

    for _ in 0..count {
        match pinger.echo(&target.address, timeout).await {
            Ok(sample) => samples.push(sample),
            Err(err @ ProbeError::ResourceUnavailable(_)) => return Err(err),
            Err(err) => {
                debug!(target = %target.address, error = %err, "Echo attempt failed");
                samples.push(RttSample::Lost);
                error = Some(err);
            }
        }
    }

    Ok(TargetSamples { target: target.clone(), samples, error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_parse_ping_time() {
        let output = "PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.\n\
                      64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=12.4 ms\n";
        assert_eq!(parse_ping_time(output), Some(12.4));
        assert_eq!(parse_ping_time("64 bytes from ::1: icmp_seq=1 ttl=64 time<1 ms"), Some(1.0));
        assert_eq!(parse_ping_time("1 packets transmitted, 0 received"), None);
    }

    #[test]
    fn test_classify_ping_failure() {
        let error = classify_ping_failure("nope.invalid", "ping: nope.invalid: Name or service not known");
        assert_eq!(error.kind(), "dns_failure");
        let error = classify_ping_failure("10.0.0.1", "ping: connect: Network is unreachable");
        assert_eq!(error.kind(), "unreachable");
    }

    struct Scripted(Mutex<Vec<Result<RttSample, ProbeError>>>);

    #[async_trait]
    impl Pinger for Scripted {
        async fn echo(&self, _: &str, _: Duration) -> Result<RttSample, ProbeError> {
            self.0.lock().unwrap().remove(0)
        }
    }

    #[tokio::test]
    async fn test_network_errors_become_lost_samples() {
        let pinger = Scripted(Mutex::new(vec![
            Ok(RttSample::Reply(10.0)),
            Err(ProbeError::Unreachable("down".into())),
            Ok(RttSample::Lost),
        ]));
        let targets = vec![ProbeTarget::new("8.8.8.8")];

        let result = measure_round_trips(&pinger, &targets, 3, Duration::from_secs(1), 2).await.unwrap();
        assert_eq!(result[0].replies(), vec![10.0]);
        assert_eq!(result[0].lost(), 2);
        assert_eq!(result[0].error, Some(ProbeError::Unreachable("down".into())));
    }

    #[tokio::test]
    async fn test_missing_ping_aborts_run() {
        let pinger = Scripted(Mutex::new(vec![Err(ProbeError::ResourceUnavailable("ping".into()))]));
        let targets = vec![ProbeTarget::new("8.8.8.8")];

        let error = measure_round_trips(&pinger, &targets, 4, Duration::from_secs(1), 1).await.unwrap_err();
        assert_eq!(error.kind(), "resource_unavailable");
    }
}
