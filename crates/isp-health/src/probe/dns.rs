//! Timed DNS lookups against explicit resolvers.
//!
//! Queries are plain recursive `A` questions over UDP; only the header of the
//! answer is inspected (id, response code, answer count).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ProbeTarget;
use crate::error::ProbeError;

const DNS_PORT: u16 = 53;
const HEADER_LEN: usize = 12;
const MAX_LABEL: usize = 63;

#[async_trait]
pub trait DnsQuerier: Send + Sync {
    /// Resolve `name` at `server`, returning the time to a usable answer
    async fn query(&self, server: SocketAddr, name: &str, timeout: Duration) -> Result<Duration, ProbeError>;
}

#[derive(Debug, Clone, Default)]
pub struct UdpDnsQuerier;

#[async_trait]
impl DnsQuerier for UdpDnsQuerier {
    async fn query(&self, server: SocketAddr, name: &str, timeout: Duration) -> Result<Duration, ProbeError> {
        let id: u16 = rand::random();
        let packet = encode_query(id, name)?;

        let local: SocketAddr = match server {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await.map_err(|err| ProbeError::from_io(err, "udp socket"))?;
        socket.connect(server).await.map_err(|err| ProbeError::from_io(err, &server.to_string()))?;

        let started = Instant::now();
        let exchange = async {
            socket.send(&packet).await.map_err(|err| ProbeError::from_io(err, &server.to_string()))?;
            let mut buf = [0u8; 512];
            loop {
                let len = socket.recv(&mut buf).await.map_err(|err| ProbeError::from_io(err, &server.to_string()))?;
                // Late answers to an earlier query on a reused port are ignored
                match parse_response(id, &buf[..len]) {
                    Err(ProbeError::BadResponse(reason)) if reason == "id mismatch" => continue,
                    other => return other.map(|_| started.elapsed()),
                }
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }
}

/// Build a recursive `A IN` question for `name`
pub fn encode_query(id: u16, name: &str) -> Result<Vec<u8>, ProbeError> {
    let mut packet = Vec::with_capacity(HEADER_LEN + name.len() + 6);
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&0x0100u16.to_be_bytes()); // RD
    packet.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    packet.extend_from_slice(&[0; 6]);

    let name = name.trim_end_matches('.');
    if name.is_empty() {
        return Err(ProbeError::BadResponse("empty query name".to_string()));
    }
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL {
            return Err(ProbeError::BadResponse(format!("invalid label in {name:?}")));
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);
    packet.extend_from_slice(&1u16.to_be_bytes()); // A
    packet.extend_from_slice(&1u16.to_be_bytes()); // IN
    Ok(packet)
}

/// Check a response header; returns the answer count
pub fn parse_response(id: u16, packet: &[u8]) -> Result<u16, ProbeError> {
    if packet.len() < HEADER_LEN {
        return Err(ProbeError::BadResponse("truncated header".to_string()));
    }
    if u16::from_be_bytes([packet[0], packet[1]]) != id {
        return Err(ProbeError::BadResponse("id mismatch".to_string()));
    }

    let flags = u16::from_be_bytes([packet[2], packet[3]]);
    if flags & 0x8000 == 0 {
        return Err(ProbeError::BadResponse("not a response".to_string()));
    }

    match flags & 0x000F {
        0 => {}
        2 => return Err(ProbeError::DnsFailure("SERVFAIL".to_string())),
        3 => return Err(ProbeError::DnsFailure("NXDOMAIN".to_string())),
        5 => return Err(ProbeError::DnsFailure("REFUSED".to_string())),
        rcode => return Err(ProbeError::DnsFailure(format!("rcode {rcode}"))),
    }

    let answers = u16::from_be_bytes([packet[6], packet[7]]);
    if answers == 0 {
        return Err(ProbeError::DnsFailure("empty answer".to_string()));
    }
    Ok(answers)
}

/// `ip` or `ip:port`, port 53 when absent
pub fn server_addr(address: &str) -> Result<SocketAddr, ProbeError> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }
    address
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| ProbeError::BadResponse(format!("invalid DNS server address {address:?}")))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DnsAttempt {
    pub query: String,
    pub result: Result<Duration, ProbeError>,
}

/// All attempts made against one server during a run
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSamples {
    pub server: ProbeTarget,
    pub attempts: Vec<DnsAttempt>,
}

impl ServerSamples {
    pub fn successes(&self) -> Vec<Duration> {
        self.attempts.iter().filter_map(|attempt| attempt.result.as_ref().ok().copied()).collect()
    }

    pub fn last_error(&self) -> Option<&ProbeError> {
        self.attempts.iter().rev().find_map(|attempt| attempt.result.as_ref().err())
    }
}

/// Query every name against every server
///
/// Servers are probed concurrently (bounded by `concurrency`), each server's
/// queries one after another. Failures are recorded per attempt.
pub async fn measure_dns(
    querier: &dyn DnsQuerier,
    servers: &[ProbeTarget],
    queries: &[String],
    timeout: Duration,
    concurrency: usize,
) -> Vec<ServerSamples> {
    let runs: Vec<_> = servers
        .iter()
        .map(|server| async move {
            let addr = server_addr(&server.address);
            let mut attempts = Vec::with_capacity(queries.len());
            for query in queries {
                let result = match &addr {
                    Ok(addr) => querier.query(*addr, query, timeout).await,
                    Err(err) => Err(err.clone()),
                };
                if let Err(err) = &result {
                    debug!(target = %server.address, query = %query, error = %err, "DNS query failed");
                }
                attempts.push(DnsAttempt { query: query.clone(), result });
            }
            ServerSamples { server: server.clone(), attempts }
        })
        .collect();
    stream::iter(runs).buffered(concurrency.max(1)).collect().await
}
