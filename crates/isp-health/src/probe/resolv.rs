//! Detection of the upstream DNS servers the host resolves through.

use std::net::IpAddr;

use async_trait::async_trait;
use tracing::debug;

use crate::config::DnsConfigSettings;

/// Used when no file yields a public upstream server
pub const PUBLIC_FALLBACK: [&str; 2] = ["8.8.8.8", "1.1.1.1"];
pub const FALLBACK_SOURCE: &str = "public_fallback";

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedDns {
    /// Upstream servers in resolver order, never empty
    pub servers: Vec<String>,

    /// Where they were found (a file path or `public_fallback`)
    pub source: String,
}

impl DetectedDns {
    pub fn fallback() -> Self {
        Self {
            servers: PUBLIC_FALLBACK.iter().map(|server| server.to_string()).collect(),
            source: FALLBACK_SOURCE.to_string(),
        }
    }

    pub fn primary(&self) -> Option<&str> {
        self.servers.first().map(String::as_str)
    }

    pub fn secondary(&self) -> Option<&str> {
        self.servers.get(1).map(String::as_str)
    }
}

#[async_trait]
pub trait SystemDnsSource: Send + Sync {
    async fn detect(&self, settings: &DnsConfigSettings) -> DetectedDns;
}

/// Reads `nameserver` lines from resolv.conf style files
#[derive(Debug, Clone, Default)]
pub struct ResolvConfSource;

#[async_trait]
impl SystemDnsSource for ResolvConfSource {
    async fn detect(&self, settings: &DnsConfigSettings) -> DetectedDns {
        for path in &settings.resolv_conf_paths {
            let contents = match tokio::fs::read_to_string(path).await {
                Ok(contents) => contents,
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "Skipping resolver file");
                    continue;
                }
            };

            let servers = upstream_nameservers(&contents);
            if !servers.is_empty() {
                return DetectedDns { servers, source: path.display().to_string() };
            }
        }

        DetectedDns::fallback()
    }
}

/// Public `nameserver` entries of a resolv.conf document, in order
pub fn upstream_nameservers(contents: &str) -> Vec<String> {
    let mut servers: Vec<String> = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let mut fields = line.split_whitespace();
        if fields.next() != Some("nameserver") {
            continue;
        }
        let Some(server) = fields.next() else {
            continue;
        };
        // Scoped IPv6 link-local addresses carry a %zone suffix
        let address = server.split('%').next().unwrap_or(server);
        if !is_local_or_internal(address) && !servers.iter().any(|known| known == address) {
            servers.push(address.to_string());
        }
    }
    servers
}

/// Loopback, container and private-network resolvers are not upstream
pub fn is_local_or_internal(address: &str) -> bool {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            ip.is_private() || ip.is_loopback() || ip.is_link_local() || ip.is_unspecified()
        }
        Ok(IpAddr::V6(ip)) => {
            let first = ip.segments()[0];
            ip.is_loopback()
                || ip.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // unique local
                || (first & 0xffc0) == 0xfe80 // link local
        }
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_upstream_nameservers_filters_local() {
        let contents = "# generated\n\
                        nameserver 127.0.0.53\n\
                        nameserver 172.17.0.1\n\
                        nameserver 9.9.9.9\n\
                        ; comment\n\
                        nameserver 2620:fe::fe\n\
                        nameserver fe80::1%eth0\n\
                        nameserver 9.9.9.9\n\
                        search lan\n";
        assert_eq!(upstream_nameservers(contents), vec!["9.9.9.9", "2620:fe::fe"]);
    }

    #[test]
    fn test_is_local_or_internal() {
        assert!(is_local_or_internal("192.168.1.1"));
        assert!(is_local_or_internal("10.0.0.1"));
        assert!(is_local_or_internal("169.254.1.1"));
        assert!(is_local_or_internal("::1"));
        assert!(is_local_or_internal("fd00::53"));
        assert!(is_local_or_internal("not-an-ip"));
        assert!(!is_local_or_internal("1.1.1.1"));
        assert!(!is_local_or_internal("2001:4860:4860::8888"));
    }

    #[tokio::test]
    async fn test_detect_walks_files_then_falls_back() {
        let stub = tempfile::NamedTempFile::new().unwrap();
        writeln!(stub.as_file(), "nameserver 127.0.0.53").unwrap();
        let upstream = tempfile::NamedTempFile::new().unwrap();
        writeln!(upstream.as_file(), "nameserver 8.8.4.4\nnameserver 1.0.0.1").unwrap();

        let settings = DnsConfigSettings {
            resolv_conf_paths: vec![
                "/nonexistent/resolv.conf".into(),
                stub.path().to_path_buf(),
                upstream.path().to_path_buf(),
            ],
            ..DnsConfigSettings::default()
        };
        let detected = ResolvConfSource.detect(&settings).await;
        assert_eq!(detected.servers, vec!["8.8.4.4", "1.0.0.1"]);
        assert_eq!(detected.source, upstream.path().display().to_string());

        let settings = DnsConfigSettings {
            resolv_conf_paths: vec![stub.path().to_path_buf()],
            ..DnsConfigSettings::default()
        };
        let detected = ResolvConfSource.detect(&settings).await;
        assert_eq!(detected, DetectedDns::fallback());
        assert_eq!(detected.primary(), Some("8.8.8.8"));
    }
}
