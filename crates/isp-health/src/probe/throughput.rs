//! HTTP bandwidth test against a public speed test endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::config::ThroughputSettings;
use crate::error::ProbeError;

const UPLOAD_CHUNK: usize = 64 * 1024;

/// Upload bodies are streamed from this buffer instead of allocated whole
static ZEROS: [u8; UPLOAD_CHUNK] = [0; UPLOAD_CHUNK];

/// Where the test ran, as reported by the endpoint
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    pub host: String,
    pub colo: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputSample {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub latency_ms: f64,
    pub server: ServerInfo,
}

#[async_trait]
pub trait BandwidthTester: Send + Sync {
    async fn measure_throughput(&self, settings: &ThroughputSettings) -> Result<ThroughputSample, ProbeError>;
}

/// Speed test over the `__down` / `__up` endpoints
pub struct HttpSpeedTest {
    client: reqwest::Client,
}

impl HttpSpeedTest {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn idle_latency(&self, base: &Url, limit: Duration) -> Result<(f64, HeaderMap), ProbeError> {
        let url = endpoint(base, "__down", Some(0))?;
        let started = Instant::now();
        let response = self.client.get(url).send().await.map_err(|err| ProbeError::from_http(err, limit))?;
        let elapsed = started.elapsed();
        check_status(response.status())?;
        Ok((elapsed.as_secs_f64() * 1000.0, response.headers().clone()))
    }

    async fn download(&self, base: &Url, bytes: u64, limit: Duration) -> Result<f64, ProbeError> {
        let url = endpoint(base, "__down", Some(bytes))?;
        let started = Instant::now();
        let mut response = self.client.get(url).send().await.map_err(|err| ProbeError::from_http(err, limit))?;
        check_status(response.status())?;

        let mut received = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|err| ProbeError::from_http(err, limit))? {
            received += chunk.len() as u64;
        }
        if received == 0 {
            return Err(ProbeError::BadResponse("empty download".to_string()));
        }
        Ok(megabits_per_second(received, started.elapsed()))
    }

    async fn upload(&self, base: &Url, bytes: u64, limit: Duration) -> Result<f64, ProbeError> {
        let url = endpoint(base, "__up", None)?;
        let chunks = chunk_sizes(bytes).map(|len| Ok::<_, std::io::Error>(&ZEROS[..len]));
        let body = reqwest::Body::wrap_stream(stream::iter(chunks));
        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .header(CONTENT_LENGTH, bytes)
            .body(body)
            .send()
            .await
            .map_err(|err| ProbeError::from_http(err, limit))?;
        check_status(response.status())?;
        Ok(megabits_per_second(bytes, started.elapsed()))
    }
}

#[async_trait]
impl BandwidthTester for HttpSpeedTest {
    async fn measure_throughput(&self, settings: &ThroughputSettings) -> Result<ThroughputSample, ProbeError> {
        let limit = settings.timeout();
        let base = Url::parse(&settings.endpoint)
            .map_err(|err| ProbeError::BadResponse(format!("invalid endpoint: {err}")))?;

        let test = async {
            let (latency_ms, headers) = self.idle_latency(&base, limit).await?;
            let download_mbps = self.download(&base, settings.download_bytes, limit).await?;
            let upload_mbps = self.upload(&base, settings.upload_bytes, limit).await?;
            let server = server_info(&base, &headers);
            debug!(download_mbps, upload_mbps, latency_ms, server = %server.host, "Throughput test complete");
            Ok::<_, ProbeError>(ThroughputSample { download_mbps, upload_mbps, latency_ms, server })
        };

        match tokio::time::timeout(limit, test).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(limit)),
        }
    }
}

fn chunk_sizes(total: u64) -> impl Iterator<Item = usize> + Send + Sync + 'static {
    let chunk = UPLOAD_CHUNK as u64;
    let rest = (total % chunk) as usize;
    (0..total / chunk).map(|_| UPLOAD_CHUNK).chain((rest > 0).then_some(rest))
}

fn endpoint(base: &Url, path: &str, bytes: Option<u64>) -> Result<Url, ProbeError> {
    let mut url = base
        .join(path)
        .map_err(|err| ProbeError::BadResponse(format!("invalid endpoint: {err}")))?;
    if let Some(bytes) = bytes {
        url.query_pairs_mut().append_pair("bytes", &bytes.to_string());
    }
    Ok(url)
}

fn check_status(status: reqwest::StatusCode) -> Result<(), ProbeError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ProbeError::BadResponse(format!("HTTP {}", status.as_u16())))
    }
}

fn server_info(base: &Url, headers: &HeaderMap) -> ServerInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .filter(|value| !value.is_empty())
    };
    ServerInfo {
        host: base.host_str().unwrap_or_default().to_string(),
        colo: header("cf-meta-colo"),
        city: header("cf-meta-city"),
        country: header("cf-meta-country"),
    }
}

/// Transfer rate in Mbit/s
pub fn megabits_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / secs / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_upload_chunks_cover_body() {
        let sizes: Vec<usize> = chunk_sizes(1_000_000).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 1_000_000);
        assert!(sizes.iter().all(|size| *size > 0 && *size <= UPLOAD_CHUNK));
        assert_eq!(sizes.len(), 16);

        assert_eq!(chunk_sizes(2 * UPLOAD_CHUNK as u64).collect::<Vec<_>>(), vec![UPLOAD_CHUNK, UPLOAD_CHUNK]);
        assert_eq!(chunk_sizes(0).count(), 0);
    }

    #[test]
    fn test_megabits_per_second() {
        assert_eq!(megabits_per_second(12_500_000, Duration::from_secs(1)), 100.0);
        assert_eq!(megabits_per_second(1_000, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_endpoint_paths() {
        let base = Url::parse("https://speed.cloudflare.com").unwrap();
        assert_eq!(
            endpoint(&base, "__down", Some(1000)).unwrap().as_str(),
            "https://speed.cloudflare.com/__down?bytes=1000"
        );
        assert_eq!(endpoint(&base, "__up", None).unwrap().as_str(), "https://speed.cloudflare.com/__up");
    }

    #[test]
    fn test_server_info_from_headers() {
        let base = Url::parse("https://speed.cloudflare.com").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("cf-meta-colo", HeaderValue::from_static("AMS"));
        headers.insert("cf-meta-country", HeaderValue::from_static("NL"));

        let info = server_info(&base, &headers);
        assert_eq!(info.host, "speed.cloudflare.com");
        assert_eq!(info.colo.as_deref(), Some("AMS"));
        assert_eq!(info.city, None);
    }
}
