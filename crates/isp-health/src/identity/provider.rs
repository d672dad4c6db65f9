//! Identity lookup backends.
//!
//! The set of real backends is closed ([`ProviderKind`]); each one answers
//! "what is my public address" in its own JSON shape, normalized here into
//! [`IdentityRecord`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use url::Url;

use super::record::IdentityRecord;
use crate::config::RateLimit;
use crate::error::ProbeError;

/// Capability shared by every identity backend
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Name used in configuration and as the record's `source`
    fn name(&self) -> &str;

    /// Look up the public identity; `timeout` bounds the whole exchange
    async fn lookup(
        &self,
        credential: Option<&str>,
        timeout: Duration,
    ) -> Result<IdentityRecord, ProbeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    IpApi,
    IpInfo,
    IpGeolocation,
}

const IP_API_FIELDS: &str =
    "status,message,query,reverse,city,regionName,country,lat,lon,isp,zip,timezone";

impl ProviderKind {
    /// Free services first, credentialed last
    pub const ALL: [ProviderKind; 3] =
        [ProviderKind::IpApi, ProviderKind::IpInfo, ProviderKind::IpGeolocation];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ipapi" | "ip-api" | "ip-api.com" => Some(ProviderKind::IpApi),
            "ipinfo" | "ipinfo.io" => Some(ProviderKind::IpInfo),
            "ipgeolocation" | "ipgeolocation.io" => Some(ProviderKind::IpGeolocation),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::IpApi => "ipapi",
            ProviderKind::IpInfo => "ipinfo",
            ProviderKind::IpGeolocation => "ipgeolocation",
        }
    }

    pub fn requires_credential(&self) -> bool {
        matches!(self, ProviderKind::IpGeolocation)
    }

    /// Documented free-tier allowance
    pub fn default_rate_limit(&self) -> RateLimit {
        match self {
            // 45 requests/minute
            ProviderKind::IpApi => RateLimit::new(45, 60),
            // 50k/month, spread per day
            ProviderKind::IpInfo => RateLimit::new(1000, 86_400),
            ProviderKind::IpGeolocation => RateLimit::new(1000, 86_400),
        }
    }

    pub fn endpoint(&self, credential: Option<&str>) -> Result<Url, ProbeError> {
        let credential = credential.map(str::trim).filter(|value| !value.is_empty());
        let url = match (self, credential) {
            (ProviderKind::IpApi, None) => {
                Url::parse_with_params("http://ip-api.com/json/", &[("fields", IP_API_FIELDS)])
            }
            (ProviderKind::IpApi, Some(key)) => Url::parse_with_params(
                "https://pro.ip-api.com/json/",
                &[("fields", IP_API_FIELDS), ("key", key)],
            ),
            (ProviderKind::IpInfo, None) => Url::parse("https://ipinfo.io/json"),
            (ProviderKind::IpInfo, Some(token)) => {
                Url::parse_with_params("https://ipinfo.io/json", &[("token", token)])
            }
            (ProviderKind::IpGeolocation, Some(key)) => {
                Url::parse_with_params("https://api.ipgeolocation.io/ipgeo", &[("apiKey", key)])
            }
            (ProviderKind::IpGeolocation, None) => {
                return Err(ProbeError::ResourceUnavailable(
                    "ipgeolocation requires an API key".to_string(),
                ));
            }
        };
        url.map_err(|err| ProbeError::BadResponse(format!("invalid endpoint: {err}")))
    }

    /// Normalize a provider payload into the canonical record
    pub fn normalize(&self, body: &str) -> Result<IdentityRecord, ProbeError> {
        let malformed = |err: serde_json::Error| ProbeError::BadResponse(format!("malformed payload: {err}"));
        let record = match self {
            ProviderKind::IpApi => {
                let payload: IpApiResponse = serde_json::from_str(body).map_err(malformed)?;
                if payload.status.as_deref() != Some("success") {
                    return Err(ProbeError::BadResponse(format!(
                        "API error: {}",
                        payload.message.as_deref().unwrap_or("unknown error")
                    )));
                }
                IdentityRecord {
                    ip: payload.query.unwrap_or_default(),
                    hostname: non_empty(payload.reverse),
                    city: non_empty(payload.city),
                    region: non_empty(payload.region_name),
                    country: non_empty(payload.country),
                    latitude: payload.lat,
                    longitude: payload.lon,
                    organization: non_empty(payload.isp),
                    postal_code: non_empty(payload.zip),
                    timezone: non_empty(payload.timezone),
                    source: self.name().to_string(),
                }
            }
            ProviderKind::IpInfo => {
                let payload: IpInfoResponse = serde_json::from_str(body).map_err(malformed)?;
                let (latitude, longitude) = payload.loc.as_deref().map(split_loc).unwrap_or((None, None));
                IdentityRecord {
                    ip: payload.ip.unwrap_or_default(),
                    hostname: non_empty(payload.hostname),
                    city: non_empty(payload.city),
                    region: non_empty(payload.region),
                    country: non_empty(payload.country),
                    latitude,
                    longitude,
                    organization: non_empty(payload.org),
                    postal_code: non_empty(payload.postal),
                    timezone: non_empty(payload.timezone),
                    source: self.name().to_string(),
                }
            }
            ProviderKind::IpGeolocation => {
                let payload: IpGeolocationResponse = serde_json::from_str(body).map_err(malformed)?;
                IdentityRecord {
                    ip: payload.ip.unwrap_or_default(),
                    hostname: non_empty(payload.hostname),
                    city: non_empty(payload.city),
                    region: non_empty(payload.state_prov),
                    country: non_empty(payload.country_name),
                    latitude: payload.latitude,
                    longitude: payload.longitude,
                    organization: non_empty(payload.organization),
                    postal_code: non_empty(payload.zipcode),
                    timezone: payload.time_zone.and_then(|zone| non_empty(zone.name)),
                    source: self.name().to_string(),
                }
            }
        };

        if record.ip.trim().is_empty() {
            return Err(ProbeError::BadResponse("payload carries no IP address".to_string()));
        }
        Ok(record)
    }
}

/// Response from ip-api.com
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: Option<String>,
    message: Option<String>,
    query: Option<String>,
    reverse: Option<String>,
    city: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
    country: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    isp: Option<String>,
    zip: Option<String>,
    timezone: Option<String>,
}

/// Response from ipinfo.io
#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    ip: Option<String>,
    hostname: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    /// "lat,lon"
    loc: Option<String>,
    org: Option<String>,
    postal: Option<String>,
    timezone: Option<String>,
}

/// Response from ipgeolocation.io
#[derive(Debug, Deserialize)]
struct IpGeolocationResponse {
    ip: Option<String>,
    hostname: Option<String>,
    city: Option<String>,
    state_prov: Option<String>,
    country_name: Option<String>,
    #[serde(default, deserialize_with = "flexible_number")]
    latitude: Option<f64>,
    #[serde(default, deserialize_with = "flexible_number")]
    longitude: Option<f64>,
    organization: Option<String>,
    zipcode: Option<String>,
    time_zone: Option<TimeZone>,
}

#[derive(Debug, Deserialize)]
struct TimeZone {
    name: Option<String>,
}

/// ipgeolocation sends coordinates as strings
fn flexible_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}

fn split_loc(loc: &str) -> (Option<f64>, Option<f64>) {
    match loc.split_once(',') {
        Some((lat, lon)) => (lat.trim().parse().ok(), lon.trim().parse().ok()),
        None => (None, None),
    }
}

/// HTTP backend for one [`ProviderKind`]
pub struct HttpProvider {
    kind: ProviderKind,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(kind: ProviderKind, client: reqwest::Client) -> Self {
        Self { kind, client }
    }

    /// One provider per known kind, sharing `client`
    pub fn catalog(client: &reqwest::Client) -> Vec<Arc<dyn IdentityProvider>> {
        ProviderKind::ALL
            .iter()
            .map(|kind| Arc::new(HttpProvider::new(*kind, client.clone())) as Arc<dyn IdentityProvider>)
            .collect()
    }
}

#[async_trait]
impl IdentityProvider for HttpProvider {
    fn name(&self) -> &str {
        self.kind.name()
    }

    async fn lookup(
        &self,
        credential: Option<&str>,
        timeout: Duration,
    ) -> Result<IdentityRecord, ProbeError> {
        let url = self.kind.endpoint(credential)?;

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| ProbeError::from_http(err, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::BadResponse(format!("HTTP {}", status.as_u16())));
        }

        let body = response.text().await.map_err(|err| ProbeError::from_http(err, timeout))?;
        self.kind.normalize(&body)
    }
}
