use std::fmt;
use std::io::{Error as IoError, ErrorKind};
use std::time::Duration;

use thiserror::Error;

use crate::sensor::SensorType;

/// Failure of a single network operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeError {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("DNS failure: {0}")]
    DnsFailure(String),

    #[error("required resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl ProbeError {
    /// Stable label written into reading attributes
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Timeout(_) => "timeout",
            ProbeError::Unreachable(_) => "unreachable",
            ProbeError::DnsFailure(_) => "dns_failure",
            ProbeError::ResourceUnavailable(_) => "resource_unavailable",
            ProbeError::BadResponse(_) => "bad_response",
            ProbeError::Io(_) => "io_error",
        }
    }

    /// Map an I/O error raised while using `resource` (a command, a socket)
    pub fn from_io(error: IoError, resource: &str) -> Self {
        match error.kind() {
            ErrorKind::NotFound => {
                ProbeError::ResourceUnavailable(format!("{resource} not found"))
            }
            ErrorKind::PermissionDenied => {
                ProbeError::ResourceUnavailable(format!("{resource}: permission denied"))
            }
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable
            | ErrorKind::TimedOut => ProbeError::Unreachable(format!("{resource}: {error}")),
            _ => ProbeError::Io(format!("{resource}: {error}")),
        }
    }

    /// Map an HTTP client error; `limit` is the bound the request ran under
    pub fn from_http(error: reqwest::Error, limit: Duration) -> Self {
        if error.is_timeout() {
            ProbeError::Timeout(limit)
        } else if error.is_connect() {
            ProbeError::Unreachable(error.to_string())
        } else if let Some(status) = error.status() {
            ProbeError::BadResponse(format!("HTTP {status}"))
        } else if error.is_decode() {
            ProbeError::BadResponse(format!("malformed body: {error}"))
        } else {
            ProbeError::Io(error.to_string())
        }
    }
}

/// Why one provider did not answer during a chain resolution
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    Disabled,
    MissingCredential,
    NotRegistered,
    RateLimited,
    Failed(ProbeError),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Disabled => write!(f, "disabled"),
            FailureReason::MissingCredential => write!(f, "credential required"),
            FailureReason::NotRegistered => write!(f, "no implementation registered"),
            FailureReason::RateLimited => write!(f, "rate limit exhausted"),
            FailureReason::Failed(error) => write!(f, "{error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdentityError {
    #[error("every identity provider failed or was skipped ({})", summarize(.failures))]
    ProviderExhausted { failures: Vec<ProviderFailure> },
}

impl IdentityError {
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            IdentityError::ProviderExhausted { failures } => failures,
        }
    }
}

fn summarize(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers configured".to_string();
    }
    failures
        .iter()
        .map(|failure| format!("{}: {}", failure.provider, failure.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Configuration rejected before any timer is armed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{sensor} interval {interval}s is outside {min}..={max}s")]
    InvalidInterval { sensor: SensorType, interval: u64, min: u64, max: u64 },

    #[error("{0} is enabled but has no targets")]
    EmptyTargets(SensorType),

    #[error("{sensor} target {target:?} is invalid: {reason}")]
    InvalidTarget { sensor: SensorType, target: String, reason: String },

    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange { field: &'static str, value: u64, min: u64, max: u64 },

    #[error("unknown identity provider {0:?}")]
    UnknownProvider(String),

    #[error("identity provider {0:?} is listed more than once")]
    DuplicateProvider(String),

    #[error("identity chain has no enabled provider that works without a credential")]
    NoCredentialFreeProvider,

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("sensor {0} is disabled")]
    SensorDisabled(SensorType),

    #[error("coordinator has been shut down")]
    ShutDown,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
