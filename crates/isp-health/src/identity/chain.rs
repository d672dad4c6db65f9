use std::sync::Arc;

use tracing::{debug, warn};

use super::budget::RateBudgets;
use super::provider::{HttpProvider, IdentityProvider, ProviderKind};
use super::record::IdentityRecord;
use crate::config::{IdentityConfig, ProviderConfig};
use crate::error::{FailureReason, IdentityError, ProbeError, ProviderFailure};

/// Ordered fallback over identity providers with per-provider budgets
///
/// The catalog is fixed at construction; which providers are tried, in which
/// order and with which credentials comes from the [`IdentityConfig`] passed
/// to each resolution.
pub struct ProviderChain {
    catalog: Vec<Arc<dyn IdentityProvider>>,
    budgets: RateBudgets,
}

impl ProviderChain {
    pub fn new(catalog: Vec<Arc<dyn IdentityProvider>>, budgets: RateBudgets) -> Self {
        Self { catalog, budgets }
    }

    /// Chain over the built-in HTTP providers
    pub fn http(client: &reqwest::Client, budgets: RateBudgets) -> Self {
        Self::new(HttpProvider::catalog(client), budgets)
    }

    pub fn budgets(&self) -> &RateBudgets {
        &self.budgets
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn IdentityProvider>> {
        let canonical = ProviderKind::from_name(name).map(|kind| kind.name());
        self.catalog
            .iter()
            .find(|provider| provider.name() == name || Some(provider.name()) == canonical)
    }

    /// Try providers in order until one answers
    ///
    /// A provider is skipped without a request when it is disabled, lacks a
    /// required credential, has no implementation, or has spent its budget.
    /// A failed lookup moves on to the next provider in the same call.
    pub async fn resolve_identity(&self, config: &IdentityConfig) -> Result<IdentityRecord, IdentityError> {
        let timeout = config.timeout();
        let mut failures = Vec::new();

        for entry in config.ordered_providers() {
            let attempt = self.attempt(&entry, timeout).await;
            match attempt {
                Ok(record) => {
                    debug!(provider = %record.source, ip = %record.ip, "Identity resolved");
                    return Ok(record);
                }
                Err(reason) => {
                    match &reason {
                        FailureReason::Failed(error) => {
                            warn!(provider = %entry.name, error = %error, "Identity provider failed")
                        }
                        other => debug!(provider = %entry.name, reason = %other, "Identity provider skipped"),
                    }
                    failures.push(ProviderFailure { provider: entry.name.clone(), reason });
                }
            }
        }

        Err(IdentityError::ProviderExhausted { failures })
    }

    async fn attempt(
        &self,
        entry: &ProviderConfig,
        timeout: std::time::Duration,
    ) -> Result<IdentityRecord, FailureReason> {
        if !entry.enabled {
            return Err(FailureReason::Disabled);
        }

        let requires_credential =
            ProviderKind::from_name(&entry.name).is_some_and(|kind| kind.requires_credential());
        if requires_credential && !entry.has_credential() {
            return Err(FailureReason::MissingCredential);
        }

        let provider = self.find(&entry.name).ok_or(FailureReason::NotRegistered)?;

        let budget = self.budgets.budget_for(provider.name(), entry.effective_rate_limit());
        if !budget.try_acquire() {
            return Err(FailureReason::RateLimited);
        }

        let credential = entry.credential.as_deref().filter(|credential| !credential.trim().is_empty());
        let mut record = match tokio::time::timeout(timeout, provider.lookup(credential, timeout)).await {
            Ok(Ok(record)) => record,
            Ok(Err(error)) => return Err(FailureReason::Failed(error)),
            Err(_) => return Err(FailureReason::Failed(ProbeError::Timeout(timeout))),
        };
        record.source = provider.name().to_string();
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimit;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixed {
        name: &'static str,
        ip: Option<&'static str>,
    }

    #[async_trait]
    impl IdentityProvider for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn lookup(&self, _: Option<&str>, _: Duration) -> Result<IdentityRecord, ProbeError> {
            match self.ip {
                Some(ip) => Ok(IdentityRecord::new(ip, "ignored")),
                None => Err(ProbeError::Unreachable("down".into())),
            }
        }
    }

    fn chain(providers: Vec<Fixed>) -> ProviderChain {
        let catalog = providers
            .into_iter()
            .map(|provider| Arc::new(provider) as Arc<dyn IdentityProvider>)
            .collect();
        ProviderChain::new(catalog, RateBudgets::new())
    }

    #[tokio::test]
    async fn test_credentialed_provider_skipped_without_key() {
        let chain = chain(vec![
            Fixed { name: "ipgeolocation", ip: Some("192.0.2.1") },
            Fixed { name: "ipapi", ip: Some("192.0.2.2") },
        ]);
        let config = IdentityConfig {
            providers: vec![ProviderConfig::new("ipgeolocation"), ProviderConfig::new("ipapi")],
            ..IdentityConfig::default()
        };

        let record = chain.resolve_identity(&config).await.unwrap();
        assert_eq!(record.source, "ipapi");
        assert!(chain.budgets().get("ipgeolocation").is_none());
    }

    #[tokio::test]
    async fn test_disabled_and_unregistered_are_reported() {
        let chain = chain(vec![Fixed { name: "ipapi", ip: Some("192.0.2.2") }]);
        let mut disabled = ProviderConfig::new("ipapi");
        disabled.enabled = false;
        let config = IdentityConfig {
            providers: vec![disabled, ProviderConfig::new("ipinfo")],
            ..IdentityConfig::default()
        };

        let error = chain.resolve_identity(&config).await.unwrap_err();
        let reasons: Vec<_> = error.failures().iter().map(|failure| failure.reason.clone()).collect();
        assert_eq!(reasons, vec![FailureReason::Disabled, FailureReason::NotRegistered]);
    }

    #[tokio::test]
    async fn test_aliases_resolve_to_catalog_entry() {
        let chain = chain(vec![Fixed { name: "ipapi", ip: Some("192.0.2.9") }]);
        let mut entry = ProviderConfig::new("ip-api");
        entry.rate_limit = Some(RateLimit::new(3, 60));
        let config = IdentityConfig { providers: vec![entry], ..IdentityConfig::default() };

        let record = chain.resolve_identity(&config).await.unwrap();
        assert_eq!(record.source, "ipapi");
        assert_eq!(chain.budgets().get("ipapi").map(|budget| budget.remaining()), Some(2));
    }
}
