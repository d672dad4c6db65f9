//! Public identity resolution over a chain of rate-limited providers.

mod budget;
mod chain;
mod provider;
mod record;

pub use budget::{RateBudget, RateBudgets};
pub use chain::ProviderChain;
pub use provider::{HttpProvider, IdentityProvider, ProviderKind};
pub use record::IdentityRecord;
