//! Tenant (company) scoping

use std::fmt::Debug;

use async_trait::async_trait;
use mailout_common::internal;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Unknown company {0}")]
    UnknownCompany(i64),

    #[error("Tenant switch failed: {0}")]
    Backend(String),
}

/// Re-scopes data access to one company at a time
#[async_trait]
pub trait TenantResolver: Send + Sync + Debug {
    /// Scope subsequent data access to `company_id`. A no-op if already
    /// scoped to it.
    async fn switch_to(&self, company_id: i64) -> Result<(), TenantError>;
}

/// Resolver for deployments where every company shares one queue store
///
/// Only remembers the current company, so switches show up in the logs.
#[derive(Debug, Default)]
pub struct SingleTenant {
    current: Mutex<Option<i64>>,
}

impl SingleTenant {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> Option<i64> {
        *self.current.lock()
    }
}

#[async_trait]
impl TenantResolver for SingleTenant {
    async fn switch_to(&self, company_id: i64) -> Result<(), TenantError> {
        let mut current = self.current.lock();
        if *current != Some(company_id) {
            internal!(level = DEBUG, company_id, "Switching company");
            *current = Some(company_id);
        }

        Ok(())
    }
}
