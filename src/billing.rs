//! Billing collaborator seam.
//!
//! Subscription management and webhook sync happen elsewhere; the core only
//! asks for the caller's plan limits before accepting an upload.

use crate::error::Result;

/// Per-plan ceilings consulted by quota checks.
#[derive(Debug, Clone)]
pub struct PlanLimits {
    pub max_file_size: i64,
    pub max_files_per_month: i64,
    pub max_storage_total: i64,
    pub max_downloads_per_file: i64,
}

/// Billing collaborator contract.
#[async_trait::async_trait]
pub trait BillingProvider: Send + Sync {
    async fn get_limits(&self, user_id: &str) -> Result<PlanLimits>;
}

/// Fixed limits for every user, derived from configuration. Stands in for a
/// subscription-backed provider.
pub struct FixedPlanProvider {
    limits: PlanLimits,
}

impl FixedPlanProvider {
    pub fn new(max_file_size: i64) -> Self {
        Self {
            limits: PlanLimits {
                max_file_size,
                max_files_per_month: 100,
                max_storage_total: 10 * 1024 * 1024 * 1024,
                max_downloads_per_file: 100,
            },
        }
    }
}

#[async_trait::async_trait]
impl BillingProvider for FixedPlanProvider {
    async fn get_limits(&self, _user_id: &str) -> Result<PlanLimits> {
        Ok(self.limits.clone())
    }
}
