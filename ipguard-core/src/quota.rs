use async_trait::async_trait;
use ipguard_common::IpGuardError;
use uuid::Uuid;

/// Plan system lookup for the default IP quotas of a user or link.
/// `Ok(None)` means the plan does not say, and the configured default applies.
#[async_trait]
pub trait PlanQuotaSource: Send + Sync {
    async fn session_limit(&self, user_id: Uuid) -> Result<Option<u32>, IpGuardError>;

    async fn subscription_limit(&self, subscription_id: Uuid)
        -> Result<Option<u32>, IpGuardError>;
}

/// Used when no plan system is wired in
pub struct ConfiguredQuotas;

#[async_trait]
impl PlanQuotaSource for ConfiguredQuotas {
    async fn session_limit(&self, _user_id: Uuid) -> Result<Option<u32>, IpGuardError> {
        Ok(None)
    }

    async fn subscription_limit(
        &self,
        _subscription_id: Uuid,
    ) -> Result<Option<u32>, IpGuardError> {
        Ok(None)
    }
}
