use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use ipguard_common::{AutoBanConfig, ConcurrencyLimit, EffectiveLimit, IpGuardError};
use ipguard_db_entities::{AccessType, ActivityRecord};
use poem_openapi::Object;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde::Serialize;
use tracing::*;
use uuid::Uuid;

use crate::access_lists::{ListDecision, ListEvaluator, ListVerdict};
use crate::consts::{
    LOCAL_NETWORK_COUNTRY, REASON_BLACKLISTED, REASON_CONCURRENT_LIMIT, REASON_SUBSCRIPTION_LIMIT,
};
use crate::failed_attempts::{window_start, FailedAttemptTracker};
use crate::geo::{GeoProvider, GeoResolver};
use crate::net::canonical_ip;
use crate::partition_lock::{PartitionLocks, PartitionScope};
use crate::sessions::{ConcurrentSessionLimiter, SessionTouch};
use crate::subscriptions::SubscriptionLinkLimiter;
use crate::{AccessDecision, DenialCode, PlanQuotaSource, SharedConfig};

#[derive(Clone, Debug, Serialize, Object)]
pub struct SecurityStatus {
    pub active_auto_bans: u64,
    pub active_deny_entries: u64,
    pub live_sessions: u64,
    pub failed_attempts_last_hour: u64,
    pub failed_attempts_last_24h: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Object)]
pub struct SweepStats {
    pub stale_sessions_removed: u64,
    pub expired_bans_removed: u64,
    pub old_attempts_removed: u64,
    pub geo_cache_removed: u64,
}

impl SweepStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Composes list evaluation, the failure loop and both limiters into the
/// decisions the request pipeline asks for
#[derive(Clone)]
pub struct AccessOrchestrator {
    db: DatabaseConnection,
    config: SharedConfig,
    locks: PartitionLocks,
    quotas: Arc<dyn PlanQuotaSource>,
    pub lists: ListEvaluator,
    pub failures: FailedAttemptTracker,
    pub sessions: ConcurrentSessionLimiter,
    pub subscriptions: SubscriptionLinkLimiter,
    pub geo: GeoResolver,
}

impl AccessOrchestrator {
    pub fn new(
        db: DatabaseConnection,
        config: SharedConfig,
        geo_provider: Arc<dyn GeoProvider>,
        quotas: Arc<dyn PlanQuotaSource>,
    ) -> Self {
        let locks = PartitionLocks::new();
        let geo = GeoResolver::new(db.clone(), config.clone(), geo_provider);
        Self {
            lists: ListEvaluator::new(db.clone()),
            failures: FailedAttemptTracker::new(db.clone(), config.clone()),
            sessions: ConcurrentSessionLimiter::new(db.clone(), config.clone(), locks.clone()),
            subscriptions: SubscriptionLinkLimiter::new(db.clone(), locks.clone(), geo.clone()),
            geo,
            db,
            config,
            locks,
            quotas,
        }
    }

    /// Turns a deny verdict into a refusal
    async fn list_denial(&self, verdict: &ListVerdict) -> Option<AccessDecision> {
        let entry = verdict.matched_deny()?;
        if entry.automatic {
            let message = self.config.read().await.banned_message();
            Some(AccessDecision::deny(DenialCode::IpAutoBanned, message))
        } else {
            Some(AccessDecision::deny(
                DenialCode::IpBlacklisted,
                REASON_BLACKLISTED,
            ))
        }
    }

    async fn session_limit(
        &self,
        user_id: Uuid,
        max_concurrent: ConcurrencyLimit,
    ) -> Result<EffectiveLimit, IpGuardError> {
        let plan_default = match max_concurrent {
            ConcurrencyLimit::PlanDefault => match self.quotas.session_limit(user_id).await? {
                Some(limit) => limit,
                None => {
                    self.config
                        .read()
                        .await
                        .store
                        .sessions
                        .default_max_concurrent_ips
                }
            },
            _ => 0,
        };
        Ok(max_concurrent.resolve(plan_default))
    }

    async fn subscription_limit(
        &self,
        subscription_id: Uuid,
        max_ips: ConcurrencyLimit,
    ) -> Result<EffectiveLimit, IpGuardError> {
        let plan_default = match max_ips {
            ConcurrencyLimit::PlanDefault => {
                match self.quotas.subscription_limit(subscription_id).await? {
                    Some(limit) => limit,
                    None => self.config.read().await.store.subscriptions.default_max_ips,
                }
            }
            _ => 0,
        };
        Ok(max_ips.resolve(plan_default))
    }

    /// Admission check for an authenticated API or portal request.
    /// `access_type` is accepted for symmetry with [Self::record_activity] and does not affect the outcome.
    pub async fn check_access(
        &self,
        user_id: Uuid,
        ip: IpAddr,
        access_type: AccessType,
        max_concurrent: ConcurrencyLimit,
    ) -> Result<AccessDecision, IpGuardError> {
        let ip = canonical_ip(ip);
        let verdict = self.lists.evaluate(ip, Some(user_id)).await?;

        if let Some(decision) = self.list_denial(&verdict).await {
            info!(%user_id, %ip, ?access_type, code = ?decision.code, "Access denied by deny list");
            return Ok(decision);
        }
        if verdict.decision == ListDecision::Allow {
            debug!(%user_id, %ip, "Access allowed by allow list");
            return Ok(AccessDecision::allow(None));
        }

        let limit = self.session_limit(user_id, max_concurrent).await?;
        let admission = self.sessions.admit(user_id, ip, limit).await?;

        if admission.allowed {
            return Ok(AccessDecision::allow(admission.remaining_slots));
        }

        info!(%user_id, %ip, ?access_type, online = admission.online_ips.len(), "Access denied by concurrent IP limit");
        Ok(
            AccessDecision::deny(DenialCode::ConcurrentIpLimit, REASON_CONCURRENT_LIMIT)
                .with_slots(0, admission.online_ips),
        )
    }

    /// Admission check for a subscription link fetch. `user_id` is the link owner when known,
    /// which brings that user's own list entries into play.
    pub async fn check_subscription_access(
        &self,
        subscription_id: Uuid,
        user_id: Option<Uuid>,
        ip: IpAddr,
        user_agent: &str,
        max_ips: ConcurrencyLimit,
    ) -> Result<AccessDecision, IpGuardError> {
        let ip = canonical_ip(ip);
        let verdict = self.lists.evaluate(ip, user_id).await?;

        if let Some(decision) = self.list_denial(&verdict).await {
            info!(%subscription_id, %ip, code = ?decision.code, "Subscription access denied by deny list");
            return Ok(decision);
        }

        let limit = if verdict.decision == ListDecision::Allow {
            EffectiveLimit::Unlimited
        } else {
            self.subscription_limit(subscription_id, max_ips).await?
        };
        let admission = self
            .subscriptions
            .admit(subscription_id, ip, user_agent, limit)
            .await?;

        if admission.allowed {
            return Ok(AccessDecision::allow(admission.remaining_slots));
        }

        Ok(AccessDecision::deny(
            DenialCode::SubscriptionIpLimit,
            REASON_SUBSCRIPTION_LIMIT,
        )
        .with_slots(0, vec![]))
    }

    /// Bookkeeping after an admitted request. Refreshes the user's session row
    /// and appends an audit record; never refuses anything.
    pub async fn record_activity(
        &self,
        user_id: Uuid,
        ip: IpAddr,
        user_agent: &str,
        access_type: AccessType,
    ) -> Result<ActivityRecord::Model, IpGuardError> {
        let ip = canonical_ip(ip);
        let now = Utc::now();
        let geo = self.geo.resolve(ip).await;
        let device_type = classify_device(user_agent);

        let is_suspicious = match geo.country.as_deref() {
            Some(country) if country != LOCAL_NETWORK_COUNTRY => self
                .sessions
                .other_live_countries(user_id, ip)
                .await?
                .iter()
                .any(|other| other != country && other != LOCAL_NETWORK_COUNTRY),
            _ => false,
        };

        let counted = self
            .sessions
            .touch(
                user_id,
                ip,
                SessionTouch {
                    user_agent,
                    device_type,
                    geo: &geo,
                },
                now,
            )
            .await?;
        if !counted {
            trace!(%user_id, %ip, "Activity from an address that holds no session slot");
        }

        let record = ActivityRecord::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            ip: Set(ip.to_string()),
            user_agent: Set(user_agent.to_owned()),
            access_type: Set(access_type),
            country: Set(geo.country.clone()),
            city: Set(geo.city.clone()),
            is_suspicious: Set(is_suspicious),
            created_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        if is_suspicious {
            warn!(%user_id, %ip, country = ?geo.country, "Activity from a new country while other sessions are live");
        }
        Ok(record)
    }

    /// Returns whether the IP is banned after this failure
    pub async fn record_failed_attempt(
        &self,
        ip: IpAddr,
        reason: &str,
    ) -> Result<bool, IpGuardError> {
        let ip = canonical_ip(ip);
        if !self.config.read().await.store.auto_ban.enabled {
            return Ok(false);
        }
        self.failures.record_failure(ip, reason).await?;
        self.check_auto_blacklist(ip).await
    }

    /// Bans the IP if it crossed the failure threshold, and reports whether an automatic ban is in force
    pub async fn check_auto_blacklist(&self, ip: IpAddr) -> Result<bool, IpGuardError> {
        let ip = canonical_ip(ip);
        let config = self.config.read().await.store.auto_ban.clone();
        let now = Utc::now();

        let txn = self
            .locks
            .begin(&self.db, PartitionScope::Ip, &ip.to_string())
            .await?;

        let latest = ListEvaluator::latest_automatic_deny(&*txn, ip).await?;
        if latest.as_ref().is_some_and(|ban| ban.is_active_at(now)) {
            txn.commit().await?;
            return Ok(true);
        }
        if !config.enabled {
            txn.commit().await?;
            return Ok(false);
        }

        // Failures that led to a previous ban don't count again
        let mut since = window_start(now, config.time_window);
        if let Some(previous) = &latest {
            since = std::cmp::max(since, previous.updated_at);
        }
        let count = FailedAttemptTracker::count_since(&*txn, ip, since).await?;

        let banned = count >= ban_threshold(&config);
        if banned {
            ListEvaluator::ensure_automatic_deny(&*txn, ip, &config, now).await?;
        }
        txn.commit().await?;
        Ok(banned)
    }

    pub async fn record_successful_login(&self, ip: IpAddr) -> Result<(), IpGuardError> {
        let ip = canonical_ip(ip);
        let cleared = FailedAttemptTracker::clear(&self.db, ip).await?;
        if cleared > 0 {
            debug!(%ip, cleared, "Cleared failed attempts after successful login");
        }
        Ok(())
    }

    /// Lifts automatic bans and forgets recorded failures so that the IP is not re-banned right away
    pub async fn unban_ip(&self, ip: IpAddr) -> Result<u64, IpGuardError> {
        let ip = canonical_ip(ip);
        let txn = self
            .locks
            .begin(&self.db, PartitionScope::Ip, &ip.to_string())
            .await?;
        let lifted = ListEvaluator::lift_automatic_denies(&*txn, ip).await?;
        FailedAttemptTracker::clear(&*txn, ip).await?;
        txn.commit().await?;
        info!(%ip, lifted, "IP unbanned (attempt records cleared)");
        Ok(lifted)
    }

    pub async fn security_status(&self) -> Result<SecurityStatus, IpGuardError> {
        let now = Utc::now();
        let (active_auto_bans, active_deny_entries) = self.lists.count_active_denies().await?;
        Ok(SecurityStatus {
            active_auto_bans,
            active_deny_entries,
            live_sessions: self.sessions.count_live().await?,
            failed_attempts_last_hour: self
                .failures
                .count_all_since(now - chrono::Duration::hours(1))
                .await?,
            failed_attempts_last_24h: self
                .failures
                .count_all_since(now - chrono::Duration::hours(24))
                .await?,
        })
    }

    /// Maintenance pass. Every table is cleaned in bounded batches without a global lock.
    pub async fn sweep(&self) -> Result<SweepStats, IpGuardError> {
        let (batch_size, cooldown) = {
            let config = self.config.read().await;
            (
                config.store.maintenance.batch_size,
                config.store.auto_ban.cooldown_reset,
            )
        };

        let stats = SweepStats {
            stale_sessions_removed: self.sessions.sweep_stale(batch_size).await?,
            expired_bans_removed: self
                .lists
                .sweep_expired_automatic(batch_size, cooldown)
                .await?,
            old_attempts_removed: self.failures.sweep_old(batch_size).await?,
            geo_cache_removed: self.geo.sweep_expired(batch_size).await?,
        };

        if !stats.is_empty() {
            info!(
                stale_sessions = stats.stale_sessions_removed,
                expired_bans = stats.expired_bans_removed,
                old_attempts = stats.old_attempts_removed,
                geo_cache = stats.geo_cache_removed,
                "Maintenance sweep completed"
            );
        }
        Ok(stats)
    }
}

/// An IP needs at least one recorded failure before it can be banned
fn ban_threshold(config: &AutoBanConfig) -> u64 {
    u64::from(config.max_attempts.max(1))
}

/// Coarse device class from a User-Agent header
pub fn classify_device(user_agent: &str) -> &'static str {
    let ua = user_agent.to_ascii_lowercase();
    if ua.trim().is_empty() {
        return "unknown";
    }
    if ["bot", "crawler", "spider", "headless"]
        .iter()
        .any(|k| ua.contains(k))
    {
        return "bot";
    }
    if ua.contains("ipad") || ua.contains("tablet") || (ua.contains("android") && !ua.contains("mobile")) {
        return "tablet";
    }
    if ["mobile", "iphone", "ipod", "android", "windows phone"]
        .iter()
        .any(|k| ua.contains(k))
    {
        return "mobile";
    }
    if ["windows", "macintosh", "mac os x", "x11", "linux", "cros"]
        .iter()
        .any(|k| ua.contains(k))
    {
        return "desktop";
    }
    "unknown"
}
