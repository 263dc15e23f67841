mod defaults;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use defaults::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Secret;

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct HttpConfig {
    #[serde(default = "_default_http_listen")]
    pub listen: SocketAddr,

    #[serde(default)]
    pub trust_x_forwarded_headers: bool,

    /// Token expected in the `X-IpGuard-Token` header of admin API requests
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub admin_token: Option<Secret<String>>,

    #[serde(default = "_default_admission_timeout", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub admission_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            listen: _default_http_listen(),
            trust_x_forwarded_headers: false,
            admin_token: None,
            admission_timeout: _default_admission_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct SessionLimitConfig {
    /// An IP stops counting against the quota once it has been idle this long
    #[serde(default = "_default_activity_window", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub activity_window: Duration,

    /// Used when neither the user nor the plan specify a limit. 0 means unlimited.
    #[serde(default = "_default_max_concurrent_ips")]
    pub default_max_concurrent_ips: u32,
}

impl Default for SessionLimitConfig {
    fn default() -> Self {
        Self {
            activity_window: _default_activity_window(),
            default_max_concurrent_ips: _default_max_concurrent_ips(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct SubscriptionLimitConfig {
    /// 0 means unlimited
    #[serde(default = "_default_subscription_max_ips")]
    pub default_max_ips: u32,
}

impl Default for SubscriptionLimitConfig {
    fn default() -> Self {
        Self {
            default_max_ips: _default_subscription_max_ips(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct AutoBanConfig {
    #[serde(default = "_default_true")]
    pub enabled: bool,

    #[serde(default = "_default_max_failed_attempts")]
    pub max_attempts: u32,

    #[serde(default = "_default_failed_attempt_window", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub time_window: Duration,

    #[serde(default = "_default_ban_duration", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub ban_duration: Duration,

    /// Each repeated ban within the cooldown lasts this many times longer than the previous one
    #[serde(default = "_default_ban_duration_multiplier")]
    pub duration_multiplier: f32,

    #[serde(default = "_default_max_ban_duration", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub max_ban_duration: Duration,

    /// Offense count resets once the previous ban has been over for this long
    #[serde(default = "_default_cooldown_reset", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub cooldown_reset: Duration,

    #[serde(default = "_default_failed_attempt_retention", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub retention: Duration,

    #[serde(default)]
    pub banned_message: Option<String>,
}

impl Default for AutoBanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: _default_max_failed_attempts(),
            time_window: _default_failed_attempt_window(),
            ban_duration: _default_ban_duration(),
            duration_multiplier: _default_ban_duration_multiplier(),
            max_ban_duration: _default_max_ban_duration(),
            cooldown_reset: _default_cooldown_reset(),
            retention: _default_failed_attempt_retention(),
            banned_message: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct GeoConfig {
    #[serde(default = "_default_false")]
    pub enabled: bool,

    /// `{ip}` is replaced with the address being looked up
    #[serde(default = "_default_geo_provider_url")]
    pub provider_url: String,

    #[serde(default = "_default_geo_cache_ttl", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub cache_ttl: Duration,

    #[serde(default = "_default_geo_lookup_timeout", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub lookup_timeout: Duration,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider_url: _default_geo_provider_url(),
            cache_ttl: _default_geo_cache_ttl(),
            lookup_timeout: _default_geo_lookup_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct MaintenanceConfig {
    #[serde(default = "_default_maintenance_interval", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub interval: Duration,

    /// Maximum number of rows removed per delete statement
    #[serde(default = "_default_maintenance_batch_size")]
    pub batch_size: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: _default_maintenance_interval(),
            batch_size: _default_maintenance_batch_size(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct IpGuardConfigStore {
    #[serde(default = "_default_database_url")]
    #[schemars(with = "String")]
    pub database_url: Secret<String>,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub sessions: SessionLimitConfig,

    #[serde(default)]
    pub subscriptions: SubscriptionLimitConfig,

    #[serde(default)]
    pub auto_ban: AutoBanConfig,

    #[serde(default)]
    pub geo: GeoConfig,

    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

impl Default for IpGuardConfigStore {
    fn default() -> Self {
        Self {
            database_url: _default_database_url(),
            http: <_>::default(),
            sessions: <_>::default(),
            subscriptions: <_>::default(),
            auto_ban: <_>::default(),
            geo: <_>::default(),
            maintenance: <_>::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IpGuardConfig {
    pub store: IpGuardConfigStore,
    pub paths_relative_to: PathBuf,
}

impl IpGuardConfig {
    pub fn banned_message(&self) -> String {
        self.store.auto_ban.banned_message.clone().unwrap_or_else(|| {
            "Your IP has been temporarily blocked due to too many failed authentication attempts."
                .to_string()
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.store.auto_ban.max_attempts == 0 {
            anyhow::bail!("`auto_ban.max_attempts` must be at least 1");
        }
        if self.store.http.admin_token.is_none() {
            warn!("`http.admin_token` is not set - the admin API will reject every request.");
        }
        if self.store.auto_ban.duration_multiplier < 1.0 {
            warn!("`auto_ban.duration_multiplier` is below 1.0 - repeated bans will get shorter.");
        }
        if self.store.geo.enabled && !self.store.geo.provider_url.contains("{ip}") {
            warn!("`geo.provider_url` has no `{{ip}}` placeholder - every lookup will hit the same URL.");
        }
        Ok(())
    }
}
