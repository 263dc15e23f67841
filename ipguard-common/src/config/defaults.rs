use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::Secret;

pub(crate) const fn _default_true() -> bool {
    true
}

pub(crate) const fn _default_false() -> bool {
    false
}

#[inline]
pub(crate) fn _default_database_url() -> Secret<String> {
    Secret::new("sqlite:data/db".to_owned())
}

#[inline]
pub(crate) fn _default_http_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8899))
}

#[inline]
pub(crate) fn _default_admission_timeout() -> Duration {
    Duration::from_secs(5)
}

#[inline]
pub(crate) fn _default_activity_window() -> Duration {
    Duration::from_secs(60 * 30)
}

pub(crate) const fn _default_max_concurrent_ips() -> u32 {
    3
}

pub(crate) const fn _default_subscription_max_ips() -> u32 {
    5
}

pub(crate) const fn _default_max_failed_attempts() -> u32 {
    10
}

#[inline]
pub(crate) fn _default_failed_attempt_window() -> Duration {
    Duration::from_secs(60 * 15)
}

#[inline]
pub(crate) fn _default_ban_duration() -> Duration {
    Duration::from_secs(60 * 60)
}

pub(crate) const fn _default_ban_duration_multiplier() -> f32 {
    1.0
}

#[inline]
pub(crate) fn _default_max_ban_duration() -> Duration {
    Duration::from_secs(60 * 60 * 24)
}

#[inline]
pub(crate) fn _default_cooldown_reset() -> Duration {
    Duration::from_secs(60 * 60 * 24)
}

#[inline]
pub(crate) fn _default_failed_attempt_retention() -> Duration {
    Duration::from_secs(60 * 60 * 24 * 7)
}

#[inline]
pub(crate) fn _default_geo_provider_url() -> String {
    "http://ip-api.com/json/{ip}".to_owned()
}

#[inline]
pub(crate) fn _default_geo_cache_ttl() -> Duration {
    Duration::from_secs(60 * 60 * 24 * 7)
}

#[inline]
pub(crate) fn _default_geo_lookup_timeout() -> Duration {
    Duration::from_secs(3)
}

#[inline]
pub(crate) fn _default_maintenance_interval() -> Duration {
    Duration::from_secs(60 * 5)
}

pub(crate) const fn _default_maintenance_batch_size() -> u64 {
    500
}
