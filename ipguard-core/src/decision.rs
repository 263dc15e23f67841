use std::fmt;

use poem_openapi::{Enum, Object};
use serde::Serialize;

/// Machine-readable reason attached to a refused request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Enum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[oai(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialCode {
    IpBlacklisted,
    IpAutoBanned,
    ConcurrentIpLimit,
    SubscriptionIpLimit,
    ServiceUnavailable,
}

impl DenialCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IpBlacklisted => "IP_BLACKLISTED",
            Self::IpAutoBanned => "IP_AUTO_BANNED",
            Self::ConcurrentIpLimit => "CONCURRENT_IP_LIMIT",
            Self::SubscriptionIpLimit => "SUBSCRIPTION_IP_LIMIT",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for DenialCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Object)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub code: Option<DenialCode>,
    pub remaining_slots: Option<u32>,
    pub online_ips: Vec<String>,
}

impl AccessDecision {
    pub fn allow(remaining_slots: Option<u32>) -> Self {
        Self {
            allowed: true,
            reason: None,
            code: None,
            remaining_slots,
            online_ips: vec![],
        }
    }

    pub fn deny(code: DenialCode, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            code: Some(code),
            remaining_slots: None,
            online_ips: vec![],
        }
    }

    pub fn with_slots(mut self, remaining_slots: u32, online_ips: Vec<String>) -> Self {
        self.remaining_slots = Some(remaining_slots);
        self.online_ips = online_ips;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_serialize_screaming() {
        assert_eq!(
            serde_json::to_string(&DenialCode::ConcurrentIpLimit).unwrap(),
            "\"CONCURRENT_IP_LIMIT\""
        );
        assert_eq!(
            serde_json::to_string(&DenialCode::IpAutoBanned).unwrap(),
            format!("\"{}\"", DenialCode::IpAutoBanned)
        );
    }
}
