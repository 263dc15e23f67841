use serde::{Deserialize, Serialize};

/// Per-user (or per-link) IP quota as supplied by the caller.
///
/// The raw encoding shared with the plan system is: `0` defers to the plan
/// default, any negative value disables the check, a positive value is an
/// explicit override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ConcurrencyLimit {
    PlanDefault,
    Unlimited,
    Limited(u32),
}

impl ConcurrencyLimit {
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            0 => Self::PlanDefault,
            x if x < 0 => Self::Unlimited,
            x => Self::Limited(u32::try_from(x).unwrap_or(u32::MAX)),
        }
    }

    pub fn to_raw(self) -> i64 {
        match self {
            Self::PlanDefault => 0,
            Self::Unlimited => -1,
            Self::Limited(n) => n as i64,
        }
    }

    /// Resolves the sentinel against a plan default, where a plan default of 0 means unlimited
    pub fn resolve(self, plan_default: u32) -> EffectiveLimit {
        match self {
            Self::Unlimited => EffectiveLimit::Unlimited,
            Self::Limited(n) => EffectiveLimit::Max(n),
            Self::PlanDefault if plan_default == 0 => EffectiveLimit::Unlimited,
            Self::PlanDefault => EffectiveLimit::Max(plan_default),
        }
    }
}

impl From<i64> for ConcurrencyLimit {
    fn from(raw: i64) -> Self {
        Self::from_raw(raw)
    }
}

impl From<ConcurrencyLimit> for i64 {
    fn from(limit: ConcurrencyLimit) -> Self {
        limit.to_raw()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveLimit {
    Unlimited,
    Max(u32),
}
