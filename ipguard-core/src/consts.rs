pub const REASON_BLACKLISTED: &str = "Access from this IP address has been blocked by an administrator.";
pub const REASON_CONCURRENT_LIMIT: &str =
    "Too many IP addresses are currently active on this account. Sign out on another device or wait for it to go idle.";
pub const REASON_SUBSCRIPTION_LIMIT: &str =
    "subscription IP limit reached, this link has already been used from too many IP addresses.";
pub const REASON_SERVICE_UNAVAILABLE: &str =
    "Access control is temporarily unavailable, please retry later.";

pub const AUTOMATIC_BAN_CREATOR: &str = "auto-ban";

/// Country name attached to loopback and private addresses
pub const LOCAL_NETWORK_COUNTRY: &str = "Local Network";
