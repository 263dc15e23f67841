#![allow(non_snake_case)]

pub mod AccessPartitionLock;
pub mod ActiveSession;
pub mod ActivityRecord;
pub mod AllowEntry;
pub mod DenyEntry;
pub mod FailedAttempt;
pub mod GeoCacheEntry;
pub mod SubscriptionAccess;

pub use ActivityRecord::AccessType;
pub use AllowEntry::ListScope;
