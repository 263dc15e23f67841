pub mod access_lists;
pub mod consts;
pub mod db;
mod decision;
pub mod failed_attempts;
pub mod geo;
pub mod net;
mod orchestrator;
pub mod partition_lock;
mod quota;
mod services;
pub mod sessions;
pub mod subscriptions;

pub use decision::*;
pub use orchestrator::*;
pub use quota::*;
pub use services::*;

use std::sync::Arc;

use ipguard_common::IpGuardConfig;
use tokio::sync::RwLock;

/// Live configuration shared by every component; the admin API may update it at runtime
pub type SharedConfig = Arc<RwLock<IpGuardConfig>>;
