use std::net::IpAddr;

use chrono::{DateTime, Utc};
use ipguard_common::{AutoBanConfig, IpGuardError};
use ipguard_db_entities::{AllowEntry, DenyEntry, ListScope};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use tracing::*;
use uuid::Uuid;

use crate::consts::AUTOMATIC_BAN_CREATOR;
use crate::db::delete_in_batches;
use crate::failed_attempts::calculate_ban_duration;
use crate::net::IpTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListDecision {
    Allow,
    Deny,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchedEntry {
    Allow(AllowEntry::Model),
    Deny(DenyEntry::Model),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListVerdict {
    pub decision: ListDecision,
    pub matched_entry: Option<MatchedEntry>,
}

impl ListVerdict {
    fn neutral() -> Self {
        Self {
            decision: ListDecision::Neutral,
            matched_entry: None,
        }
    }

    pub fn matched_deny(&self) -> Option<&DenyEntry::Model> {
        match &self.matched_entry {
            Some(MatchedEntry::Deny(entry)) => Some(entry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAllowEntry {
    pub ip_or_cidr: String,
    pub scope: ListScope,
    pub user_id: Option<Uuid>,
    pub description: String,
    pub created_by: String,
}

#[derive(Debug, Clone)]
pub struct NewDenyEntry {
    pub ip_or_cidr: String,
    pub scope: ListScope,
    pub user_id: Option<Uuid>,
    pub reason: String,
    pub created_by: String,
    pub expires_at: Option<DateTime<Utc>>,
}

fn validate_scope(scope: ListScope, user_id: Option<Uuid>) -> Result<(), IpGuardError> {
    match (scope, user_id) {
        (ListScope::User, None) => Err(IpGuardError::InvalidEntry(
            "user-scoped entries require a user_id".into(),
        )),
        (ListScope::Global, Some(_)) => Err(IpGuardError::InvalidEntry(
            "global entries must not carry a user_id".into(),
        )),
        _ => Ok(()),
    }
}

/// Stored entries are trusted to be canonical, anything unparseable never matches
fn entry_matches(ip_or_cidr: &str, ip: &IpAddr) -> bool {
    match IpTarget::parse(ip_or_cidr) {
        Ok(target) => target.contains(ip),
        Err(_) => {
            warn!(entry = ip_or_cidr, "Ignoring malformed list entry");
            false
        }
    }
}

/// Evaluates client addresses against the allow and deny lists
#[derive(Clone)]
pub struct ListEvaluator {
    db: DatabaseConnection,
}

impl ListEvaluator {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn evaluate(
        &self,
        ip: IpAddr,
        user_id: Option<Uuid>,
    ) -> Result<ListVerdict, IpGuardError> {
        Self::evaluate_in(&self.db, ip, user_id, Utc::now()).await
    }

    /// Precedence: user allow, user deny, global allow, global deny, otherwise neutral
    pub async fn evaluate_in<C: ConnectionTrait>(
        conn: &C,
        ip: IpAddr,
        user_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<ListVerdict, IpGuardError> {
        let ip_str = ip.to_string();

        let allows = AllowEntry::Entity::find()
            .filter(
                Condition::any()
                    .add(AllowEntry::Column::IpOrCidr.eq(&ip_str))
                    .add(AllowEntry::Column::IsRange.eq(true)),
            )
            .filter(Self::allow_scope(user_id))
            .all(conn)
            .await?
            .into_iter()
            .filter(|e| entry_matches(&e.ip_or_cidr, &ip))
            .collect::<Vec<_>>();

        let denies = DenyEntry::Entity::find()
            .filter(
                Condition::any()
                    .add(DenyEntry::Column::IpOrCidr.eq(&ip_str))
                    .add(DenyEntry::Column::IsRange.eq(true)),
            )
            .filter(Self::deny_scope(user_id))
            .filter(Self::deny_active(now))
            .order_by_asc(DenyEntry::Column::Automatic)
            .all(conn)
            .await?
            .into_iter()
            .filter(|e| entry_matches(&e.ip_or_cidr, &ip))
            .collect::<Vec<_>>();

        for scope in [ListScope::User, ListScope::Global] {
            if let Some(entry) = allows.iter().find(|e| e.scope == scope) {
                return Ok(ListVerdict {
                    decision: ListDecision::Allow,
                    matched_entry: Some(MatchedEntry::Allow(entry.clone())),
                });
            }
            if let Some(entry) = denies.iter().find(|e| e.scope == scope) {
                return Ok(ListVerdict {
                    decision: ListDecision::Deny,
                    matched_entry: Some(MatchedEntry::Deny(entry.clone())),
                });
            }
        }

        Ok(ListVerdict::neutral())
    }

    /// Entries that apply to `user_id`: global ones plus that user's own
    fn allow_scope(user_id: Option<Uuid>) -> Condition {
        let mut condition = Condition::any().add(AllowEntry::Column::Scope.eq(ListScope::Global));
        if let Some(user_id) = user_id {
            condition = condition.add(
                Condition::all()
                    .add(AllowEntry::Column::Scope.eq(ListScope::User))
                    .add(AllowEntry::Column::UserId.eq(user_id)),
            );
        }
        condition
    }

    fn deny_scope(user_id: Option<Uuid>) -> Condition {
        let mut condition = Condition::any().add(DenyEntry::Column::Scope.eq(ListScope::Global));
        if let Some(user_id) = user_id {
            condition = condition.add(
                Condition::all()
                    .add(DenyEntry::Column::Scope.eq(ListScope::User))
                    .add(DenyEntry::Column::UserId.eq(user_id)),
            );
        }
        condition
    }

    fn deny_active(now: DateTime<Utc>) -> Condition {
        Condition::any()
            .add(DenyEntry::Column::ExpiresAt.is_null())
            .add(DenyEntry::Column::ExpiresAt.gt(now))
    }

    pub async fn add_allow_entry(
        &self,
        entry: NewAllowEntry,
    ) -> Result<AllowEntry::Model, IpGuardError> {
        validate_scope(entry.scope, entry.user_id)?;
        let target = IpTarget::parse(&entry.ip_or_cidr)?;

        let model = AllowEntry::ActiveModel {
            id: Set(Uuid::new_v4()),
            ip_or_cidr: Set(target.to_string()),
            is_range: Set(target.is_range()),
            scope: Set(entry.scope),
            user_id: Set(entry.user_id),
            description: Set(entry.description),
            created_by: Set(entry.created_by),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;

        info!(entry = %model.ip_or_cidr, scope = ?model.scope, user_id = ?model.user_id, "Allow entry added");
        Ok(model)
    }

    pub async fn add_deny_entry(
        &self,
        entry: NewDenyEntry,
    ) -> Result<DenyEntry::Model, IpGuardError> {
        validate_scope(entry.scope, entry.user_id)?;
        let target = IpTarget::parse(&entry.ip_or_cidr)?;
        let now = Utc::now();
        if let Some(expires_at) = entry.expires_at {
            if expires_at <= now {
                return Err(IpGuardError::InvalidEntry(
                    "expires_at must be in the future".into(),
                ));
            }
        }

        let model = DenyEntry::ActiveModel {
            id: Set(Uuid::new_v4()),
            ip_or_cidr: Set(target.to_string()),
            is_range: Set(target.is_range()),
            scope: Set(entry.scope),
            user_id: Set(entry.user_id),
            reason: Set(entry.reason),
            created_by: Set(entry.created_by),
            expires_at: Set(entry.expires_at),
            automatic: Set(false),
            offense_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        info!(
            entry = %model.ip_or_cidr,
            scope = ?model.scope,
            user_id = ?model.user_id,
            expires_at = ?model.expires_at,
            "Deny entry added"
        );
        Ok(model)
    }

    pub async fn remove_allow_entry(&self, id: Uuid) -> Result<(), IpGuardError> {
        let result = AllowEntry::Entity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(IpGuardError::EntryNotFound(id));
        }
        info!(%id, "Allow entry removed");
        Ok(())
    }

    pub async fn remove_deny_entry(&self, id: Uuid) -> Result<(), IpGuardError> {
        let result = DenyEntry::Entity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(IpGuardError::EntryNotFound(id));
        }
        info!(%id, "Deny entry removed");
        Ok(())
    }

    pub async fn list_allow_entries(
        &self,
        user_id: Option<Uuid>,
    ) -> Result<Vec<AllowEntry::Model>, IpGuardError> {
        let mut query = AllowEntry::Entity::find().order_by_asc(AllowEntry::Column::CreatedAt);
        if let Some(user_id) = user_id {
            query = query.filter(AllowEntry::Column::UserId.eq(user_id));
        }
        Ok(query.all(&self.db).await?)
    }

    pub async fn list_deny_entries(
        &self,
        include_expired: bool,
        user_id: Option<Uuid>,
    ) -> Result<Vec<DenyEntry::Model>, IpGuardError> {
        let mut query = DenyEntry::Entity::find().order_by_asc(DenyEntry::Column::CreatedAt);
        if !include_expired {
            query = query.filter(Self::deny_active(Utc::now()));
        }
        if let Some(user_id) = user_id {
            query = query.filter(DenyEntry::Column::UserId.eq(user_id));
        }
        Ok(query.all(&self.db).await?)
    }

    /// The most recent automatic ban for an IP, active or not
    pub async fn latest_automatic_deny<C: ConnectionTrait>(
        conn: &C,
        ip: IpAddr,
    ) -> Result<Option<DenyEntry::Model>, DbErr> {
        DenyEntry::Entity::find()
            .filter(DenyEntry::Column::IpOrCidr.eq(ip.to_string()))
            .filter(DenyEntry::Column::Automatic.eq(true))
            .order_by_desc(DenyEntry::Column::UpdatedAt)
            .one(conn)
            .await
    }

    /// Bans an IP after too many failures. At most one automatic entry exists per IP:
    /// an active ban is extended, an expired one is re-armed with an escalated duration.
    pub async fn ensure_automatic_deny<C: ConnectionTrait>(
        conn: &C,
        ip: IpAddr,
        config: &AutoBanConfig,
        now: DateTime<Utc>,
    ) -> Result<DenyEntry::Model, IpGuardError> {
        let existing = Self::latest_automatic_deny(conn, ip).await?;

        let model = match existing {
            Some(entry) if entry.is_active_at(now) => {
                let duration = ban_duration(entry.offense_count, config);
                let expires_at = match entry.expires_at {
                    Some(current) => std::cmp::max(current, now + duration),
                    None => return Ok(entry),
                };
                let mut model: DenyEntry::ActiveModel = entry.into();
                model.expires_at = Set(Some(expires_at));
                model.updated_at = Set(now);
                model.update(conn).await?
            }
            Some(entry) => {
                let ended_at = entry.expires_at.unwrap_or(now);
                let cooldown = chrono::Duration::from_std(config.cooldown_reset)
                    .unwrap_or(chrono::Duration::MAX);
                let offense_count = if now.signed_duration_since(ended_at) > cooldown {
                    1
                } else {
                    entry.offense_count.saturating_add(1)
                };
                let duration = ban_duration(offense_count, config);
                let mut model: DenyEntry::ActiveModel = entry.into();
                model.offense_count = Set(offense_count);
                model.expires_at = Set(Some(now + duration));
                model.reason = Set(ban_reason(config, offense_count));
                model.updated_at = Set(now);
                model.update(conn).await?
            }
            None => {
                let duration = ban_duration(1, config);
                DenyEntry::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    ip_or_cidr: Set(ip.to_string()),
                    is_range: Set(false),
                    scope: Set(ListScope::Global),
                    user_id: Set(None),
                    reason: Set(ban_reason(config, 1)),
                    created_by: Set(AUTOMATIC_BAN_CREATOR.to_owned()),
                    expires_at: Set(Some(now + duration)),
                    automatic: Set(true),
                    offense_count: Set(1),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(conn)
                .await?
            }
        };

        info!(
            %ip,
            offense_count = model.offense_count,
            expires_at = ?model.expires_at,
            "IP auto-banned"
        );
        Ok(model)
    }

    pub async fn lift_automatic_denies<C: ConnectionTrait>(
        conn: &C,
        ip: IpAddr,
    ) -> Result<u64, DbErr> {
        let result = DenyEntry::Entity::delete_many()
            .filter(DenyEntry::Column::IpOrCidr.eq(ip.to_string()))
            .filter(DenyEntry::Column::Automatic.eq(true))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Returns `(automatic, manual)` counts of deny entries in force
    pub async fn count_active_denies(&self) -> Result<(u64, u64), DbErr> {
        let now = Utc::now();
        let automatic = DenyEntry::Entity::find()
            .filter(Self::deny_active(now))
            .filter(DenyEntry::Column::Automatic.eq(true))
            .count(&self.db)
            .await?;
        let manual = DenyEntry::Entity::find()
            .filter(Self::deny_active(now))
            .filter(DenyEntry::Column::Automatic.eq(false))
            .count(&self.db)
            .await?;
        Ok((automatic, manual))
    }

    /// Removes automatic bans that ended more than `cooldown` ago. Younger ones are
    /// kept so that a repeat offender's ban escalates.
    pub async fn sweep_expired_automatic(
        &self,
        batch_size: u64,
        cooldown: std::time::Duration,
    ) -> Result<u64, DbErr> {
        let cooldown = chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(cooldown)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = delete_in_batches!(
            &self.db,
            DenyEntry,
            Id: Uuid,
            batch_size,
            Condition::all()
                .add(DenyEntry::Column::Automatic.eq(true))
                .add(DenyEntry::Column::ExpiresAt.is_not_null())
                .add(DenyEntry::Column::ExpiresAt.lt(cutoff))
        );
        Ok(removed)
    }
}

fn ban_duration(offense_count: i32, config: &AutoBanConfig) -> chrono::Duration {
    let duration = calculate_ban_duration(offense_count.max(0) as u32, config);
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

fn ban_reason(config: &AutoBanConfig, offense_count: i32) -> String {
    if offense_count > 1 {
        format!(
            "Exceeded {} failed authentication attempts (ban #{})",
            config.max_attempts, offense_count
        )
    } else {
        format!(
            "Exceeded {} failed authentication attempts",
            config.max_attempts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_validation() {
        let user = Some(Uuid::new_v4());
        assert!(validate_scope(ListScope::Global, None).is_ok());
        assert!(validate_scope(ListScope::User, user).is_ok());
        assert!(matches!(
            validate_scope(ListScope::User, None),
            Err(IpGuardError::InvalidEntry(_))
        ));
        assert!(matches!(
            validate_scope(ListScope::Global, user),
            Err(IpGuardError::InvalidEntry(_))
        ));
    }

    #[test]
    fn test_entry_matching() {
        let ip: IpAddr = "10.20.30.40".parse().unwrap();
        assert!(entry_matches("10.20.30.40", &ip));
        assert!(entry_matches("10.20.0.0/16", &ip));
        assert!(!entry_matches("10.21.0.0/16", &ip));
        assert!(!entry_matches("not-an-ip", &ip));
    }

    #[test]
    fn test_ban_reason_mentions_repeat_offense() {
        let config = AutoBanConfig::default();
        assert!(!ban_reason(&config, 1).contains("ban #"));
        assert!(ban_reason(&config, 3).contains("ban #3"));
    }
}
