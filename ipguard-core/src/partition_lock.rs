//! Per-partition critical sections.
//!
//! Admission decisions count rows and then insert one. Two requests for the same
//! user racing through that sequence could both see a free slot, so every
//! count-then-insert runs while holding the partition's lock:
//!
//! * an in-process async mutex keyed by `(scope, key)`, which serializes tasks
//!   of this instance and is dropped from the table once nobody holds it, and
//! * a transaction holding a row lock on the partition's `access_partition_locks`
//!   row, which serializes instances sharing the database.
//!
//! Unrelated partitions never share either lock.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use chrono::Utc;
use ipguard_db_entities::AccessPartitionLock;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, QuerySelect, Set,
    TransactionTrait,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionScope {
    User,
    Subscription,
    Ip,
}

impl PartitionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Subscription => "subscription",
            Self::Ip => "ip",
        }
    }
}

impl fmt::Display for PartitionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type PartitionKey = (PartitionScope, String);

#[derive(Clone, Default)]
pub struct PartitionLocks {
    table: Arc<Mutex<HashMap<PartitionKey, Weak<Mutex<()>>>>>,
}

impl PartitionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the in-process lock of a partition
    pub async fn lock_local(&self, scope: PartitionScope, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut table = self.table.lock().await;
            let id = (scope, key.to_owned());
            match table.get(&id).and_then(Weak::upgrade) {
                Some(mutex) => mutex,
                None => {
                    table.retain(|_, weak| weak.strong_count() > 0);
                    let mutex = Arc::new(Mutex::new(()));
                    table.insert(id, Arc::downgrade(&mutex));
                    mutex
                }
            }
        };
        mutex.lock_owned().await
    }

    /// Acquires both the in-process and the database lock of a partition and
    /// returns the transaction that the critical section must run in.
    ///
    /// The caller must not touch `db` directly until the returned
    /// [PartitionTxn] is committed or dropped.
    pub async fn begin(
        &self,
        db: &DatabaseConnection,
        scope: PartitionScope,
        key: &str,
    ) -> Result<PartitionTxn, DbErr> {
        let guard = self.lock_local(scope, key).await;
        let txn = db.begin().await?;

        AccessPartitionLock::Entity::insert(AccessPartitionLock::ActiveModel {
            scope: Set(scope.as_str().to_owned()),
            partition_key: Set(key.to_owned()),
            acquired_at: Set(Utc::now()),
        })
        .on_conflict(
            OnConflict::columns([
                AccessPartitionLock::Column::Scope,
                AccessPartitionLock::Column::PartitionKey,
            ])
            .update_column(AccessPartitionLock::Column::AcquiredAt)
            .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

        // SELECT ... FOR UPDATE, a no-op on SQLite where the write above already
        // serializes writers
        AccessPartitionLock::Entity::find_by_id((scope.as_str().to_owned(), key.to_owned()))
            .lock_exclusive()
            .one(&txn)
            .await?;

        trace!(%scope, key, "Partition locked");
        Ok(PartitionTxn { txn, _guard: guard })
    }

    #[cfg(test)]
    async fn tracked_partitions(&self) -> usize {
        let mut table = self.table.lock().await;
        table.retain(|_, weak| weak.strong_count() > 0);
        table.len()
    }
}

/// A transaction that holds a partition lock until it is committed or dropped
pub struct PartitionTxn {
    txn: DatabaseTransaction,
    _guard: OwnedMutexGuard<()>,
}

impl PartitionTxn {
    pub async fn commit(self) -> Result<(), DbErr> {
        self.txn.commit().await
    }
}

impl Deref for PartitionTxn {
    type Target = DatabaseTransaction;

    fn deref(&self) -> &Self::Target {
        &self.txn
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_partition_is_serialized() {
        let locks = PartitionLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let tasks = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                tokio::spawn(async move {
                    let _guard = locks.lock_local(PartitionScope::User, "alice").await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unrelated_partitions_do_not_block() {
        let locks = PartitionLocks::new();
        let _alice = locks.lock_local(PartitionScope::User, "alice").await;
        let bob = tokio::time::timeout(
            Duration::from_secs(1),
            locks.lock_local(PartitionScope::User, "bob"),
        )
        .await;
        assert!(bob.is_ok());

        let same_key_other_scope = tokio::time::timeout(
            Duration::from_secs(1),
            locks.lock_local(PartitionScope::Subscription, "alice"),
        )
        .await;
        assert!(same_key_other_scope.is_ok());
    }

    #[tokio::test]
    async fn test_released_partitions_are_forgotten() {
        let locks = PartitionLocks::new();
        {
            let _a = locks.lock_local(PartitionScope::Ip, "192.0.2.1").await;
            let _b = locks.lock_local(PartitionScope::Ip, "192.0.2.2").await;
            assert_eq!(locks.tracked_partitions().await, 2);
        }
        assert_eq!(locks.tracked_partitions().await, 0);
    }
}
