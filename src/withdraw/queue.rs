//! Persisted withdrawal queue and its lock.

use log::warn;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{ClientError, Result};
use crate::store::{cf_names, keys, DatabaseManager};
use crate::withdraw::record::{PendingWithdrawal, WithdrawalStatus};

/// Serializes withdrawal record creation and state transitions.
///
/// Kept separate from [`crate::deposit::DepositGenerationLock`]: the two
/// pipelines contend on different records, and a slow relayer must never
/// stall note derivation.
#[derive(Default)]
pub struct WithdrawalQueueLock(Mutex<()>);

impl WithdrawalQueueLock {
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }
}

/// Withdrawal records in `cf_pending_withdrawals`, guarded by the queue lock.
pub struct WithdrawalQueue {
    db: DatabaseManager,
    lock: WithdrawalQueueLock,
}

impl WithdrawalQueue {
    pub fn new(db: DatabaseManager) -> Self {
        Self {
            db,
            lock: WithdrawalQueueLock::default(),
        }
    }

    /// Persist a freshly created record.
    pub async fn insert(&self, record: &PendingWithdrawal) -> Result<()> {
        let _guard = self.lock.acquire().await;
        self.put(record)
    }

    fn put(&self, record: &PendingWithdrawal) -> Result<()> {
        let key = keys::withdrawal_key(record.chain_id, &record.pending_id);
        let value = serde_json::to_vec(record)?;
        self.db.put_cf(cf_names::WITHDRAWALS, &key, &value)?;
        Ok(())
    }

    pub fn get(&self, chain_id: u64, pending_id: &str) -> Result<PendingWithdrawal> {
        let key = keys::withdrawal_key(chain_id, pending_id);
        let raw = self
            .db
            .get_cf(cf_names::WITHDRAWALS, &key)?
            .ok_or_else(|| ClientError::NotFound {
                entity: "withdrawal",
                id: pending_id.to_string(),
            })?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Every record for one chain.
    pub fn for_chain(&self, chain_id: u64) -> Result<Vec<PendingWithdrawal>> {
        let rows = self
            .db
            .scan_prefix(cf_names::WITHDRAWALS, &keys::withdrawal_prefix(chain_id))?;
        Ok(decode_rows(rows))
    }

    /// Every record on every chain. Reconciliation repairs all networks,
    /// not just the active one.
    pub fn all(&self) -> Result<Vec<PendingWithdrawal>> {
        let rows = self.db.scan_cf(cf_names::WITHDRAWALS)?;
        Ok(decode_rows(rows))
    }

    pub fn by_status(
        &self,
        chain_id: u64,
        status: WithdrawalStatus,
    ) -> Result<Vec<PendingWithdrawal>> {
        Ok(self
            .for_chain(chain_id)?
            .into_iter()
            .filter(|r| r.status == status)
            .collect())
    }

    /// Load, mutate and persist one record under the queue lock.
    ///
    /// The read happens inside the critical section, so a transition never
    /// clobbers a concurrent one.
    pub async fn transition<F>(
        &self,
        chain_id: u64,
        pending_id: &str,
        mutate: F,
    ) -> Result<PendingWithdrawal>
    where
        F: FnOnce(&mut PendingWithdrawal),
    {
        let _guard = self.lock.acquire().await;
        let mut record = self.get(chain_id, pending_id)?;
        mutate(&mut record);
        self.put(&record)?;
        Ok(record)
    }

    pub fn remove(&self, chain_id: u64, pending_id: &str) -> Result<()> {
        let key = keys::withdrawal_key(chain_id, pending_id);
        self.db.delete_cf(cf_names::WITHDRAWALS, &key)?;
        Ok(())
    }
}

fn decode_rows(rows: Vec<(Vec<u8>, Vec<u8>)>) -> Vec<PendingWithdrawal> {
    let mut out = Vec::with_capacity(rows.len());
    for (key, value) in rows {
        match serde_json::from_slice::<PendingWithdrawal>(&value) {
            Ok(record) => out.push(record),
            Err(e) => warn!("Skipping undecodable withdrawal record {:?}: {}", key, e),
        }
    }
    out
}
