//! Boot, unlock and network-change reconciliation.
//!
//! Withdrawal state lives in the database, but the tasks driving it do not
//! survive a restart. Reconciliation walks the persisted records and either
//! finishes what can be finished or fails what provably cannot: a record
//! still `UNSUBMITTED` was interrupted before the relayer accepted it and
//! can only be failed, while a `PENDING` record names a job the relayer
//! still knows, so its poller is re-armed. A note reconstruction marker
//! found at startup means the rescan died midway; the marker is cleared and
//! the host told to start over.

use std::sync::Arc;

use log::{info, warn};

use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::store::{cf_names, keys, DatabaseManager};
use crate::withdraw::{PendingWithdrawal, WithdrawalCoordinator, WithdrawalQueue, WithdrawalStatus};

const INTERRUPTED_MESSAGE: &str = "interrupted before relayer submission";

pub struct ReconciliationScheduler {
    db: DatabaseManager,
    queue: Arc<WithdrawalQueue>,
    withdrawals: Arc<WithdrawalCoordinator>,
    bus: EventBus,
}

impl ReconciliationScheduler {
    pub fn new(
        db: DatabaseManager,
        queue: Arc<WithdrawalQueue>,
        withdrawals: Arc<WithdrawalCoordinator>,
        bus: EventBus,
    ) -> Self {
        Self {
            db,
            queue,
            withdrawals,
            bus,
        }
    }

    /// Full repair pass over every chain. Run once the engine is up.
    pub async fn on_startup(&self) -> Result<()> {
        let records = self.queue.all()?;
        self.repair_records(records).await?;
        self.repair_reconstructions()?;
        Ok(())
    }

    /// Unlock repeats the boot repair: the vault may have been locked when
    /// a poller wanted to finish, and markers may have appeared since.
    pub async fn on_unlock(&self) -> Result<()> {
        self.on_startup().await
    }

    /// Re-check the records of the newly active chain.
    pub async fn on_network_changed(&self, chain_id: u64) -> Result<()> {
        let records = self.queue.for_chain(chain_id)?;
        self.repair_records(records).await
    }

    async fn repair_records(&self, records: Vec<PendingWithdrawal>) -> Result<()> {
        for record in records {
            match record.status {
                WithdrawalStatus::Unsubmitted => self.fail_interrupted(&record).await?,
                WithdrawalStatus::Pending => match record.job_id {
                    Some(_) => self.withdrawals.resume_polling(&record),
                    // accepted state was never persisted; the job id is lost
                    None => self.fail_interrupted(&record).await?,
                },
                _ => {}
            }
        }
        Ok(())
    }

    async fn fail_interrupted(&self, record: &PendingWithdrawal) -> Result<()> {
        warn!("failing interrupted withdrawal {}", record.pending_id);
        let updated = self
            .queue
            .transition(record.chain_id, &record.pending_id, |r| {
                r.status = WithdrawalStatus::Failed;
                r.err_message = Some(INTERRUPTED_MESSAGE.to_string());
            })
            .await?;
        self.bus.emit(EngineEvent::WithdrawalStateChange {
            chain_id: record.chain_id,
            pending_id: record.pending_id.clone(),
            status: updated.status,
        });
        Ok(())
    }

    /// Record that a note reconstruction rescan is running on `chain_id`.
    /// The marker outlives a crash and is what startup repair looks for.
    pub fn begin_note_reconstruction(&self, chain_id: u64) -> Result<()> {
        self.db
            .put_cf(cf_names::META, &keys::reconstruction_key(chain_id), b"1")?;
        Ok(())
    }

    /// Clear the marker after a completed rescan.
    pub fn finish_note_reconstruction(&self, chain_id: u64) -> Result<()> {
        self.db
            .delete_cf(cf_names::META, &keys::reconstruction_key(chain_id))?;
        Ok(())
    }

    pub fn reconstruction_in_progress(&self, chain_id: u64) -> Result<bool> {
        Ok(self
            .db
            .get_cf(cf_names::META, &keys::reconstruction_key(chain_id))?
            .is_some())
    }

    fn repair_reconstructions(&self) -> Result<()> {
        let markers = self.db.scan_prefix(cf_names::META, b"reconstruction/")?;
        for (key, _) in markers {
            if key.len() < 8 {
                continue;
            }
            let tail: [u8; 8] = match key[key.len() - 8..].try_into() {
                Ok(tail) => tail,
                Err(_) => continue,
            };
            let chain_id = u64::from_be_bytes(tail);

            warn!("note reconstruction on chain {} was interrupted", chain_id);
            self.db.delete_cf(cf_names::META, &key)?;
            self.bus.emit(EngineEvent::ReconstructionInterrupted { chain_id });
            info!("cleared stale reconstruction marker for chain {}", chain_id);
        }
        Ok(())
    }
}
