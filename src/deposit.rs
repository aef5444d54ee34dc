//! Deposit note creation and settlement tracking.
//!
//! Creating a note assigns it the next free tree index and derives its
//! secret material from the wallet seed. Settlement is not event-driven:
//! each new-block tick cross-references the pending notes against the host
//! wallet's own transaction records, because the wallet, not this engine,
//! sends the deposit transaction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};
use parking_lot::Mutex as StateMutex;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::{chain_profile, pool_instance, Pair};
use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::ledger::EventLedger;
use crate::notes::{derive_note_id, DepositNote, NoteStatus, NoteVault};
use crate::wallet::{NoteSecrets, TransactionRecords, TransactionVerdict};

/// Serializes note derivation with tree-index assignment.
///
/// Derivation is deterministic in the index; two racing creations reading
/// the same index would derive identical commitments. Deliberately separate
/// from [`crate::withdraw::WithdrawalQueueLock`]: a relayed withdrawal in
/// flight must not block new deposits.
#[derive(Default)]
pub struct DepositGenerationLock(Mutex<()>);

impl DepositGenerationLock {
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }
}

/// Block-height watchdog state for one chain.
#[derive(Debug, Clone, Copy, Default)]
struct StuckState {
    last_block: u64,
    repeats: u32,
    flagged: bool,
}

pub struct DepositCoordinator {
    vault: NoteVault,
    ledger: Arc<EventLedger>,
    secrets: Arc<dyn NoteSecrets>,
    records: Arc<dyn TransactionRecords>,
    bus: EventBus,
    lock: DepositGenerationLock,
    watchdog: StateMutex<HashMap<u64, StuckState>>,
}

impl DepositCoordinator {
    pub fn new(
        vault: NoteVault,
        ledger: Arc<EventLedger>,
        secrets: Arc<dyn NoteSecrets>,
        records: Arc<dyn TransactionRecords>,
        bus: EventBus,
    ) -> Self {
        Self {
            vault,
            ledger,
            secrets,
            records,
            bus,
            lock: DepositGenerationLock::default(),
            watchdog: StateMutex::new(HashMap::new()),
        }
    }

    /// Derive and store a new pending note for the pair.
    ///
    /// The whole sequence runs under the generation lock so the index read
    /// and the note write are atomic with respect to other creations.
    pub async fn create_deposit(&self, chain_id: u64, pair: &Pair) -> Result<DepositNote> {
        pool_instance(chain_id, pair)?;
        let _guard = self.lock.acquire().await;

        let index = self.next_free_index(chain_id, pair)?;
        let derived = self.secrets.derive_note(chain_id, pair, index).await?;

        let note = DepositNote {
            id: derive_note_id(chain_id, pair, &derived.commitment_hex),
            nullifier_hex: derived.nullifier_hex,
            commitment_hex: derived.commitment_hex,
            pair: pair.clone(),
            deposit_index: index,
            deposit_address: derived.deposit_address,
            timestamp: now_secs(),
            spent: false,
            status: NoteStatus::Pending,
            chain_id,
        };
        self.vault.add_deposits(chain_id, vec![note.clone()])?;
        info!("created deposit note at tree index {} for {}", index, pair);
        Ok(note)
    }

    /// The synced tree head, advanced past any local notes the chain has
    /// not seen yet.
    fn next_free_index(&self, chain_id: u64, pair: &Pair) -> Result<u64> {
        let chain_next = self.ledger.next_deposit_index(chain_id, pair)?;
        let local_next = self
            .vault
            .get_pair_deposits(chain_id, pair)?
            .iter()
            .map(|note| note.deposit_index + 1)
            .max()
            .unwrap_or(0);
        Ok(chain_next.max(local_next))
    }

    /// New-block tick: run the provider watchdog, then settle pending notes
    /// against the wallet's transaction records.
    ///
    /// A note whose transaction the wallet has no record of is failed
    /// unconditionally; without a record it can never confirm.
    pub fn on_new_block(&self, chain_id: u64, block: u64) -> Result<()> {
        self.watch_provider(chain_id, block);

        for note in self.vault.get_pending(chain_id)? {
            match self.records.deposit_verdict(chain_id, &note.id) {
                Some(TransactionVerdict::Pending) => continue,
                Some(TransactionVerdict::Confirmed) => {
                    info!("deposit note {} confirmed", note.id);
                    self.vault
                        .update_deposit_status(chain_id, &note.id, NoteStatus::Confirmed)?;
                }
                Some(TransactionVerdict::Failed) => {
                    warn!("deposit note {} failed on chain", note.id);
                    self.vault
                        .update_deposit_status(chain_id, &note.id, NoteStatus::Failed)?;
                }
                None => {
                    warn!("deposit note {} has no transaction record, failing it", note.id);
                    self.vault
                        .update_deposit_status(chain_id, &note.id, NoteStatus::Failed)?;
                }
            }
        }
        Ok(())
    }

    /// Whether the chain's block source is currently considered stuck.
    pub fn provider_stuck(&self, chain_id: u64) -> bool {
        self.watchdog
            .lock()
            .get(&chain_id)
            .map(|s| s.flagged)
            .unwrap_or(false)
    }

    fn watch_provider(&self, chain_id: u64, block: u64) {
        let tolerance = chain_profile(chain_id).stuck_block_tolerance;
        let mut watchdog = self.watchdog.lock();
        let state = watchdog.entry(chain_id).or_default();

        if block == state.last_block {
            state.repeats += 1;
            if state.repeats >= tolerance && !state.flagged {
                state.flagged = true;
                warn!(
                    "chain {} stuck at block {} for {} ticks",
                    chain_id, block, state.repeats
                );
                self.bus.emit(EngineEvent::ProviderStuck { chain_id, block });
            }
        } else {
            state.last_block = block;
            state.repeats = 0;
            state.flagged = false;
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
