//! Persistent deposit note store, segmented per chain and pair.

use log::debug;

use crate::config::Pair;
use crate::error::{ClientError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::notes::note::{DepositNote, NoteStatus};
use crate::store::{cf_names, keys, DatabaseManager};

/// Store of deposit notes. Mutations are merge-only: re-adding a note never
/// un-spends it, and marking a spent note spent again is a no-op.
#[derive(Clone)]
pub struct NoteVault {
    db: DatabaseManager,
    bus: EventBus,
}

impl NoteVault {
    pub fn new(db: DatabaseManager, bus: EventBus) -> Self {
        Self { db, bus }
    }

    /// All notes stored for a chain, unordered.
    pub fn get_deposits(&self, chain_id: u64) -> Result<Vec<DepositNote>> {
        let prefix = keys::note_prefix(chain_id);
        let rows = self.db.scan_prefix(cf_names::NOTES, &prefix)?;
        let mut notes = Vec::with_capacity(rows.len());
        for (_key, value) in rows {
            notes.push(serde_json::from_slice(&value)?);
        }
        Ok(notes)
    }

    /// Notes for one pair on a chain.
    pub fn get_pair_deposits(&self, chain_id: u64, pair: &Pair) -> Result<Vec<DepositNote>> {
        let mut notes = self.get_deposits(chain_id)?;
        notes.retain(|n| &n.pair == pair);
        Ok(notes)
    }

    /// Unspent confirmed notes for one pair, the ones a withdrawal can use.
    pub fn get_spendable(&self, chain_id: u64, pair: &Pair) -> Result<Vec<DepositNote>> {
        let mut notes = self.get_pair_deposits(chain_id, pair)?;
        notes.retain(|n| n.is_spendable());
        Ok(notes)
    }

    /// Notes still awaiting deposit confirmation on a chain.
    pub fn get_pending(&self, chain_id: u64) -> Result<Vec<DepositNote>> {
        let mut notes = self.get_deposits(chain_id)?;
        notes.retain(|n| n.status == NoteStatus::Pending);
        Ok(notes)
    }

    pub fn get_note(&self, chain_id: u64, note_id: &str) -> Result<Option<DepositNote>> {
        let key = keys::note_key(chain_id, note_id);
        match self.db.get_cf(cf_names::NOTES, &key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Insert or merge notes by id. For an existing note the incoming fields
    /// win, except that a recorded spend survives the merge.
    pub fn add_deposits(&self, chain_id: u64, notes: Vec<DepositNote>) -> Result<()> {
        if notes.is_empty() {
            return Ok(());
        }

        let mut batch = self.db.create_write_batch();
        for mut note in notes {
            let key = keys::note_key(chain_id, &note.id);
            if let Some(existing) = self.get_note(chain_id, &note.id)? {
                note.spent = note.spent || existing.spent;
            }
            let value = serde_json::to_vec(&note)?;
            self.db.batch_put_cf(&mut batch, cf_names::NOTES, &key, &value)?;
        }
        self.db.write_batch(batch)?;

        self.bus.emit(EngineEvent::DepositsChanged { chain_id });
        Ok(())
    }

    /// Mark notes spent. Already-spent notes are skipped; an unknown id is
    /// a hard error since it means the caller and the store disagree.
    pub fn set_spent(&self, chain_id: u64, note_ids: &[String]) -> Result<()> {
        let mut batch = self.db.create_write_batch();
        let mut changed = 0usize;

        for note_id in note_ids {
            let mut note = self
                .get_note(chain_id, note_id)?
                .ok_or_else(|| ClientError::NotFound {
                    entity: "deposit note",
                    id: note_id.clone(),
                })?;
            if note.spent {
                debug!("note {} already spent, skipping", note_id);
                continue;
            }
            note.spent = true;
            let key = keys::note_key(chain_id, note_id);
            let value = serde_json::to_vec(&note)?;
            self.db.batch_put_cf(&mut batch, cf_names::NOTES, &key, &value)?;
            changed += 1;
        }

        if changed > 0 {
            self.db.write_batch(batch)?;
            self.bus.emit(EngineEvent::DepositsChanged { chain_id });
        }
        Ok(())
    }

    /// Update the lifecycle status of one note.
    pub fn update_deposit_status(
        &self,
        chain_id: u64,
        note_id: &str,
        status: NoteStatus,
    ) -> Result<()> {
        let mut note = self
            .get_note(chain_id, note_id)?
            .ok_or_else(|| ClientError::NotFound {
                entity: "deposit note",
                id: note_id.to_string(),
            })?;

        note.status = status;
        let key = keys::note_key(chain_id, note_id);
        let value = serde_json::to_vec(&note)?;
        self.db.put_cf(cf_names::NOTES, &key, &value)?;

        self.bus.emit(EngineEvent::DepositsChanged { chain_id });
        Ok(())
    }
}
