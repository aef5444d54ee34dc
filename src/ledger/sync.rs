//! Incremental event sync.
//!
//! Sync walks block windows sized by the chain profile and commits each
//! window's events together with the moved cursor in one write batch. The
//! cursor never points past a block whose fetch did not complete, so a
//! transport failure anywhere leaves a state a later sync simply resumes
//! from. Re-querying the cursor block is expected; overlap is removed by
//! comparing block and log positions against the cursor.

use std::sync::Arc;

use log::{debug, info};
use web3::types::{BlockNumber, FilterBuilder};

use crate::chain::ChainRpc;
use crate::config::{chain_profile, Pair, PoolInstance};
use crate::error::{ClientError, Result};
use crate::ledger::event::{decode_log, DecodedLog, EventKind, PoolEvent, SyncCursor};
use crate::store::{cf_names, keys, DatabaseManager};

/// Result of one sync call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Events appended by this call.
    pub appended: usize,
    /// Cursor after the call, if any events were ever recorded.
    pub cursor: Option<SyncCursor>,
}

/// Local, gapless cache of one pool's on-chain events.
#[derive(Clone)]
pub struct EventLedger {
    db: DatabaseManager,
    chain: Arc<dyn ChainRpc>,
}

impl EventLedger {
    pub fn new(db: DatabaseManager, chain: Arc<dyn ChainRpc>) -> Self {
        Self { db, chain }
    }

    /// Bring the local event cache for one pool and event kind up to the
    /// chain head. With `force_full` the cached events are dropped first
    /// and the scan restarts from the pool's deployment block.
    pub async fn sync(
        &self,
        kind: EventKind,
        pool: &PoolInstance,
        force_full: bool,
    ) -> Result<SyncOutcome> {
        let profile = chain_profile(pool.chain_id);
        let pair_key = pool.pair().key();
        let address = pool.contract_address()?;

        if force_full {
            self.truncate(kind, pool.chain_id, &pair_key)?;
        }

        let mut cursor = self.load_cursor(pool.chain_id, kind, &pair_key)?;
        let head = self.chain.block_number().await?;
        let window = profile
            .max_block_batch_size
            .saturating_mul(profile.batch_multiplier)
            .max(1);

        let mut from = match cursor {
            Some(c) => c.last_queried_block,
            None => pool.deployed_block.max(profile.initial_block),
        };
        let mut appended = 0usize;

        while from <= head {
            let to = from.saturating_add(window - 1).min(head);
            let filter = FilterBuilder::default()
                .address(vec![address])
                .topics(Some(vec![kind.topic0()]), None, None, None)
                .from_block(BlockNumber::Number(from.into()))
                .to_block(BlockNumber::Number(to.into()))
                .build();

            // a transport error here aborts the whole call; committed
            // windows stay and the next sync resumes from the cursor
            let logs = self.chain.get_logs(filter).await?;
            appended += self.commit_window(kind, pool.chain_id, &pair_key, &mut cursor, logs)?;

            if to == u64::MAX {
                break;
            }
            from = to + 1;
        }

        if appended > 0 {
            info!(
                "synced {} {:?} events for {} on chain {}",
                appended, kind, pair_key, pool.chain_id
            );
        }
        Ok(SyncOutcome { appended, cursor })
    }

    /// Decode, dedupe and append one window of logs atomically with the
    /// cursor move. Nothing is written when the window holds no new events.
    fn commit_window(
        &self,
        kind: EventKind,
        chain_id: u64,
        pair_key: &str,
        cursor: &mut Option<SyncCursor>,
        logs: Vec<web3::types::Log>,
    ) -> Result<usize> {
        let mut decoded: Vec<DecodedLog> =
            logs.iter().filter_map(|log| decode_log(kind, log)).collect();
        decoded.sort_by_key(|d| (d.block_number, d.log_index));

        let mut batch = self.db.create_write_batch();
        let mut next_cursor = *cursor;
        let mut appended = 0usize;

        for entry in decoded {
            if let Some(c) = next_cursor {
                let seen = entry.block_number < c.last_queried_block
                    || (entry.block_number == c.last_queried_block
                        && entry.log_index <= c.last_log_index);
                if seen {
                    continue;
                }
            }

            let expected = next_cursor.map(|c| c.last_event_index + 1).unwrap_or(0);
            let event_index = match entry.leaf_index {
                Some(leaf) if leaf < expected => {
                    debug!("dropping already-recorded deposit leaf {}", leaf);
                    continue;
                }
                Some(leaf) if leaf > expected => {
                    return Err(ClientError::EventIndexGap {
                        pair: pair_key.to_string(),
                        expected,
                        got: leaf,
                    });
                }
                Some(leaf) => leaf,
                // withdrawals carry no on-chain index
                None => expected,
            };

            let event = PoolEvent {
                event_index,
                block_number: entry.block_number,
                transaction_hash: entry.transaction_hash.clone(),
                payload: entry.payload.clone(),
            };
            let key = keys::event_key(chain_id, kind.tag(), pair_key, event_index);
            let value = serde_json::to_vec(&event)?;
            self.db.batch_put_cf(&mut batch, cf_names::EVENTS, &key, &value)?;

            next_cursor = Some(SyncCursor {
                last_queried_block: entry.block_number,
                last_log_index: entry.log_index,
                last_event_index: event_index,
            });
            appended += 1;
        }

        if appended > 0 {
            let cursor_value = serde_json::to_vec(&next_cursor)?;
            let cursor_key = keys::cursor_key(chain_id, kind.tag(), pair_key);
            self.db
                .batch_put_cf(&mut batch, cf_names::CURSORS, &cursor_key, &cursor_value)?;
            self.db.write_batch(batch)?;
            *cursor = next_cursor;
        }
        Ok(appended)
    }

    /// Drop all cached events and the cursor for one stream, atomically.
    fn truncate(&self, kind: EventKind, chain_id: u64, pair_key: &str) -> Result<()> {
        let prefix = keys::event_prefix(chain_id, kind.tag(), pair_key);
        let rows = self.db.scan_prefix(cf_names::EVENTS, &prefix)?;

        let mut batch = self.db.create_write_batch();
        for (key, _value) in &rows {
            self.db.batch_delete_cf(&mut batch, cf_names::EVENTS, key)?;
        }
        let cursor_key = keys::cursor_key(chain_id, kind.tag(), pair_key);
        self.db
            .batch_delete_cf(&mut batch, cf_names::CURSORS, &cursor_key)?;
        self.db.write_batch(batch)?;

        debug!(
            "truncated {} cached {:?} events for {} on chain {}",
            rows.len(),
            kind,
            pair_key,
            chain_id
        );
        Ok(())
    }

    fn load_cursor(
        &self,
        chain_id: u64,
        kind: EventKind,
        pair_key: &str,
    ) -> Result<Option<SyncCursor>> {
        let key = keys::cursor_key(chain_id, kind.tag(), pair_key);
        match self.db.get_cf(cf_names::CURSORS, &key)? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Ok(None),
        }
    }

    /// All cached events for one stream, in index order.
    pub fn get_events(&self, chain_id: u64, pair: &Pair, kind: EventKind) -> Result<Vec<PoolEvent>> {
        let prefix = keys::event_prefix(chain_id, kind.tag(), &pair.key());
        let rows = self.db.scan_prefix(cf_names::EVENTS, &prefix)?;
        let mut events = Vec::with_capacity(rows.len());
        for (_key, value) in rows {
            events.push(serde_json::from_slice(&value)?);
        }
        Ok(events)
    }

    /// Highest cached event index for a stream, `None` when empty.
    pub fn get_last_event_index(
        &self,
        chain_id: u64,
        pair: &Pair,
        kind: EventKind,
    ) -> Result<Option<u64>> {
        Ok(self
            .load_cursor(chain_id, kind, &pair.key())?
            .map(|c| c.last_event_index))
    }

    /// Tree index the next deposit on this pair would take.
    pub fn next_deposit_index(&self, chain_id: u64, pair: &Pair) -> Result<u64> {
        Ok(self
            .get_last_event_index(chain_id, pair, EventKind::Deposit)?
            .map(|last| last + 1)
            .unwrap_or(0))
    }

    /// Deposits recorded after the given tree index. This is the signal a
    /// withdrawal UI surfaces as the note's anonymity headroom.
    pub fn get_subsequent_deposits_count(
        &self,
        chain_id: u64,
        pair: &Pair,
        deposit_index: u64,
    ) -> Result<u64> {
        Ok(self
            .get_last_event_index(chain_id, pair, EventKind::Deposit)?
            .map(|last| last.saturating_sub(deposit_index))
            .unwrap_or(0))
    }
}
