//! Key layouts for the column families.
//!
//! Every key starts with the big-endian chain id so per-chain records are
//! contiguous under a prefix scan. Event keys embed the pair string followed
//! by a NUL separator; without it the prefix for `eth-0.1` would also match
//! `eth-0.10`. Event indexes are big-endian so key order is index order.

/// Separator between a variable-length pair segment and what follows.
pub const PAIR_SEPARATOR: u8 = 0x00;

fn concat(parts: &[&[u8]]) -> Vec<u8> {
    let total: usize = parts.iter().map(|p| p.len()).sum();
    let mut key = Vec::with_capacity(total);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

/// cf_deposit_notes key: chain id, note id.
pub fn note_key(chain_id: u64, note_id: &str) -> Vec<u8> {
    concat(&[&chain_id.to_be_bytes(), note_id.as_bytes()])
}

/// Prefix covering every note on a chain.
pub fn note_prefix(chain_id: u64) -> Vec<u8> {
    chain_id.to_be_bytes().to_vec()
}

/// cf_pending_withdrawals key: chain id, pending id.
pub fn withdrawal_key(chain_id: u64, pending_id: &str) -> Vec<u8> {
    concat(&[&chain_id.to_be_bytes(), pending_id.as_bytes()])
}

/// Prefix covering every pending withdrawal on a chain.
pub fn withdrawal_prefix(chain_id: u64) -> Vec<u8> {
    chain_id.to_be_bytes().to_vec()
}

/// cf_pool_events key: chain id, event kind tag, pair, separator, index.
pub fn event_key(chain_id: u64, kind_tag: u8, pair_key: &str, event_index: u64) -> Vec<u8> {
    concat(&[
        &chain_id.to_be_bytes(),
        &[kind_tag],
        pair_key.as_bytes(),
        &[PAIR_SEPARATOR],
        &event_index.to_be_bytes(),
    ])
}

/// Prefix covering every event of one kind for one pair.
pub fn event_prefix(chain_id: u64, kind_tag: u8, pair_key: &str) -> Vec<u8> {
    concat(&[
        &chain_id.to_be_bytes(),
        &[kind_tag],
        pair_key.as_bytes(),
        &[PAIR_SEPARATOR],
    ])
}

/// Event index from an event key, if the key is well formed.
pub fn event_index_from_key(key: &[u8]) -> Option<u64> {
    if key.len() < 8 {
        return None;
    }
    let tail: [u8; 8] = key[key.len() - 8..].try_into().ok()?;
    Some(u64::from_be_bytes(tail))
}

/// cf_sync_cursors key: chain id, event kind tag, pair.
pub fn cursor_key(chain_id: u64, kind_tag: u8, pair_key: &str) -> Vec<u8> {
    concat(&[&chain_id.to_be_bytes(), &[kind_tag], pair_key.as_bytes()])
}

/// cf_engine_meta key for the note reconstruction marker.
pub fn reconstruction_key(chain_id: u64) -> Vec<u8> {
    concat(&[b"reconstruction/", &chain_id.to_be_bytes()])
}
