//! RocksDB column families and the database manager.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompactionStyle, Options, ReadOptions,
    WriteBatch, WriteOptions, DB,
};

/// Column family names.
pub mod cf_names {
    /// Deposit notes, keyed by chain id and note id.
    pub const NOTES: &str = "cf_deposit_notes";
    /// Pending withdrawal records, keyed by chain id and pending id.
    pub const WITHDRAWALS: &str = "cf_pending_withdrawals";
    /// Pool events, keyed by chain id, event kind, pair and event index.
    pub const EVENTS: &str = "cf_pool_events";
    /// Sync cursors, one per chain, event kind and pair.
    pub const CURSORS: &str = "cf_sync_cursors";
    /// Engine metadata flags (reconstruction marker and friends).
    pub const META: &str = "cf_engine_meta";
}

/// Database configuration. Sized for a wallet-side store, not a server.
#[derive(Debug, Clone)]
pub struct DBConfig {
    /// Database path
    pub db_path: String,

    /// Write buffer size per column family
    pub write_buffer_size: usize,

    /// Shared block cache size
    pub block_cache_size: usize,

    /// Maximum open files
    pub max_open_files: i32,

    /// Background thread count for compaction
    pub max_background_jobs: i32,
}

impl Default for DBConfig {
    fn default() -> Self {
        Self {
            db_path: "./pool_client_db".to_string(),
            write_buffer_size: 16 * 1024 * 1024,  // 16MB
            block_cache_size: 64 * 1024 * 1024,   // 64MB
            max_open_files: 512,
            max_background_jobs: 2,
        }
    }
}

/// Per-column-family tuning.
#[derive(Debug, Clone)]
pub struct CFConfig {
    pub name: String,
    pub write_buffer_size: usize,
    pub enable_bloom_filter: bool,
    pub optimize_for_point_lookup: bool,
}

impl CFConfig {
    /// cf_deposit_notes: point lookups by note id plus per-chain scans.
    pub fn notes(base: &DBConfig) -> Self {
        Self {
            name: cf_names::NOTES.to_string(),
            write_buffer_size: base.write_buffer_size,
            enable_bloom_filter: true,
            optimize_for_point_lookup: true,
        }
    }

    /// cf_pending_withdrawals: small, point lookups by pending id.
    pub fn withdrawals(base: &DBConfig) -> Self {
        Self {
            name: cf_names::WITHDRAWALS.to_string(),
            write_buffer_size: base.write_buffer_size,
            enable_bloom_filter: true,
            optimize_for_point_lookup: true,
        }
    }

    /// cf_pool_events: ordered range scans per pair, no point lookups.
    pub fn events(base: &DBConfig) -> Self {
        Self {
            name: cf_names::EVENTS.to_string(),
            write_buffer_size: base.write_buffer_size * 2,
            enable_bloom_filter: false,
            optimize_for_point_lookup: false,
        }
    }

    /// cf_sync_cursors: tiny, point lookups.
    pub fn cursors(base: &DBConfig) -> Self {
        Self {
            name: cf_names::CURSORS.to_string(),
            write_buffer_size: base.write_buffer_size / 4,
            enable_bloom_filter: true,
            optimize_for_point_lookup: true,
        }
    }

    /// cf_engine_meta: tiny, point lookups.
    pub fn meta(base: &DBConfig) -> Self {
        Self {
            name: cf_names::META.to_string(),
            write_buffer_size: base.write_buffer_size / 4,
            enable_bloom_filter: true,
            optimize_for_point_lookup: true,
        }
    }

    pub fn all(base: &DBConfig) -> Vec<Self> {
        vec![
            Self::notes(base),
            Self::withdrawals(base),
            Self::events(base),
            Self::cursors(base),
            Self::meta(base),
        ]
    }

    /// Create RocksDB options from the configuration.
    pub fn to_options(&self, shared_cache: &Cache) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(self.write_buffer_size);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_compaction_style(DBCompactionStyle::Level);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_block_cache(shared_cache);

        if self.enable_bloom_filter {
            block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        }

        if self.optimize_for_point_lookup {
            block_opts.set_cache_index_and_filter_blocks(true);
            block_opts.set_pin_l0_filter_and_index_blocks_in_cache(true);
        }

        opts.set_block_based_table_factory(&block_opts);
        opts
    }
}

/// Handle to the client database. Cheap to clone.
#[derive(Clone)]
pub struct DatabaseManager {
    db: Arc<DB>,
    config: DBConfig,
}

impl DatabaseManager {
    /// Open the database with all column families.
    pub fn open(config: DBConfig) -> Result<Self> {
        let db_path = Path::new(&config.db_path);
        let block_cache = Cache::new_lru_cache(config.block_cache_size);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = CFConfig::all(&config)
            .iter()
            .map(|cf_config| {
                let opts = cf_config.to_options(&block_cache);
                ColumnFamilyDescriptor::new(&cf_config.name, opts)
            })
            .collect();

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_max_background_jobs(config.max_background_jobs);

        let db = DB::open_cf_descriptors(&db_opts, db_path, cf_descriptors)
            .with_context(|| format!("Failed to open database at {}", config.db_path))?;

        Ok(Self {
            db: Arc::new(db),
            config,
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| anyhow!("Column family '{}' not found", name))
    }

    pub fn config(&self) -> &DBConfig {
        &self.config
    }

    /// Get value from a column family.
    pub fn get_cf(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf_opt(cf, key, &ReadOptions::default())
            .with_context(|| format!("Failed to get key from {}", cf_name))
    }

    /// Put value to a column family.
    pub fn put_cf(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db
            .put_cf_opt(cf, key, value, &WriteOptions::default())
            .with_context(|| format!("Failed to put key to {}", cf_name))
    }

    /// Delete key from a column family.
    pub fn delete_cf(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db
            .delete_cf_opt(cf, key, &WriteOptions::default())
            .with_context(|| format!("Failed to delete key from {}", cf_name))
    }

    /// All key/value pairs in a column family, in key order.
    pub fn scan_cf(&self, cf_name: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf_opt(cf, ReadOptions::default(), rocksdb::IteratorMode::Start);
        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item.with_context(|| format!("Iteration failed on {}", cf_name))?;
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    /// Key/value pairs under a key prefix, in key order.
    pub fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf(cf_name)?;
        let iter = self.db.iterator_cf_opt(
            cf,
            ReadOptions::default(),
            rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward),
        );
        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item.with_context(|| format!("Iteration failed on {}", cf_name))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    /// Create an atomic write batch.
    pub fn create_write_batch(&self) -> WriteBatch {
        WriteBatch::default()
    }

    /// Stage a put into a batch.
    pub fn batch_put_cf(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key, value);
        Ok(())
    }

    /// Stage a delete into a batch.
    pub fn batch_delete_cf(&self, batch: &mut WriteBatch, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.delete_cf(cf, key);
        Ok(())
    }

    /// Commit a write batch atomically and durably.
    pub fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);

        self.db
            .write_opt(batch, &write_opts)
            .context("Failed to execute write batch")
    }
}
