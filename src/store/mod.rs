//! Local persistence for the pool client.
//!
//! RocksDB with one column family per record type. All multi-key state
//! transitions go through an atomic `WriteBatch` so a crash can never leave
//! a cursor pointing past events that were not written, or a withdrawal
//! record half-updated.

pub mod keys;
pub mod schema;

pub use schema::{cf_names, CFConfig, DBConfig, DatabaseManager};
