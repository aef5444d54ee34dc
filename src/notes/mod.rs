//! Deposit notes and their persistent store.

pub mod note;
pub mod vault;

pub use note::{derive_note_id, DepositNote, NoteStatus};
pub use vault::NoteVault;
