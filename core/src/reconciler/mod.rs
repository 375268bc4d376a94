//! Tracker Reconciler
//!
//! Keeps the tracker's view of reserves and outstanding notes consistent with
//! the settlement layer.
//!
//! ```text
//!   ChainSource ──fetch(h)──▶ Reconciler ──WriteSet──▶ KeyValueStore
//!                              │  spent ▸ archive
//!                              │  created ▸ classify ▸ index
//!                              │  liabilities ▸ recompute
//!                              ▼
//!                        ArcSwap<IndexSnapshot> ──▶ readers
//! ```
//!
//! Heights are applied strictly in order. The watermark and every derived
//! change for a height are written in one batch, so a crash or failed fetch
//! leaves the reconciler at the last complete height.

pub mod engine;
pub mod index;
pub mod records;
pub mod service;
pub mod source;

pub use engine::{BlockOutcome, BlockSummary, ReconcileError, Reconciler};
pub use index::{IndexSnapshot, ReserveReport, SolvencyReport};
pub use records::{
    ArchivedNote, ChainRecord, HistoryEntry, NoteRecord, RecordFilter, ReserveRecord, SettledBlock,
    TokenAmount,
};
pub use service::{ReconcilerCommand, ReconcilerService, ServiceConfig};
pub use source::{ChainSource, JsonDirSource};
