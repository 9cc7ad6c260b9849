//! Fund consolidation
//!
//! Moves value that accumulates in the wallet to a fixed destination once it
//! crosses the configured threshold.
//!
//! # Architecture
//!
//! ```text
//! CycleScheduler → ConsolidationEngine → ConsolidationPlan
//!                          ↓
//!                  TransactionChain → Signer (submit | hand off)
//! ```

pub mod chain;
pub mod engine;
pub mod plan;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use chain::{ConversionDirection, InputRef, TransactionChain, TxId, TxKind, UnsignedTx};
pub use engine::{Collaborators, ConsolidationEngine, ConsolidationSettings, CycleOutcome};
pub use plan::{ConsolidationPlan, LOW_RESERVE_FLOOR, RESERVE_MARGIN};
pub use scheduler::{CycleScheduler, SchedulerStats};
