//! DeFiChain Fund Consolidator Library
//!
//! Periodically sweeps a custodial wallet's loose reserve and native token
//! balance to a fixed destination once it crosses a threshold.

pub mod cli;
pub mod config;
pub mod consolidation;
pub mod error;
pub mod ledger;
pub mod notify;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
