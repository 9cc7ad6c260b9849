//! Transaction chain assembly
//!
//! A consolidation emits either a single transfer, or a conversion followed by
//! a transfer that spends the conversion's unconfirmed output.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use super::plan::ConsolidationPlan;
use crate::error::Result;
use crate::ledger::TransactionBuilder;

/// Transaction id (hex)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction of a conversion between the two balance representations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionDirection {
    /// Loose reserve (UTXO) into the account token balance
    ReserveToAccount,

    /// Account token balance into loose reserve (UTXO)
    #[default]
    AccountToReserve,
}

impl fmt::Display for ConversionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionDirection::ReserveToAccount => write!(f, "utxo-to-account"),
            ConversionDirection::AccountToReserve => write!(f, "account-to-utxo"),
        }
    }
}

/// Kind of transaction the builder produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Conversion(ConversionDirection),
    Transfer,
}

/// One output of a built transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    pub vout: u32,
    pub address: String,
    pub value: Decimal,
}

/// Unsigned transaction as returned by the builder
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTx {
    /// Id used for confirmation polling
    pub id: TxId,

    pub kind: TxKind,

    /// Amount moved by this transaction
    pub amount: Decimal,

    /// Serialized transaction (hex)
    pub hex: String,

    pub outputs: Vec<TxOutput>,
}

impl UnsignedTx {
    /// First output paying `address`
    pub fn output_to(&self, address: &str) -> Option<&TxOutput> {
        self.outputs.iter().find(|o| o.address == address)
    }
}

/// Spendable output of a not-yet-confirmed transaction
#[derive(Debug, Clone, PartialEq)]
pub struct InputRef {
    pub txid: TxId,
    pub vout: u32,
    pub value: Decimal,
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// Ordered, dependent transactions of one consolidation
///
/// The conversion, when present, always comes first and the transfer last.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionChain {
    Transfer {
        transfer: UnsignedTx,
    },
    ConversionThenTransfer {
        conversion: UnsignedTx,
        /// Conversion output spent by the transfer, when chaining is on
        input_ref: Option<InputRef>,
        transfer: UnsignedTx,
    },
}

impl TransactionChain {
    /// Build the chain for a plan that already passed the threshold
    pub async fn assemble(
        builder: &dyn TransactionBuilder,
        plan: &ConsolidationPlan,
        destination: &str,
        direction: ConversionDirection,
        chain_prevouts: bool,
    ) -> Result<Self> {
        if !plan.needs_conversion() {
            let transfer = builder
                .build_transfer(plan.consolidated_amount, destination, None)
                .await?;
            debug!("Built transfer {} ({})", transfer.id, transfer.amount);
            return Ok(TransactionChain::Transfer { transfer });
        }

        let conversion = builder
            .build_conversion(plan.token_contribution, direction)
            .await?;
        debug!(
            "Built {} conversion {} ({})",
            direction, conversion.id, conversion.amount
        );

        let input_ref = if chain_prevouts {
            let input = builder.derive_input_ref(&conversion)?;
            debug!("Chaining transfer to unconfirmed output {}", input);
            Some(input)
        } else {
            None
        };

        let transfer = builder
            .build_transfer(plan.consolidated_amount, destination, input_ref.as_ref())
            .await?;

        info!(
            "Built chain: conversion {} -> transfer {}",
            conversion.id, transfer.id
        );

        Ok(TransactionChain::ConversionThenTransfer {
            conversion,
            input_ref,
            transfer,
        })
    }

    /// Transactions in submission order
    pub fn transactions(&self) -> Vec<&UnsignedTx> {
        match self {
            TransactionChain::Transfer { transfer } => vec![transfer],
            TransactionChain::ConversionThenTransfer {
                conversion,
                transfer,
                ..
            } => vec![conversion, transfer],
        }
    }

    /// Number of transactions in the chain
    pub fn tx_count(&self) -> usize {
        match self {
            TransactionChain::Transfer { .. } => 1,
            TransactionChain::ConversionThenTransfer { .. } => 2,
        }
    }

    pub fn transfer(&self) -> &UnsignedTx {
        match self {
            TransactionChain::Transfer { transfer }
            | TransactionChain::ConversionThenTransfer { transfer, .. } => transfer,
        }
    }

    pub fn conversion(&self) -> Option<&UnsignedTx> {
        match self {
            TransactionChain::Transfer { .. } => None,
            TransactionChain::ConversionThenTransfer { conversion, .. } => Some(conversion),
        }
    }

    pub fn input_ref(&self) -> Option<&InputRef> {
        match self {
            TransactionChain::Transfer { .. } => None,
            TransactionChain::ConversionThenTransfer { input_ref, .. } => input_ref.as_ref(),
        }
    }
}
