//! Ledger collaborators
//!
//! The consolidation engine never talks to the chain directly. It goes through
//! these traits:
//!
//! ```text
//! BalanceSource ──┐
//! WalletValidator ┼──> ConsolidationEngine ──> TransactionBuilder ──> Signer
//!                 │                                                    │
//!                 └────────────────────── Notifier <───── hand-off ────┘
//! ```
//!
//! Adapters:
//! - [`ocean::OceanClient`] - balances and confirmations from the Ocean REST API
//! - [`wallet_api::WalletApiClient`] - transaction building and signing service
//! - [`validator::AddressValidator`] - address format and reachability checks

pub mod ocean;
#[cfg(test)]
pub(crate) mod stub_server;
pub mod validator;
pub mod wallet_api;

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::consolidation::chain::{
    ConversionDirection, InputRef, TransactionChain, TxId, UnsignedTx,
};
use crate::error::Result;
use crate::notify::{self, Notifier};

pub use ocean::OceanClient;
pub use validator::AddressValidator;
pub use wallet_api::WalletApiClient;

/// Balance record of one token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub symbol: String,
    pub amount: Decimal,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl TokenBalance {
    pub fn new(symbol: impl Into<String>, amount: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            amount,
            id: None,
            name: None,
        }
    }
}

/// Token balances keyed by symbol
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenBalanceMap(HashMap<String, TokenBalance>);

impl TokenBalanceMap {
    /// Insert a balance, replacing any previous entry with the same symbol
    pub fn insert(&mut self, balance: TokenBalance) {
        self.0.insert(balance.symbol.clone(), balance);
    }

    pub fn get(&self, symbol: &str) -> Option<&TokenBalance> {
        self.0.get(symbol)
    }

    /// Amount held for `symbol`, zero when absent
    pub fn amount_of(&self, symbol: &str) -> Decimal {
        self.get(symbol).map(|b| b.amount).unwrap_or(Decimal::ZERO)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<TokenBalance> for TokenBalanceMap {
    fn from_iter<I: IntoIterator<Item = TokenBalance>>(iter: I) -> Self {
        let mut map = TokenBalanceMap::default();
        for balance in iter {
            map.insert(balance);
        }
        map
    }
}

/// Balances read for one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSnapshot {
    /// Loose reserve (UTXO) balance
    pub reserve: Decimal,
    pub tokens: TokenBalanceMap,
}

/// Source of the wallet's current balances
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Spendable reserve (UTXO) balance of `address`
    async fn reserve_balance(&self, address: &str) -> Result<Decimal>;

    /// Token balances of `address`
    async fn token_balances(&self, address: &str) -> Result<TokenBalanceMap>;
}

/// Sanity check of wallet settings and network
#[async_trait]
pub trait WalletValidator: Send + Sync {
    /// Returns false when the wallet must not be operated on
    async fn validate(&self, strict: bool) -> bool;
}

/// Builds unsigned transactions
#[async_trait]
pub trait TransactionBuilder: Send + Sync {
    /// Move `amount` between the reserve and the account balance
    async fn build_conversion(
        &self,
        amount: Decimal,
        direction: ConversionDirection,
    ) -> Result<UnsignedTx>;

    /// Send `amount` of reserve to `destination`, optionally spending `input`
    async fn build_transfer(
        &self,
        amount: Decimal,
        destination: &str,
        input: Option<&InputRef>,
    ) -> Result<UnsignedTx>;

    /// Spendable output of a transaction that was just built
    fn derive_input_ref(&self, tx: &UnsignedTx) -> Result<InputRef>;
}

/// Signs and submits chains, or hands them off
#[async_trait]
pub trait Signer: Send + Sync {
    /// Whether this process can sign for the wallet
    fn has_local_signing_authority(&self) -> bool;

    /// Sign and submit every transaction of the chain, in order
    async fn sign_and_submit(&self, chain: &TransactionChain) -> Result<()>;

    /// Wait until `txid` is confirmed; false on rejection or timeout
    async fn wait_for_confirmation(&self, txid: &TxId) -> Result<bool>;

    /// Forward an unsigned chain to the operator for external signing
    async fn hand_off(&self, chain: &TransactionChain, notifier: &dyn Notifier) -> Result<()> {
        notify::hand_off_for_external_signing(chain, notifier).await;
        Ok(())
    }
}
