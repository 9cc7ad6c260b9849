//! Wallet validation
//!
//! Checks that the configured addresses belong to the configured network
//! and, in strict mode, that the ledger API answers for the wallet.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use super::{BalanceSource, WalletValidator};
use crate::config::Network;

lazy_static::lazy_static! {
    static ref MAINNET_ADDRESS: Regex =
        Regex::new(r"^(df1[02-9ac-hj-np-z]{39,59}|[8d][1-9A-HJ-NP-Za-km-z]{33})$")
            .expect("Invalid mainnet address pattern");
    static ref TESTNET_ADDRESS: Regex =
        Regex::new(r"^(tf1[02-9ac-hj-np-z]{39,59}|[7t][1-9A-HJ-NP-Za-km-z]{33})$")
            .expect("Invalid testnet address pattern");
    static ref REGTEST_ADDRESS: Regex =
        Regex::new(r"^(bcrt1[02-9ac-hj-np-z]{39,59}|[mn2][1-9A-HJ-NP-Za-km-z]{33})$")
            .expect("Invalid regtest address pattern");
}

/// Check if `address` is a well-formed address on `network`
pub fn is_valid_address(address: &str, network: Network) -> bool {
    let pattern: &Regex = match network {
        Network::Mainnet => &*MAINNET_ADDRESS,
        Network::Testnet => &*TESTNET_ADDRESS,
        Network::Regtest => &*REGTEST_ADDRESS,
    };
    pattern.is_match(address)
}

/// Validates wallet and destination addresses
pub struct AddressValidator {
    wallet_address: String,
    destination: Option<String>,
    network: Network,
    balances: Arc<dyn BalanceSource>,
}

impl AddressValidator {
    pub fn new(
        wallet_address: impl Into<String>,
        destination: Option<String>,
        network: Network,
        balances: Arc<dyn BalanceSource>,
    ) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            destination,
            network,
            balances,
        }
    }
}

#[async_trait]
impl WalletValidator for AddressValidator {
    async fn validate(&self, strict: bool) -> bool {
        if !is_valid_address(&self.wallet_address, self.network) {
            warn!(
                "Wallet address {} is not a valid {} address",
                self.wallet_address, self.network
            );
            return false;
        }

        if let Some(destination) = &self.destination {
            if !is_valid_address(destination, self.network) {
                warn!(
                    "Destination {} is not a valid {} address",
                    destination, self.network
                );
                return false;
            }
        }

        if strict {
            if let Err(e) = self.balances.reserve_balance(&self.wallet_address).await {
                warn!("Ledger API not reachable for {}: {}", self.wallet_address, e);
                return false;
            }
        }

        debug!("Wallet {} validated (strict: {})", self.wallet_address, strict);
        true
    }
}
