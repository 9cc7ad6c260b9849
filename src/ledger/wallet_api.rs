//! Wallet service client
//!
//! The wallet service holds the wallet's keys and knows how to serialize
//! DeFiChain transactions. It builds unsigned transactions for anyone, but
//! only signs and broadcasts for callers presenting an API key.
//!
//! Without an API key this process is watch-only: chains are built here and
//! handed to the operator for offline signing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{OceanClient, Signer, TransactionBuilder};
use crate::config::{OceanConfig, WalletApiConfig};
use crate::consolidation::chain::{
    ConversionDirection, InputRef, TransactionChain, TxId, TxKind, TxOutput, UnsignedTx,
};
use crate::error::{Error, Result};

/// Header carrying the signing API key
const API_KEY_HEADER: &str = "x-api-key";

/// Conversion request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    pub address: String,
    pub amount: String,
    pub direction: ConversionDirection,
}

/// Previous output reference for chained transfers
#[derive(Debug, Clone, Serialize)]
pub struct Prevout {
    pub txid: String,
    pub vout: u32,
}

/// Transfer request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prevout: Option<Prevout>,
}

/// Built transaction response
#[derive(Debug, Clone, Deserialize)]
pub struct BuiltTransaction {
    pub txid: Option<String>,
    pub hex: Option<String>,
    #[serde(default)]
    pub outputs: Vec<TxOutput>,
    pub error: Option<String>,
}

/// Sign-and-send request, transactions in submission order
#[derive(Debug, Clone, Serialize)]
pub struct SignAndSendRequest {
    pub transactions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignAndSendResponse {
    #[serde(default)]
    pub txids: Vec<String>,
    pub error: Option<String>,
}

/// Wallet service client
pub struct WalletApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    wallet_address: String,
    ocean: Arc<OceanClient>,
    confirmation_timeout: Duration,
    confirmation_poll: Duration,
}

impl WalletApiClient {
    /// Create a new wallet service client
    ///
    /// # Arguments
    /// * `config` - Service URL and optional signing API key
    /// * `ocean_config` - Confirmation timeout and poll interval
    /// * `wallet_address` - Address whose funds are consolidated
    /// * `ocean` - Used to poll for confirmations
    pub fn new(
        config: &WalletApiConfig,
        ocean_config: &OceanConfig,
        wallet_address: impl Into<String>,
        ocean: Arc<OceanClient>,
    ) -> Self {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty());
        if api_key.is_none() {
            info!("No wallet API key configured - running watch-only");
        }

        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
            wallet_address: wallet_address.into(),
            ocean,
            confirmation_timeout: Duration::from_secs(ocean_config.confirmation_timeout_secs),
            confirmation_poll: Duration::from_secs(ocean_config.confirmation_poll_secs),
        }
    }

    async fn post_build<R: Serialize + ?Sized>(
        &self,
        path: &str,
        request: &R,
        kind: TxKind,
        amount: Decimal,
    ) -> Result<UnsignedTx> {
        let url = format!("{}{}", self.base_url, path);

        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::WalletApi(format!("HTTP request failed: {}", e)))?;

        let built: BuiltTransaction = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("Failed to parse response: {}", e)))?;

        into_unsigned(built, kind, amount)
    }
}

/// Convert a build response into an unsigned transaction
fn into_unsigned(built: BuiltTransaction, kind: TxKind, amount: Decimal) -> Result<UnsignedTx> {
    if let Some(error) = built.error {
        return Err(Error::TransactionBuild(error));
    }

    let txid = built
        .txid
        .ok_or_else(|| Error::TransactionBuild("No txid in response".to_string()))?;
    let hex = built
        .hex
        .ok_or_else(|| Error::TransactionBuild("No transaction hex in response".to_string()))?;

    Ok(UnsignedTx {
        id: TxId::new(txid),
        kind,
        amount,
        hex,
        outputs: built.outputs,
    })
}

/// Output of `tx` paying back to `address`, as a spendable reference
fn input_ref_to(tx: &UnsignedTx, address: &str) -> Result<InputRef> {
    let output = tx.output_to(address).ok_or_else(|| Error::MissingInputRef {
        txid: tx.id.to_string(),
    })?;

    Ok(InputRef {
        txid: tx.id.clone(),
        vout: output.vout,
        value: output.value,
    })
}

#[async_trait]
impl TransactionBuilder for WalletApiClient {
    async fn build_conversion(
        &self,
        amount: Decimal,
        direction: ConversionDirection,
    ) -> Result<UnsignedTx> {
        let request = ConversionRequest {
            address: self.wallet_address.clone(),
            amount: amount.to_string(),
            direction,
        };

        debug!("Building {} conversion of {}", direction, amount);
        self.post_build(
            "/v1/transactions/conversion",
            &request,
            TxKind::Conversion(direction),
            amount,
        )
        .await
    }

    async fn build_transfer(
        &self,
        amount: Decimal,
        destination: &str,
        input: Option<&InputRef>,
    ) -> Result<UnsignedTx> {
        let request = TransferRequest {
            from: self.wallet_address.clone(),
            to: destination.to_string(),
            amount: amount.to_string(),
            prevout: input.map(|i| Prevout {
                txid: i.txid.to_string(),
                vout: i.vout,
            }),
        };

        debug!("Building transfer of {} to {}", amount, destination);
        self.post_build("/v1/transactions/transfer", &request, TxKind::Transfer, amount)
            .await
    }

    fn derive_input_ref(&self, tx: &UnsignedTx) -> Result<InputRef> {
        input_ref_to(tx, &self.wallet_address)
    }
}

#[async_trait]
impl Signer for WalletApiClient {
    fn has_local_signing_authority(&self) -> bool {
        self.api_key.is_some()
    }

    async fn sign_and_submit(&self, chain: &TransactionChain) -> Result<()> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Config("API key required for signing".to_string()))?;

        let request = SignAndSendRequest {
            transactions: chain.transactions().iter().map(|tx| tx.hex.clone()).collect(),
        };

        info!("Submitting chain of {} transactions", chain.tx_count());

        let response = self
            .client
            .post(format!("{}/v1/transactions/sign-and-send", self.base_url))
            .header(API_KEY_HEADER, api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::TransactionSend(format!("HTTP request failed: {}", e)))?;

        let sent: SignAndSendResponse = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = sent.error {
            return Err(Error::TransactionSend(error));
        }

        let built: Vec<&str> = chain
            .transactions()
            .into_iter()
            .map(|tx| tx.id.as_str())
            .collect();
        let matches = sent.txids.len() == built.len()
            && sent.txids.iter().zip(&built).all(|(reported, expected)| reported == expected);
        if !matches {
            return Err(Error::TransactionSend(format!(
                "service reported txids [{}] for built [{}]",
                sent.txids.join(", "),
                built.join(", ")
            )));
        }

        info!("Submitted {}", built.join(", "));
        Ok(())
    }

    async fn wait_for_confirmation(&self, txid: &TxId) -> Result<bool> {
        self.ocean
            .wait_for_transaction(txid, self.confirmation_timeout, self.confirmation_poll)
            .await
    }
}
