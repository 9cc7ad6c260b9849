//! Ocean REST API client
//!
//! Reads wallet balances and transaction confirmations from a DeFiChain
//! Ocean endpoint. Transient failures are retried with exponential backoff.
//!
//! API Documentation: https://docs.defichain.com/ocean

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{BalanceSource, TokenBalance, TokenBalanceMap};
use crate::config::{Network, OceanConfig};
use crate::consolidation::chain::TxId;
use crate::error::{Error, Result};

/// Page size for address token listings
const TOKEN_PAGE_SIZE: u32 = 200;

/// Envelope of every Ocean response
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(default)]
    pub page: Option<ApiPage>,
}

/// Pagination cursor
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPage {
    pub next: Option<String>,
}

/// Token entry of `/address/{address}/tokens`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressToken {
    pub id: String,
    pub amount: Decimal,
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<AddressToken> for TokenBalance {
    fn from(token: AddressToken) -> Self {
        TokenBalance {
            symbol: token.symbol,
            amount: token.amount,
            id: Some(token.id),
            name: token.name,
        }
    }
}

/// Minimal view of `/transactions/{txid}`
#[derive(Debug, Clone, Deserialize)]
pub struct OceanTransaction {
    pub txid: String,
    #[serde(default)]
    pub block: Option<OceanBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OceanBlock {
    pub hash: String,
    pub height: u64,
}

/// Ocean API client
pub struct OceanClient {
    client: Client,
    base_url: String,
    network: Network,
    timeout_ms: u64,
    max_retries: u32,
}

impl OceanClient {
    /// Create a new Ocean client
    pub fn new(config: &OceanConfig, network: Network) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!("Ocean client initialized for {} ({})", config.url, network);

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            network,
            timeout_ms: config.timeout_ms,
            max_retries: config.max_retries,
        })
    }

    /// Full URL of an API path below `/v0/{network}`
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/v0/{}/{}",
            self.base_url,
            self.network,
            path.trim_start_matches('/')
        )
    }

    /// Check if a transaction is indexed in a block
    pub async fn transaction_confirmed(&self, txid: &TxId) -> Result<bool> {
        let url = self.url(&format!("transactions/{}", txid));
        let tx: Option<ApiResponse<OceanTransaction>> = self.get_json(&url).await?;

        match tx {
            Some(response) => {
                if let Some(block) = &response.data.block {
                    debug!(
                        "Transaction {} in block {} ({})",
                        response.data.txid, block.height, block.hash
                    );
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Poll until `txid` is confirmed or `timeout` elapses
    pub async fn wait_for_transaction(
        &self,
        txid: &TxId,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.transaction_confirmed(txid).await {
                Ok(true) => {
                    info!("Transaction {} confirmed", txid);
                    return Ok(true);
                }
                Ok(false) => debug!("Transaction {} not confirmed yet", txid),
                Err(e) if e.is_retryable() => {
                    warn!("Confirmation poll for {} failed: {}", txid, e)
                }
                Err(e) => return Err(e),
            }

            if Instant::now() + poll_interval > deadline {
                warn!(
                    "Transaction {} not confirmed within {}s",
                    txid,
                    timeout.as_secs()
                );
                return Ok(false);
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Round-trip latency of a cheap API call, for health checks
    pub async fn ping(&self) -> Result<Duration> {
        let start = Instant::now();
        let url = self.url("stats");
        let _: Option<ApiResponse<serde_json::Value>> = self.get_json(&url).await?;
        Ok(start.elapsed())
    }

    /// GET with retry; `None` on 404
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(4),
            max_elapsed_time: Some(Duration::from_millis(self.timeout_ms)),
            ..Default::default()
        };

        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let max_retries = self.max_retries;

        retry(backoff, move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            match self.get_once(url).await {
                Ok(body) => Ok(body),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    warn!("Retryable Ocean error (attempt {}): {}", attempt + 1, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }

    /// Single GET attempt
    async fn get_once<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        debug!("GET {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::OceanTimeout(self.timeout_ms)
            } else {
                Error::Ocean(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::OceanStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .json::<T>()
            .await
            .map_err(|e| Error::Deserialization(format!("Failed to parse response: {}", e)))?;

        Ok(Some(body))
    }
}

#[async_trait]
impl BalanceSource for OceanClient {
    async fn reserve_balance(&self, address: &str) -> Result<Decimal> {
        let url = self.url(&format!("address/{}/balance", address));
        let balance: Option<ApiResponse<Decimal>> = self.get_json(&url).await?;

        // Unknown addresses have never received funds
        Ok(balance.map(|b| b.data).unwrap_or(Decimal::ZERO))
    }

    async fn token_balances(&self, address: &str) -> Result<TokenBalanceMap> {
        let mut tokens = TokenBalanceMap::default();
        let mut next: Option<String> = None;

        loop {
            let mut url = self.url(&format!(
                "address/{}/tokens?size={}",
                address, TOKEN_PAGE_SIZE
            ));
            if let Some(cursor) = &next {
                url.push_str(&format!("&next={}", cursor));
            }

            let page: Option<ApiResponse<Vec<AddressToken>>> = self.get_json(&url).await?;
            let Some(page) = page else {
                break;
            };

            let fetched = page.data.len();
            for token in page.data {
                tokens.insert(token.into());
            }

            next = page.page.and_then(|p| p.next);
            if next.is_none() || fetched == 0 {
                break;
            }
        }

        debug!("Fetched {} token balances for {}", tokens.len(), address);
        Ok(tokens)
    }
}
