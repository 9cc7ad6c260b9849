//! Consolidation decision engine
//!
//! One cycle reads the wallet's balances, decides whether enough value has
//! accumulated, and if so builds and executes the transaction chain that moves
//! it to the destination:
//!
//! ```text
//! Idle -> Checking -> NoOpBelowThreshold
//!                  -> Building -> AwaitingExternalSigning
//!                              -> Submitting -> Confirmed
//!                                            -> FailedConfirmation
//! ```
//!
//! Every state after `Checking` is terminal for the cycle. Invocations must be
//! serialized per wallet by the caller; two overlapping cycles would spend the
//! same reserve twice.

use std::fmt;
use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, error, info, instrument, warn};

use super::chain::{ConversionDirection, TransactionChain, TxId};
use super::plan::{is_reserve_low, ConsolidationPlan};
use crate::error::Result;
use crate::ledger::{BalanceSnapshot, BalanceSource, Signer, TransactionBuilder, WalletValidator};
use crate::notify::Notifier;

/// Operator settings, fixed for the lifetime of the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationSettings {
    /// Wallet whose funds are consolidated
    pub wallet_address: String,

    /// Where consolidated funds go; cycles do nothing while unset
    pub destination: Option<String>,

    /// Minimum consolidated amount worth sending
    pub threshold: Decimal,

    /// Symbol of the native currency token balance
    pub token_symbol: String,

    pub conversion_direction: ConversionDirection,

    /// Spend the conversion's unconfirmed output explicitly in the transfer
    pub chain_prevouts: bool,
}

/// External services the engine drives
#[derive(Clone)]
pub struct Collaborators {
    pub balances: Arc<dyn BalanceSource>,
    pub validator: Arc<dyn WalletValidator>,
    pub builder: Arc<dyn TransactionBuilder>,
    pub signer: Arc<dyn Signer>,
    pub notifier: Arc<dyn Notifier>,
}

/// Terminal outcome of one consolidation cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No destination configured
    NoDestination,

    /// Consolidated amount below the threshold, nothing built
    BelowThreshold { plan: ConsolidationPlan },

    /// No signing key; the unsigned chain went to the operator
    HandedOff { chain: TransactionChain },

    /// Transfer confirmed on-chain
    Confirmed {
        amount: Decimal,
        destination: String,
        txid: TxId,
    },

    /// Transfer rejected or not confirmed in time
    ConfirmationFailed { txid: TxId },
}

impl CycleOutcome {
    /// Whether the cycle finished without needing anyone's attention
    pub fn completed(&self) -> bool {
        matches!(
            self,
            CycleOutcome::BelowThreshold { .. } | CycleOutcome::Confirmed { .. }
        )
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::NoDestination => write!(f, "no destination configured"),
            CycleOutcome::BelowThreshold { plan } => write!(
                f,
                "threshold not reached ({} available)",
                plan.consolidated_amount
            ),
            CycleOutcome::HandedOff { chain } => write!(
                f,
                "{} transaction(s) handed off for external signing",
                chain.tx_count()
            ),
            CycleOutcome::Confirmed {
                amount,
                destination,
                txid,
            } => write!(f, "sent {} to {} ({})", amount, destination, txid),
            CycleOutcome::ConfirmationFailed { txid } => {
                write!(f, "transfer {} not confirmed", txid)
            }
        }
    }
}

/// Decides on and executes consolidations for one wallet
pub struct ConsolidationEngine {
    settings: ConsolidationSettings,
    balances: Arc<dyn BalanceSource>,
    validator: Arc<dyn WalletValidator>,
    builder: Arc<dyn TransactionBuilder>,
    signer: Arc<dyn Signer>,
    notifier: Arc<dyn Notifier>,
}

impl ConsolidationEngine {
    /// Create a new engine
    pub fn new(settings: ConsolidationSettings, collaborators: Collaborators) -> Self {
        Self {
            settings,
            balances: collaborators.balances,
            validator: collaborators.validator,
            builder: collaborators.builder,
            signer: collaborators.signer,
            notifier: collaborators.notifier,
        }
    }

    pub fn settings(&self) -> &ConsolidationSettings {
        &self.settings
    }

    /// Validate the wallet and warn the operator about a low reserve
    ///
    /// Returns false only when validation fails. A low reserve is reported
    /// but never blocks the caller.
    pub async fn perform_safety_check(&self) -> Result<bool> {
        let Some(reserve) = self.wallet_status().await? else {
            return Ok(false);
        };

        if is_reserve_low(reserve) {
            let message = low_reserve_message(
                &self.settings.wallet_address,
                reserve,
                &self.settings.token_symbol,
            );
            self.notifier.send(&message).await;
            warn!("{}", message);
        }

        Ok(true)
    }

    /// Validate the wallet and read its reserve, without notifying
    ///
    /// Returns `None` when validation fails.
    pub async fn wallet_status(&self) -> Result<Option<Decimal>> {
        if !self.validator.validate(false).await {
            return Ok(None);
        }

        let reserve = self
            .balances
            .reserve_balance(&self.settings.wallet_address)
            .await?;
        Ok(Some(reserve))
    }

    /// Read the balances a cycle decides on
    pub async fn fetch_snapshot(&self) -> Result<BalanceSnapshot> {
        let address = &self.settings.wallet_address;
        let reserve = self.balances.reserve_balance(address).await?;
        let tokens = self.balances.token_balances(address).await?;
        Ok(BalanceSnapshot { reserve, tokens })
    }

    /// Run one cycle on freshly fetched balances
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        if self.settings.destination.is_none() {
            debug!("No destination configured, skipping consolidation");
            return Ok(CycleOutcome::NoDestination);
        }

        let snapshot = self.fetch_snapshot().await?;
        self.run_cycle_with_snapshot(snapshot).await
    }

    /// Run one cycle on a snapshot supplied by the caller
    #[instrument(skip_all, fields(cycle_id = %uuid::Uuid::new_v4()))]
    pub async fn run_cycle_with_snapshot(&self, snapshot: BalanceSnapshot) -> Result<CycleOutcome> {
        let Some(destination) = self.settings.destination.as_deref() else {
            debug!("No destination configured, skipping consolidation");
            return Ok(CycleOutcome::NoDestination);
        };
        let symbol = self.settings.token_symbol.as_str();

        debug!("utxo: {}", snapshot.reserve);
        debug!("{}: {}", symbol, snapshot.tokens.amount_of(symbol));

        let plan = ConsolidationPlan::from_snapshot(&snapshot, symbol);
        info!(
            "Amount to use: {} (utxo {} + token {})",
            plan.consolidated_amount, plan.spendable_reserve, plan.token_contribution
        );

        if !plan.meets_threshold(self.settings.threshold) {
            info!(
                "Threshold not reached: {} < {}",
                plan.consolidated_amount, self.settings.threshold
            );
            return Ok(CycleOutcome::BelowThreshold { plan });
        }

        let chain = TransactionChain::assemble(
            &*self.builder,
            &plan,
            destination,
            self.settings.conversion_direction,
            self.settings.chain_prevouts,
        )
        .await?;

        let summary = transfer_message(plan.consolidated_amount, symbol, destination);
        info!("{}", summary);

        if !self.signer.has_local_signing_authority() {
            self.signer.hand_off(&chain, &*self.notifier).await?;
            return Ok(CycleOutcome::HandedOff { chain });
        }

        self.signer.sign_and_submit(&chain).await?;

        let txid = chain.transfer().id.clone();
        if !self.signer.wait_for_confirmation(&txid).await? {
            self.notifier.send(&failure_message(symbol)).await;
            error!("Sending {} failed: transfer {} not confirmed", symbol, txid);
            return Ok(CycleOutcome::ConfirmationFailed { txid });
        }

        self.notifier.send(&summary).await;

        Ok(CycleOutcome::Confirmed {
            amount: plan.consolidated_amount,
            destination: destination.to_string(),
            txid,
        })
    }
}

/// Format with a fixed number of decimals, rounding half away from zero
fn fixed(amount: Decimal, decimals: u32) -> String {
    let rounded = amount.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", decimals as usize, rounded)
}

/// Operator warning for a reserve at or below the fee floor
pub fn low_reserve_message(address: &str, reserve: Decimal, symbol: &str) -> String {
    format!(
        "your UTXO balance is running low in {}, only {} {} left. Please replenish to prevent any errors",
        address,
        fixed(reserve, 5),
        symbol
    )
}

/// Operator message for a successful transfer
pub fn transfer_message(amount: Decimal, symbol: &str, destination: &str) -> String {
    format!("send {}@{} to: {}", fixed(amount, 4), symbol, destination)
}

/// Operator message for a transfer that did not confirm
pub fn failure_message(symbol: &str) -> String {
    format!("ERROR: sending of {} failed", symbol)
}
