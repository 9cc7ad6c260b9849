//! In-memory collaborators for engine tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::chain::{
    ConversionDirection, InputRef, TransactionChain, TxId, TxKind, TxOutput, UnsignedTx,
};
use super::engine::{Collaborators, ConsolidationEngine, ConsolidationSettings};
use crate::error::{Error, Result};
use crate::ledger::{
    BalanceSource, Signer, TokenBalance, TokenBalanceMap, TransactionBuilder, WalletValidator,
};
use crate::notify::{self, Notifier};

pub const WALLET: &str = "df1qwallet";
pub const DEST: &str = "df1qdest";

pub fn settings() -> ConsolidationSettings {
    ConsolidationSettings {
        wallet_address: WALLET.to_string(),
        destination: Some(DEST.to_string()),
        threshold: dec!(1),
        token_symbol: "DFI".to_string(),
        conversion_direction: ConversionDirection::AccountToReserve,
        chain_prevouts: true,
    }
}

pub fn engine_with(
    settings: ConsolidationSettings,
    ledger: Arc<FakeLedger>,
    notifier: Arc<RecordingNotifier>,
) -> ConsolidationEngine {
    ConsolidationEngine::new(
        settings,
        Collaborators {
            balances: ledger.clone(),
            validator: ledger.clone(),
            builder: ledger.clone(),
            signer: ledger,
            notifier,
        },
    )
}

/// Notifier that keeps every message
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Ledger, builder, signer and validator in one fake
pub struct FakeLedger {
    reserve: Decimal,
    tokens: TokenBalanceMap,
    valid: AtomicBool,
    can_sign: AtomicBool,
    confirms: AtomicBool,
    fail_reads: AtomicBool,
    balance_reads: AtomicUsize,
    next_id: AtomicUsize,
    transfer_inputs: Mutex<Vec<Option<InputRef>>>,
    submitted: Mutex<Vec<TransactionChain>>,
    handed_off: Mutex<Vec<TransactionChain>>,
    waited: Mutex<Vec<TxId>>,
}

impl FakeLedger {
    pub fn new(reserve: Decimal, dfi: Decimal) -> Self {
        let mut tokens = TokenBalanceMap::default();
        if dfi > Decimal::ZERO {
            tokens.insert(TokenBalance::new("DFI", dfi));
        }

        Self {
            reserve,
            tokens,
            valid: AtomicBool::new(true),
            can_sign: AtomicBool::new(true),
            confirms: AtomicBool::new(true),
            fail_reads: AtomicBool::new(false),
            balance_reads: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
            transfer_inputs: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            handed_off: Mutex::new(Vec::new()),
            waited: Mutex::new(Vec::new()),
        }
    }

    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::SeqCst);
    }

    pub fn set_can_sign(&self, can_sign: bool) {
        self.can_sign.store(can_sign, Ordering::SeqCst);
    }

    pub fn set_confirms(&self, confirms: bool) {
        self.confirms.store(confirms, Ordering::SeqCst);
    }

    pub fn fail_balance_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn balance_reads(&self) -> usize {
        self.balance_reads.load(Ordering::SeqCst)
    }

    pub fn built_count(&self) -> usize {
        self.next_id.load(Ordering::SeqCst)
    }

    pub fn built_transfer_inputs(&self) -> Vec<Option<InputRef>> {
        self.transfer_inputs.lock().unwrap().clone()
    }

    pub fn submitted_chains(&self) -> Vec<TransactionChain> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn handed_off_chains(&self) -> Vec<TransactionChain> {
        self.handed_off.lock().unwrap().clone()
    }

    pub fn waited_txids(&self) -> Vec<TxId> {
        self.waited.lock().unwrap().clone()
    }

    fn next_txid(&self, prefix: &str) -> TxId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        TxId::new(format!("{}-{}", prefix, n))
    }

    fn read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Ocean("connection refused".to_string()));
        }
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl BalanceSource for FakeLedger {
    async fn reserve_balance(&self, _address: &str) -> Result<Decimal> {
        self.read()?;
        Ok(self.reserve)
    }

    async fn token_balances(&self, _address: &str) -> Result<TokenBalanceMap> {
        self.read()?;
        Ok(self.tokens.clone())
    }
}

#[async_trait]
impl WalletValidator for FakeLedger {
    async fn validate(&self, _strict: bool) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionBuilder for FakeLedger {
    async fn build_conversion(
        &self,
        amount: Decimal,
        direction: ConversionDirection,
    ) -> Result<UnsignedTx> {
        let id = self.next_txid("conv");
        Ok(UnsignedTx {
            hex: format!("hex-{}", id),
            id,
            kind: TxKind::Conversion(direction),
            amount,
            outputs: vec![
                TxOutput {
                    vout: 0,
                    address: "df1qfee".to_string(),
                    value: Decimal::ZERO,
                },
                TxOutput {
                    vout: 1,
                    address: WALLET.to_string(),
                    value: amount,
                },
            ],
        })
    }

    async fn build_transfer(
        &self,
        amount: Decimal,
        destination: &str,
        input: Option<&InputRef>,
    ) -> Result<UnsignedTx> {
        self.transfer_inputs.lock().unwrap().push(input.cloned());
        let id = self.next_txid("xfer");
        Ok(UnsignedTx {
            hex: format!("hex-{}", id),
            id,
            kind: TxKind::Transfer,
            amount,
            outputs: vec![TxOutput {
                vout: 0,
                address: destination.to_string(),
                value: amount,
            }],
        })
    }

    fn derive_input_ref(&self, tx: &UnsignedTx) -> Result<InputRef> {
        let output = tx.output_to(WALLET).ok_or_else(|| Error::MissingInputRef {
            txid: tx.id.to_string(),
        })?;
        Ok(InputRef {
            txid: tx.id.clone(),
            vout: output.vout,
            value: output.value,
        })
    }
}

#[async_trait]
impl Signer for FakeLedger {
    fn has_local_signing_authority(&self) -> bool {
        self.can_sign.load(Ordering::SeqCst)
    }

    async fn sign_and_submit(&self, chain: &TransactionChain) -> Result<()> {
        self.submitted.lock().unwrap().push(chain.clone());
        Ok(())
    }

    async fn wait_for_confirmation(&self, txid: &TxId) -> Result<bool> {
        self.waited.lock().unwrap().push(txid.clone());
        Ok(self.confirms.load(Ordering::SeqCst))
    }

    async fn hand_off(&self, chain: &TransactionChain, notifier: &dyn Notifier) -> Result<()> {
        self.handed_off.lock().unwrap().push(chain.clone());
        notify::hand_off_for_external_signing(chain, notifier).await;
        Ok(())
    }
}
