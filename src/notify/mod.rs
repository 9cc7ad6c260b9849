//! Operator notifications
//!
//! Delivery is best-effort: a notifier logs its own failures and never
//! fails the caller.

pub mod telegram;

use async_trait::async_trait;
use tracing::info;

use crate::consolidation::chain::TransactionChain;

pub use telegram::TelegramNotifier;

/// Delivers text messages to the operator
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str);
}

/// Notifier that only writes to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) {
        info!(target: "dfi_consolidator::operator", "{}", message);
    }
}

/// Send an unsigned chain to the operator for offline signing
///
/// One header message, then one message per transaction in chain order.
pub async fn hand_off_for_external_signing(chain: &TransactionChain, notifier: &dyn Notifier) {
    let header = format!(
        "no local signing key - please sign and send the following {} transaction(s) in order (final transfer {})",
        chain.tx_count(),
        chain.transfer().id
    );
    notifier.send(&header).await;

    for (idx, tx) in chain.transactions().iter().enumerate() {
        notifier
            .send(&format!("tx {}/{} ({}): {}", idx + 1, chain.tx_count(), tx.id, tx.hex))
            .await;
    }

    info!(
        "Handed off chain of {} transaction(s) for external signing",
        chain.tx_count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidation::chain::{ConversionDirection, TxId, TxKind, UnsignedTx};
    use crate::consolidation::testing::RecordingNotifier;
    use rust_decimal_macros::dec;

    fn tx(id: &str, kind: TxKind) -> UnsignedTx {
        UnsignedTx {
            id: TxId::new(id),
            kind,
            amount: dec!(1),
            hex: format!("hex-{}", id),
            outputs: vec![],
        }
    }

    #[tokio::test]
    async fn test_hand_off_sends_every_tx_in_order() {
        let chain = TransactionChain::ConversionThenTransfer {
            conversion: tx(
                "aa",
                TxKind::Conversion(ConversionDirection::AccountToReserve),
            ),
            input_ref: None,
            transfer: tx("bb", TxKind::Transfer),
        };
        let notifier = RecordingNotifier::default();

        hand_off_for_external_signing(&chain, &notifier).await;

        let messages = notifier.messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].contains("2 transaction(s)"));
        assert!(messages[0].contains("bb"));
        assert_eq!(messages[1], "tx 1/2 (aa): hex-aa");
        assert_eq!(messages[2], "tx 2/2 (bb): hex-bb");
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        LogNotifier.send("hello operator").await;
    }
}
