//! Balance arithmetic for a consolidation cycle
//!
//! Turns a balance snapshot into the amount that can be moved to the
//! destination, keeping a fixed margin of reserve behind for fees.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::ledger::BalanceSnapshot;

/// Reserve left unspent on every consolidation
pub const RESERVE_MARGIN: Decimal = dec!(1);

/// Reserve level at which the operator gets a low-balance warning
///
/// One transaction costs roughly 2e-6 in fees and one consolidation uses up
/// to 3 transactions. Ten consolidations need about 6e-5, rounded up to 1e-4.
pub const LOW_RESERVE_FLOOR: Decimal = dec!(0.0001);

/// Symbol of the native currency in the token balance map
pub const NATIVE_TOKEN: &str = "DFI";

/// Reserve that may be spent: everything above the margin, never negative
pub fn spendable_reserve(reserve: Decimal) -> Decimal {
    if reserve > RESERVE_MARGIN {
        reserve - RESERVE_MARGIN
    } else {
        Decimal::ZERO
    }
}

/// Check if the reserve is at or below the low-balance floor
pub fn is_reserve_low(reserve: Decimal) -> bool {
    reserve <= LOW_RESERVE_FLOOR
}

/// Amounts derived from one balance snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidationPlan {
    /// Raw reserve balance
    pub reserve: Decimal,

    /// Native-currency token balance that has to be converted first
    pub token_contribution: Decimal,

    /// Reserve above the margin
    pub spendable_reserve: Decimal,

    /// Total sent to the destination
    pub consolidated_amount: Decimal,
}

impl ConsolidationPlan {
    /// Build a plan from raw reserve and token amounts
    pub fn new(reserve: Decimal, token_contribution: Decimal) -> Self {
        let token_contribution = token_contribution.max(Decimal::ZERO);
        let spendable_reserve = spendable_reserve(reserve);

        Self {
            reserve,
            token_contribution,
            spendable_reserve,
            consolidated_amount: spendable_reserve + token_contribution,
        }
    }

    /// Build a plan from a snapshot, reading the token balance for `symbol`
    pub fn from_snapshot(snapshot: &BalanceSnapshot, symbol: &str) -> Self {
        Self::new(snapshot.reserve, snapshot.tokens.amount_of(symbol))
    }

    /// Check if the consolidated amount reaches the threshold
    pub fn meets_threshold(&self, threshold: Decimal) -> bool {
        self.consolidated_amount >= threshold
    }

    /// A conversion step is only needed when tokens contribute something
    pub fn needs_conversion(&self) -> bool {
        self.token_contribution > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{TokenBalance, TokenBalanceMap};

    #[test]
    fn test_spendable_reserve_keeps_margin() {
        assert_eq!(spendable_reserve(dec!(0)), Decimal::ZERO);
        assert_eq!(spendable_reserve(dec!(0.5)), Decimal::ZERO);
        assert_eq!(spendable_reserve(dec!(1)), Decimal::ZERO);
        assert_eq!(spendable_reserve(dec!(1.00000001)), dec!(0.00000001));
        assert_eq!(spendable_reserve(dec!(5)), dec!(4));
    }

    #[test]
    fn test_consolidated_amount_is_exact_sum() {
        let plan = ConsolidationPlan::new(dec!(3.12345678), dec!(0.1));
        assert_eq!(plan.spendable_reserve, dec!(2.12345678));
        assert_eq!(plan.consolidated_amount, dec!(2.22345678));

        let plan = ConsolidationPlan::new(dec!(0.5), dec!(0.3));
        assert_eq!(plan.spendable_reserve, Decimal::ZERO);
        assert_eq!(plan.consolidated_amount, dec!(0.3));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let plan = ConsolidationPlan::new(dec!(2), dec!(0));
        assert!(plan.meets_threshold(dec!(1)));
        assert!(!plan.meets_threshold(dec!(1.0001)));
    }

    #[test]
    fn test_needs_conversion_only_for_positive_tokens() {
        assert!(!ConsolidationPlan::new(dec!(5), dec!(0)).needs_conversion());
        assert!(ConsolidationPlan::new(dec!(5), dec!(0.00000001)).needs_conversion());
    }

    #[test]
    fn test_from_snapshot_reads_native_token() {
        let mut tokens = TokenBalanceMap::default();
        tokens.insert(TokenBalance::new("DFI", dec!(2)));
        tokens.insert(TokenBalance::new("BTC", dec!(7)));
        let snapshot = BalanceSnapshot {
            reserve: dec!(3),
            tokens,
        };

        let plan = ConsolidationPlan::from_snapshot(&snapshot, NATIVE_TOKEN);
        assert_eq!(plan.token_contribution, dec!(2));
        assert_eq!(plan.consolidated_amount, dec!(4));

        let missing = ConsolidationPlan::from_snapshot(&snapshot, "ETH");
        assert_eq!(missing.token_contribution, Decimal::ZERO);
    }

    #[test]
    fn test_low_reserve_floor() {
        assert!(is_reserve_low(dec!(0.0001)));
        assert!(is_reserve_low(dec!(0.00005)));
        assert!(!is_reserve_low(dec!(0.00010001)));
    }
}
