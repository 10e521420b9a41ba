//! Fixed-point helpers for token and asset quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Quantities are whole-unit amounts; rates are exchange multipliers.
//! Ratios such as quorum and vote results use a per-mille scale (0–1000).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Token or asset quantity.
pub type Amount = Decimal;

/// Upper bound of the per-mille scale.
pub const PERMILLE_SCALE: u32 = 1_000;

/// Whether `amount` is a usable, strictly positive quantity.
pub fn is_positive(amount: Amount) -> bool {
    amount > Decimal::ZERO
}

/// `amount × rate`, `None` on overflow.
pub fn convert(amount: Amount, rate: Decimal) -> Option<Amount> {
    amount.checked_mul(rate)
}

/// `⌊part × 1000 / whole⌋` on the per-mille scale.
///
/// Returns 0 when `whole` is zero. `part` is expected to be `<= whole`.
pub fn permille(part: Amount, whole: Amount) -> u32 {
    if !is_positive(whole) {
        return 0;
    }
    part.checked_mul(Decimal::from(PERMILLE_SCALE))
        .and_then(|scaled| scaled.checked_div(whole))
        .map(|ratio| ratio.floor())
        .and_then(|ratio| ratio.to_u32())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_is_positive() {
        assert!(is_positive(Decimal::ONE));
        assert!(!is_positive(Decimal::ZERO));
        assert!(!is_positive(Decimal::from(-5)));
    }

    #[test]
    fn test_convert() {
        assert_eq!(convert(Decimal::from(10_000), Decimal::from(10)), Some(Decimal::from(100_000)));
        assert_eq!(convert(Decimal::MAX, Decimal::from(2)), None);
    }

    #[test]
    fn test_permille_floors() {
        assert_eq!(permille(Decimal::from(10_000), Decimal::from(30_000)), 333);
        assert_eq!(permille(Decimal::from(40_000), Decimal::from(60_000)), 666);
        assert_eq!(permille(Decimal::from(5), Decimal::from(5)), 1_000);
    }

    #[test]
    fn test_permille_zero_whole() {
        assert_eq!(permille(Decimal::ZERO, Decimal::ZERO), 0);
    }

    proptest! {
        #[test]
        fn permille_stays_in_scale(part in 0u64..1_000_000, extra in 0u64..1_000_000) {
            let whole = Decimal::from(part) + Decimal::from(extra);
            let ratio = permille(Decimal::from(part), whole);
            prop_assert!(ratio <= PERMILLE_SCALE);
        }
    }
}
