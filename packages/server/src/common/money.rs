//! Currency helpers. All amounts are `Decimal`, rounded to 2 places
//! half-away-from-zero.

use rust_decimal::{Decimal, RoundingStrategy};

pub const CURRENCY_PLACES: u32 = 2;

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Parses a rate or amount from configuration, e.g. "0.08".
pub fn parse_decimal(raw: &str) -> Result<Decimal, rust_decimal::Error> {
    raw.trim().parse::<Decimal>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round_money(Decimal::new(1005, 3)), Decimal::new(101, 2));
        assert_eq!(round_money(Decimal::new(1004, 3)), Decimal::new(100, 2));
        assert_eq!(round_money(Decimal::new(-1005, 3)), Decimal::new(-101, 2));
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal(" 0.08 ").unwrap(), Decimal::new(8, 2));
        assert!(parse_decimal("eight").is_err());
    }
}
