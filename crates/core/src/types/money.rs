//! Currency amounts.
//!
//! The store trades in a single currency, so `Money` only wraps a
//! [`Decimal`] and knows how to render it.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A currency amount in the store currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// The underlying amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Parse a user-entered amount such as `"12.5"` or `"$1,024.00"`.
    ///
    /// Returns `None` for anything that is not a non-negative number with at
    /// most two decimal places.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let cleaned: String = input
            .trim()
            .trim_start_matches('$')
            .chars()
            .filter(|c| *c != ',')
            .collect();
        let amount: Decimal = cleaned.parse().ok()?;
        if amount.is_sign_negative() || amount.scale() > 2 {
            return None;
        }
        Some(Self(amount))
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl fmt::Display for Money {
    /// Formats as `$1,234.50` (negative amounts as `-$3.00`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = self
            .0
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let sign = if rounded.is_sign_negative() { "-" } else { "" };
        let text = format!("{:.2}", rounded.abs());
        let (whole, cents) = text.split_once('.').unwrap_or((&text, "00"));

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        write!(f, "{sign}${grouped}.{cents}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Money::new(Decimal::new(123_456_789, 2)).to_string(), "$1,234,567.89");
        assert_eq!(Money::new(Decimal::new(5, 1)).to_string(), "$0.50");
        assert_eq!(Money::ZERO.to_string(), "$0.00");
        assert_eq!(Money::new(Decimal::new(-300, 2)).to_string(), "-$3.00");
    }

    #[test]
    fn test_display_rounds_to_cents() {
        assert_eq!(Money::new(Decimal::new(10_005, 3)).to_string(), "$10.01");
    }

    #[test]
    fn test_parse_user_input() {
        assert_eq!(
            Money::parse("$1,024.00").unwrap().amount(),
            Decimal::new(102_400, 2)
        );
        assert_eq!(Money::parse(" 12.5 ").unwrap().amount(), Decimal::new(125, 1));
        assert!(Money::parse("-1").is_none());
        assert!(Money::parse("1.005").is_none());
        assert!(Money::parse("twelve").is_none());
    }
}
