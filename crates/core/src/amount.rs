use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;

/// A number of units of a single commodity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    pub number: Decimal,
    pub currency: String,
}

impl Amount {
    pub fn new(number: Decimal, currency: impl Into<String>) -> Self {
        Amount {
            number,
            currency: currency.into(),
        }
    }

    pub fn zero(currency: impl Into<String>) -> Self {
        Amount::new(Decimal::ZERO, currency)
    }

    pub fn is_zero(&self) -> bool {
        self.number.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.number.is_sign_negative() && !self.number.is_zero()
    }
}

impl Neg for Amount {
    type Output = Self;
    fn neg(self) -> Self {
        Amount {
            number: -self.number,
            currency: self.currency,
        }
    }
}

impl Neg for &Amount {
    type Output = Amount;
    fn neg(self) -> Amount {
        -self.clone()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", format_number(self.number), self.currency)
    }
}

/// Renders a number with at least two decimals and no trailing zeros past that.
pub fn format_number(number: Decimal) -> String {
    let mut n = number.normalize();
    if n.scale() < 2 {
        n.rescale(2);
    }
    // `-0.00` is not a useful thing to print.
    if n.is_zero() {
        n.set_sign_positive(true);
    }
    n.to_string()
}

/// Parses a number written the Norwegian way: comma decimal separator, space or
/// dot thousands separators, optionally with a Unicode minus sign.
pub fn parse_norwegian_number(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}'))
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };
    Decimal::from_str(&normalized).ok()
}
