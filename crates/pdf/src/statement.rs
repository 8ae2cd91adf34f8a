use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use sparebank1_core::parse_norwegian_number;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF text extraction failed: {0}")]
    Extract(String),
    #[error("Statement period not found")]
    MissingPeriod,
    #[error("Closing balance not found")]
    MissingBalance,
    #[error("Invalid date '{0}'")]
    InvalidDate(String),
    #[error("Invalid amount '{0}'")]
    InvalidAmount(String),
}

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_period,
    r"(\d{2}\.\d{2}\.\d{4})\s*[-–]\s*(\d{2}\.\d{2}\.\d{4})");
re!(re_account_number,
    r"\b(\d{4}\.\d{2}\.\d{5})\b");
re!(re_closing_balance,
    r"(?i)(?:utgående\s+saldo|saldo\s+i\s+(?:din|deres)\s+favør|saldo\s+pr\.?\s*\d{2}\.\d{2}\.\d{4})\s*:?\s*(?:kr\.?|nok)?\s*([-−]?\s?\d+(?:[ \x{A0}.]\d{3})*,\d{2})");

/// What a statement says about the account at the end of its period.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementSummary {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub account_number: Option<String>,
    pub closing_balance: Decimal,
}

impl StatementSummary {
    /// A balance assertion holds at the start of its day, so the closing
    /// balance is asserted on the day after the period ends.
    pub fn assertion_date(&self) -> NaiveDate {
        self.period_end.succ_opt().unwrap_or(self.period_end)
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, PdfError> {
    NaiveDate::parse_from_str(s, "%d.%m.%Y").map_err(|_| PdfError::InvalidDate(s.to_string()))
}

/// Every account number mentioned in the text.
pub fn account_numbers(text: &str) -> Vec<&str> {
    re_account_number()
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Pulls the period, account number and closing balance out of statement text.
pub fn parse_statement(text: &str) -> Result<StatementSummary, PdfError> {
    let period = re_period().captures(text).ok_or(PdfError::MissingPeriod)?;
    let period_start = parse_date(&period[1])?;
    let period_end = parse_date(&period[2])?;

    // The last labelled balance is the closing one; opening balances come first.
    let raw_balance = re_closing_balance()
        .captures_iter(text)
        .last()
        .and_then(|c| c.get(1))
        .ok_or(PdfError::MissingBalance)?
        .as_str();
    let closing_balance = parse_norwegian_number(raw_balance)
        .ok_or_else(|| PdfError::InvalidAmount(raw_balance.to_string()))?;

    let account_number = account_numbers(text).first().map(|s| s.to_string());

    Ok(StatementSummary {
        period_start,
        period_end,
        account_number,
        closing_balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const STATEMENT: &str = "SpareBank 1 Østlandet\n\
        Kontoutskrift for Brukskonto 1234.56.78901\n\
        Periode: 01.01.2024 - 31.01.2024\n\
        Saldo pr. 01.01.2024 10 000,00\n\
        15.01.2024 KIWI 505 BARCODE 123,40\n\
        20.01.2024 Lønn januar 25 000,00\n\
        Utgående saldo 34 876,60\n";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parses_period_account_and_closing_balance() {
        let s = parse_statement(STATEMENT).unwrap();
        assert_eq!(s.period_start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(s.period_end, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(s.account_number.as_deref(), Some("1234.56.78901"));
        assert_eq!(s.closing_balance, dec("34876.60"));
    }

    #[test]
    fn assertion_is_dated_after_period() {
        let s = parse_statement(STATEMENT).unwrap();
        assert_eq!(s.assertion_date(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn favour_label_and_negative_balance() {
        let text = "Periode 01.02.2024–29.02.2024\nSaldo i Deres favør: kr -1.250,00\n";
        let s = parse_statement(text).unwrap();
        assert_eq!(s.closing_balance, dec("-1250.00"));
        assert_eq!(s.assertion_date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(s.account_number, None);
    }

    #[test]
    fn unseparated_amount_is_read_whole() {
        let text = "01.03.2024 - 31.03.2024\nUtgående saldo 12345,67\n";
        assert_eq!(parse_statement(text).unwrap().closing_balance, dec("12345.67"));
    }

    #[test]
    fn missing_period_is_an_error() {
        assert!(matches!(
            parse_statement("Utgående saldo 1,00"),
            Err(PdfError::MissingPeriod)
        ));
    }

    #[test]
    fn missing_balance_is_an_error() {
        assert!(matches!(
            parse_statement("01.01.2024 - 31.01.2024\nInngående saldo 5,00\n"),
            Err(PdfError::MissingBalance)
        ));
    }

    #[test]
    fn invalid_period_date_is_an_error() {
        assert!(matches!(
            parse_statement("31.02.2024 - 31.03.2024\nUtgående saldo 1,00\n"),
            Err(PdfError::InvalidDate(_))
        ));
    }
}
