use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::account::{AccountName, LedgerError};
use super::amount::Amount;

/// Metadata key set on entries that already exist in the ledger.
pub const DUPLICATE_META: &str = "__duplicate__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaValue {
    Bool(bool),
    Number(Decimal),
    Date(NaiveDate),
    String(String),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::String(s) => write!(f, "\"{}\"", escape(s)),
            MetaValue::Number(n) => write!(f, "{n}"),
            MetaValue::Date(d) => write!(f, "{d}"),
            MetaValue::Bool(true) => write!(f, "TRUE"),
            MetaValue::Bool(false) => write!(f, "FALSE"),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::String(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::String(value)
    }
}

impl From<usize> for MetaValue {
    fn from(value: usize) -> Self {
        MetaValue::Number(Decimal::from(value))
    }
}

pub type Metadata = BTreeMap<String, MetaValue>;

pub(crate) fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub account: AccountName,
    /// `None` leaves the amount for the ledger to infer.
    pub units: Option<Amount>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: Metadata,
}

impl Posting {
    pub fn new(account: AccountName, units: Amount) -> Self {
        Posting {
            account,
            units: Some(units),
            meta: Metadata::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub flag: char,
    pub payee: Option<String>,
    pub narration: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub links: BTreeSet<String>,
    pub postings: Vec<Posting>,
    #[serde(default)]
    pub meta: Metadata,
}

impl Transaction {
    pub fn new(date: NaiveDate, flag: char, narration: impl Into<String>) -> Self {
        Transaction {
            date,
            flag,
            payee: None,
            narration: narration.into(),
            tags: BTreeSet::new(),
            links: BTreeSet::new(),
            postings: Vec::new(),
            meta: Metadata::new(),
        }
    }

    /// Per-currency sum of all postings that carry units.
    pub fn residuals(&self) -> BTreeMap<&str, Decimal> {
        let mut sums: BTreeMap<&str, Decimal> = BTreeMap::new();
        for units in self.postings.iter().filter_map(|p| p.units.as_ref()) {
            *sums.entry(units.currency.as_str()).or_default() += units.number;
        }
        sums
    }

    pub fn check_balanced(&self) -> Result<(), LedgerError> {
        if self.postings.len() < 2 {
            return Err(LedgerError::EmptyTransaction);
        }
        // A posting without units absorbs whatever is left.
        if self.postings.iter().any(|p| p.units.is_none()) {
            return Ok(());
        }
        match self.residuals().into_iter().find(|(_, sum)| !sum.is_zero()) {
            Some((currency, residual)) => Err(LedgerError::Unbalanced {
                currency: currency.to_string(),
                residual,
            }),
            None => Ok(()),
        }
    }
}

/// A balance assertion, checked at the start of `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub date: NaiveDate,
    pub account: AccountName,
    pub amount: Amount,
    #[serde(default)]
    pub meta: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    Transaction(Transaction),
    Balance(Balance),
}

impl Directive {
    pub fn date(&self) -> NaiveDate {
        match self {
            Directive::Transaction(t) => t.date,
            Directive::Balance(b) => b.date,
        }
    }

    pub fn meta(&self) -> &Metadata {
        match self {
            Directive::Transaction(t) => &t.meta,
            Directive::Balance(b) => &b.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut Metadata {
        match self {
            Directive::Transaction(t) => &mut t.meta,
            Directive::Balance(b) => &mut b.meta,
        }
    }

    pub fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            Directive::Transaction(t) => Some(t),
            Directive::Balance(_) => None,
        }
    }

    pub fn mark_duplicate(&mut self) {
        self.meta_mut()
            .insert(DUPLICATE_META.to_string(), MetaValue::Bool(true));
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self.meta().get(DUPLICATE_META), Some(MetaValue::Bool(true)))
    }
}

impl From<Transaction> for Directive {
    fn from(value: Transaction) -> Self {
        Directive::Transaction(value)
    }
}

impl From<Balance> for Directive {
    fn from(value: Balance) -> Self {
        Directive::Balance(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn acct(s: &str) -> AccountName {
        AccountName::new(s).unwrap()
    }

    fn nok(s: &str) -> Amount {
        Amount::new(Decimal::from_str(s).unwrap(), "NOK")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn simple_tx(first: &str, second: &str) -> Transaction {
        let mut tx = Transaction::new(date(2024, 1, 15), '*', "KIWI");
        tx.postings.push(Posting::new(acct("Assets:Bank:Checking"), nok(first)));
        tx.postings.push(Posting::new(acct("Expenses:Groceries"), nok(second)));
        tx
    }

    #[test]
    fn balanced_transaction_passes() {
        assert!(simple_tx("-100.00", "100.00").check_balanced().is_ok());
    }

    #[test]
    fn unbalanced_transaction_reports_residual() {
        let err = simple_tx("-100.00", "90.00").check_balanced().unwrap_err();
        assert_eq!(
            err,
            LedgerError::Unbalanced {
                currency: "NOK".to_string(),
                residual: Decimal::from_str("-10.00").unwrap(),
            }
        );
    }

    #[test]
    fn single_posting_is_rejected() {
        let mut tx = Transaction::new(date(2024, 1, 15), '*', "Single");
        tx.postings.push(Posting::new(acct("Assets:Bank:Checking"), nok("1")));
        assert_eq!(tx.check_balanced(), Err(LedgerError::EmptyTransaction));
    }

    #[test]
    fn meta_values_keep_their_kind_through_json() {
        let mut meta = Metadata::new();
        meta.insert("to_account".into(), MetaValue::from("12345678901"));
        meta.insert("lineno".into(), MetaValue::from(4usize));
        meta.insert("flag".into(), MetaValue::Bool(true));
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains(r#""to_account":{"string":"12345678901"}"#));
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn elided_posting_balances() {
        let mut tx = simple_tx("-100.00", "40.00");
        tx.postings.push(Posting {
            account: acct("Expenses:Misc"),
            units: None,
            meta: Metadata::new(),
        });
        assert!(tx.check_balanced().is_ok());
    }

    #[test]
    fn duplicate_marker_round_trip() {
        let mut d: Directive = simple_tx("-1", "1").into();
        assert!(!d.is_duplicate());
        d.mark_duplicate();
        assert!(d.is_duplicate());
    }

    #[test]
    fn directive_date_and_meta() {
        let b = Balance {
            date: date(2024, 2, 1),
            account: acct("Assets:Bank:Checking"),
            amount: nok("1000"),
            meta: Metadata::new(),
        };
        let mut d = Directive::from(b);
        d.meta_mut().insert("filename".into(), "x.pdf".into());
        assert_eq!(d.date(), date(2024, 2, 1));
        assert_eq!(d.meta().get("filename"), Some(&MetaValue::from("x.pdf")));
        assert!(d.as_transaction().is_none());
    }
}
