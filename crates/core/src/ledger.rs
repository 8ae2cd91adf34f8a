//! Loads an existing Beancount ledger for the duplicate pass.
//!
//! Parsing is done by `beancount-parser`; this module converts its
//! transactions and balance assertions into our [`Directive`]s and skips the
//! rest (open, close, price, pad, event, commodity).

use beancount_parser::metadata::Value;
use beancount_parser::{DirectiveContent, Entry};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::Path;
use thiserror::Error;

use crate::account::{AccountName, LedgerError};
use crate::amount::Amount;
use crate::directive::{Balance, Directive, MetaValue, Metadata, Posting, Transaction};

type Parsed = beancount_parser::Directive<Decimal>;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read ledger: {0}")]
    Read(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

fn convert_meta<'a, K: ToString + 'a>(
    source: impl IntoIterator<Item = (&'a K, &'a Value<Decimal>)>,
) -> Metadata {
    source
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => MetaValue::String(s.clone()),
                Value::Number(n) => MetaValue::Number(*n),
                Value::Currency(c) => MetaValue::String(c.as_str().to_string()),
                #[allow(unreachable_patterns)]
                _ => return None,
            };
            Some((key.to_string(), value))
        })
        .collect()
}

fn convert_date(date: &beancount_parser::Date) -> Result<NaiveDate, LedgerError> {
    NaiveDate::from_ymd_opt(date.year.into(), date.month.into(), date.day.into()).ok_or_else(
        || LedgerError::Syntax(format!("invalid date {}-{}-{}", date.year, date.month, date.day)),
    )
}

fn convert_amount(amount: &beancount_parser::Amount<Decimal>) -> Amount {
    Amount::new(amount.value, amount.currency.as_str())
}

/// Converts one parsed directive. `None` for directive kinds the importers
/// never compare against.
fn convert(parsed: &Parsed) -> Result<Option<Directive>, LedgerError> {
    let date = convert_date(&parsed.date)?;
    let meta = convert_meta(&parsed.metadata);

    let directive = match &parsed.content {
        DirectiveContent::Transaction(t) => {
            let mut tx = Transaction::new(
                date,
                t.flag.unwrap_or('*'),
                t.narration.clone().unwrap_or_default(),
            );
            tx.payee = t.payee.clone();
            tx.tags = t.tags.iter().map(|tag| tag.as_str().to_string()).collect();
            tx.links = t.links.iter().map(|link| link.as_str().to_string()).collect();
            tx.meta = meta;
            for p in &t.postings {
                tx.postings.push(Posting {
                    account: AccountName::new(p.account.as_str())?,
                    units: p.amount.as_ref().map(convert_amount),
                    meta: convert_meta(&p.metadata),
                });
            }
            Directive::Transaction(tx)
        }
        DirectiveContent::Balance(b) => Directive::Balance(Balance {
            date,
            account: AccountName::new(b.account.as_str())?,
            amount: convert_amount(&b.amount),
            meta,
        }),
        _ => return Ok(None),
    };
    Ok(Some(directive))
}

fn convert_all<'a>(parsed: impl IntoIterator<Item = &'a Parsed>) -> Result<Vec<Directive>, LedgerError> {
    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for directive in parsed {
        match convert(directive)? {
            Some(entry) => entries.push(entry),
            None => skipped += 1,
        }
    }
    tracing::debug!(kept = entries.len(), skipped, "converted ledger");
    Ok(entries)
}

/// Parses ledger text into transactions and balance assertions.
pub fn parse_ledger(text: &str) -> Result<Vec<Directive>, LedgerError> {
    let file = beancount_parser::parse::<Decimal>(text)
        .map_err(|e| LedgerError::Syntax(e.to_string()))?;
    convert_all(&file.directives)
}

/// Reads a ledger file, following its `include` directives.
pub fn load_ledger(path: &Path) -> Result<Vec<Directive>, LoadError> {
    let mut parsed = Vec::new();
    let entries = beancount_parser::read_files_to_vec::<Decimal>(std::iter::once(path.to_owned()))
        .map_err(|e| LoadError::Read(Box::new(e)))?;
    for entry in entries {
        if let Entry::Directive(directive) = entry {
            parsed.push(directive);
        }
    }
    Ok(convert_all(&parsed)?)
}
