use std::path::Path;

use sparebank1_core::{has_extension, AccountName, Amount, Balance, Directive, Importer, Metadata};

use crate::extractor::{PdfTextExtractor, TextExtractor};
use crate::statement::{account_numbers, parse_statement, PdfError};

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// Reads SpareBank 1 PDF statements and asserts the closing balance.
pub struct PdfStatementImporter<E: TextExtractor = PdfTextExtractor> {
    account: AccountName,
    currency: String,
    account_number: Option<String>,
    extractor: E,
}

impl PdfStatementImporter<PdfTextExtractor> {
    pub fn new(account: AccountName, currency: impl Into<String>, account_number: Option<String>) -> Self {
        Self::with_extractor(account, currency, account_number, PdfTextExtractor)
    }
}

impl<E: TextExtractor> PdfStatementImporter<E> {
    pub fn with_extractor(
        account: AccountName,
        currency: impl Into<String>,
        account_number: Option<String>,
        extractor: E,
    ) -> Self {
        Self {
            account,
            currency: currency.into(),
            account_number,
            extractor,
        }
    }

    /// Whether the text looks like a statement for the configured account.
    /// Without a configured account number any SpareBank 1 statement matches.
    pub fn matches_text(&self, text: &str) -> bool {
        if !text.to_lowercase().contains("sparebank 1") {
            return false;
        }
        match &self.account_number {
            None => true,
            Some(wanted) => {
                let wanted = digits(wanted);
                account_numbers(text).iter().any(|n| digits(n) == wanted)
            }
        }
    }

    pub fn extract_from_text(
        &self,
        text: &str,
        filename: &str,
        existing: &[Directive],
    ) -> Result<Vec<Directive>, PdfError> {
        let summary = parse_statement(text)?;
        let date = summary.assertion_date();

        let mut meta = Metadata::new();
        meta.insert("filename".into(), filename.into());
        let mut entry: Directive = Balance {
            date,
            account: self.account.clone(),
            amount: Amount::new(summary.closing_balance, self.currency.as_str()),
            meta,
        }
        .into();

        let already_asserted = existing.iter().any(|d| match d {
            Directive::Balance(b) => b.date == date && b.account == self.account,
            _ => false,
        });
        if already_asserted {
            entry.mark_duplicate();
        }

        tracing::info!(
            file = filename,
            period_start = %summary.period_start,
            period_end = %summary.period_end,
            balance = %summary.closing_balance,
            duplicate = already_asserted,
            "extracted statement balance"
        );
        Ok(vec![entry])
    }
}

impl<E: TextExtractor> Importer for PdfStatementImporter<E> {
    type Error = PdfError;

    fn name(&self) -> &'static str {
        "balance"
    }

    fn identify(&self, path: &Path) -> bool {
        if !has_extension(path, "pdf") {
            return false;
        }
        match self.extractor.extract_text(path) {
            Ok(text) => self.matches_text(&text),
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot read PDF: {e}");
                false
            }
        }
    }

    fn account(&self, _path: &Path) -> &AccountName {
        &self.account
    }

    fn extract(&self, path: &Path, existing: &[Directive]) -> Result<Vec<Directive>, PdfError> {
        let text = self.extractor.extract_text(path)?;
        self.extract_from_text(&text, &path.display().to_string(), existing)
    }
}
