use chrono::Duration;
use sparebank1_core::{
    has_extension, AccountName, Amount, Directive, Importer, LedgerError, MetaValue, Metadata,
    Posting, Transaction,
};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

use crate::config::DepositConfig;
use crate::csv::{identify_header, read_deposit_csv, CsvError, DepositRow};
use crate::dedup::{mark_duplicate_entries, HeuristicComparator};
use crate::rules::{CategorizableTransaction, Categorizer, RuleError};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error(transparent)]
    Rules(#[from] RuleError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl DepositRow {
    pub fn categorizable(&self) -> CategorizableTransaction<'_> {
        CategorizableTransaction {
            narration: &self.narration,
            amount: self.amount,
            to_account: self.to_account.as_deref(),
            from_account: self.from_account.as_deref(),
        }
    }
}

/// Turns SpareBank 1 deposit account CSV exports into balanced transactions.
pub struct DepositAccountImporter {
    config: DepositConfig,
    categorizer: Categorizer,
    comparator: HeuristicComparator,
    window: Duration,
}

impl DepositAccountImporter {
    pub fn new(config: DepositConfig) -> Result<Self, ImportError> {
        let categorizer = Categorizer::new(config.category_rules())?;
        let comparator = config.dedup.comparator();
        let window = config.dedup.window();
        Ok(Self {
            config,
            categorizer,
            comparator,
            window,
        })
    }

    fn metadata(&self, filename: &str, row: &DepositRow) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("filename".into(), filename.into());
        meta.insert("lineno".into(), MetaValue::from(row.lineno));
        let optional = [
            ("rentedato", &row.interest_date),
            ("to_account", &row.to_account),
            ("from_account", &row.from_account),
        ];
        for (key, value) in optional {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                meta.insert(key.into(), v.into());
            }
        }
        meta
    }

    /// One transaction per row: the bank posting plus exactly one balancing
    /// posting to the categorized account.
    pub fn build_transaction(
        &self,
        filename: &str,
        row: &DepositRow,
    ) -> Result<Transaction, ImportError> {
        let categorization = self.categorizer.categorize(&row.categorizable());
        tracing::debug!(
            lineno = row.lineno,
            narration = %row.narration,
            account = %categorization.account,
            source = %categorization.source,
            "categorized row"
        );

        let units = Amount::new(row.amount, self.config.currency.as_str());
        let balancing = -&units;

        let mut tx = Transaction::new(row.date, self.config.flag, row.narration.as_str());
        tx.meta = self.metadata(filename, row);
        tx.postings.push(Posting::new(self.config.account.clone(), units));
        tx.postings
            .push(Posting::new(categorization.account.clone(), balancing));
        tx.check_balanced()?;
        Ok(tx)
    }

    /// Marks entries already present in `existing`. Returns how many were marked.
    pub fn deduplicate(&self, entries: &mut [Directive], existing: &[Directive]) -> usize {
        mark_duplicate_entries(entries, existing, self.window, &self.comparator)
    }

    pub fn extract_from_reader<R: Read>(
        &self,
        data: R,
        filename: &str,
        existing: &[Directive],
    ) -> Result<Vec<Directive>, ImportError> {
        let rows = read_deposit_csv(data)?;
        let mut entries = rows
            .iter()
            .map(|row| self.build_transaction(filename, row).map(Directive::from))
            .collect::<Result<Vec<_>, _>>()?;

        let duplicates = self.deduplicate(&mut entries, existing);
        tracing::info!(
            file = filename,
            transactions = entries.len(),
            duplicates,
            "extracted deposit account export"
        );
        Ok(entries)
    }
}

impl Importer for DepositAccountImporter {
    type Error = ImportError;

    fn name(&self) -> &'static str {
        "deposit"
    }

    fn identify(&self, path: &Path) -> bool {
        if !has_extension(path, "csv") {
            return false;
        }
        match std::fs::read(path) {
            Ok(bytes) => identify_header(&String::from_utf8_lossy(&bytes)),
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot read file: {e}");
                false
            }
        }
    }

    fn account(&self, _path: &Path) -> &AccountName {
        &self.config.account
    }

    fn extract(&self, path: &Path, existing: &[Directive]) -> Result<Vec<Directive>, ImportError> {
        let file = BufReader::new(File::open(path)?);
        self.extract_from_reader(file, &path.display().to_string(), existing)
    }
}
