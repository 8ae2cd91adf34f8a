use std::path::Path;

use crate::account::AccountName;
use crate::directive::Directive;

/// A source of ledger entries for one kind of bank document.
pub trait Importer {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Short name shown by the command-line harness.
    fn name(&self) -> &'static str;

    /// Whether this importer understands the file.
    fn identify(&self, path: &Path) -> bool;

    /// The ledger account the document belongs to.
    fn account(&self, path: &Path) -> &AccountName;

    /// Name to archive the document under.
    fn filename(&self, path: &Path) -> Option<String> {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| format!("sparebank1.{n}"))
    }

    /// Extracts entries, marking those already present in `existing`.
    fn extract(&self, path: &Path, existing: &[Directive]) -> Result<Vec<Directive>, Self::Error>;
}

/// Case-insensitive extension check.
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}
