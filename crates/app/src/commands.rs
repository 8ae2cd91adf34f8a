use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use sparebank1_core::{format_entries, AccountName, Directive, Importer, MetaValue};
use sparebank1_import::{Config, DepositAccountImporter};
use sparebank1_pdf::{PdfStatementImporter, PdfTextExtractor, TextExtractor};

use crate::diff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImporterKind {
    Deposit,
    Balance,
}

impl fmt::Display for ImporterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImporterKind::Deposit => "deposit",
            ImporterKind::Balance => "balance",
        })
    }
}

/// The configured importers, tried in order.
pub struct Importers<E: TextExtractor = PdfTextExtractor> {
    deposit: DepositAccountImporter,
    balance: PdfStatementImporter<E>,
}

impl Importers<PdfTextExtractor> {
    pub fn from_config(config: &Config) -> Result<Self> {
        let deposit = DepositAccountImporter::new(config.deposit.clone())
            .context("invalid deposit account rules")?;
        let b = config.balance_settings();
        let balance = PdfStatementImporter::new(b.account, b.currency, b.account_number);
        Ok(Self::new(deposit, balance))
    }
}

impl<E: TextExtractor> Importers<E> {
    pub fn new(deposit: DepositAccountImporter, balance: PdfStatementImporter<E>) -> Self {
        Self { deposit, balance }
    }

    pub fn identify(&self, path: &Path) -> Option<ImporterKind> {
        if self.deposit.identify(path) {
            Some(ImporterKind::Deposit)
        } else if self.balance.identify(path) {
            Some(ImporterKind::Balance)
        } else {
            None
        }
    }

    pub fn account(&self, kind: ImporterKind, path: &Path) -> &AccountName {
        match kind {
            ImporterKind::Deposit => self.deposit.account(path),
            ImporterKind::Balance => self.balance.account(path),
        }
    }

    pub fn filename(&self, kind: ImporterKind, path: &Path) -> Option<String> {
        match kind {
            ImporterKind::Deposit => self.deposit.filename(path),
            ImporterKind::Balance => self.balance.filename(path),
        }
    }

    pub fn extract(
        &self,
        kind: ImporterKind,
        path: &Path,
        existing: &[Directive],
    ) -> Result<Vec<Directive>> {
        let entries = match kind {
            ImporterKind::Deposit => self.deposit.extract(path, existing)?,
            ImporterKind::Balance => self.balance.extract(path, existing)?,
        };
        Ok(entries)
    }

    fn require(&self, path: &Path) -> Result<ImporterKind> {
        match self.identify(path) {
            Some(kind) => Ok(kind),
            None => bail!("{} is not recognized by any importer", path.display()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExtractedFile {
    pub file: String,
    pub importer: ImporterKind,
    pub entries: Vec<Directive>,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub fn identify<E: TextExtractor>(
    importers: &Importers<E>,
    files: &[PathBuf],
    out: &mut impl Write,
) -> Result<()> {
    for path in files {
        let name = importers
            .identify(path)
            .map_or_else(|| "-".to_string(), |k| k.to_string());
        writeln!(out, "{}: {name}", path.display())?;
    }
    Ok(())
}

/// Extracts every recognized file. Entries from earlier files count as
/// existing for later ones, so overlapping exports are flagged once.
pub fn extract_files<E: TextExtractor>(
    importers: &Importers<E>,
    files: &[PathBuf],
    existing: &[Directive],
) -> Result<Vec<ExtractedFile>> {
    let mut seen: Vec<Directive> = existing.to_vec();
    let mut extracted = Vec::new();
    for path in files {
        let Some(kind) = importers.identify(path) else {
            tracing::warn!(path = %path.display(), "skipping unrecognized file");
            continue;
        };
        let entries = importers
            .extract(kind, path, &seen)
            .with_context(|| format!("extracting {}", path.display()))?;
        seen.extend(entries.iter().filter(|e| !e.is_duplicate()).cloned());
        extracted.push(ExtractedFile {
            file: path.display().to_string(),
            importer: kind,
            entries,
        });
    }
    Ok(extracted)
}

pub fn render_extracted(files: &[ExtractedFile]) -> String {
    let mut out = String::from(";; -*- mode: beancount -*-\n");
    for file in files {
        out.push_str(&format!("\n**** {}\n\n", file.file));
        let body = format_entries(&file.entries);
        out.push_str(&body);
    }
    out
}

pub fn extract<E: TextExtractor>(
    importers: &Importers<E>,
    files: &[PathBuf],
    existing: &[Directive],
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let extracted = extract_files(importers, files, existing)?;
    if json {
        serde_json::to_writer_pretty(&mut *out, &extracted)?;
        writeln!(out)?;
    } else {
        out.write_all(render_extracted(&extracted).as_bytes())?;
    }
    Ok(())
}

pub fn archive<E: TextExtractor>(
    importers: &Importers<E>,
    files: &[PathBuf],
    out: &mut impl Write,
) -> Result<()> {
    for path in files {
        let Some(kind) = importers.identify(path) else {
            continue;
        };
        if let Some(name) = importers.filename(kind, path) {
            writeln!(out, "{}: {name}", path.display())?;
        }
    }
    Ok(())
}

pub fn account<E: TextExtractor>(
    importers: &Importers<E>,
    files: &[PathBuf],
    out: &mut impl Write,
) -> Result<()> {
    for path in files {
        if let Some(kind) = importers.identify(path) {
            writeln!(out, "{}: {}", path.display(), importers.account(kind, path))?;
        }
    }
    Ok(())
}

/// `statement.pdf` becomes `statement.pdf.beancount`.
pub fn expected_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".beancount");
    PathBuf::from(name)
}

/// The regression output for one file: importer facts followed by its entries.
pub fn render_expected<E: TextExtractor>(importers: &Importers<E>, path: &Path) -> Result<String> {
    let kind = importers.require(path)?;
    let mut entries = importers
        .extract(kind, path, &[])
        .with_context(|| format!("extracting {}", path.display()))?;

    // The expectation sits next to the file, so only its bare name is kept.
    // Otherwise `dir/a.csv` and `dir/./a.csv` would render differently.
    if let Some(name) = path.file_name() {
        let name = name.to_string_lossy().into_owned();
        for entry in &mut entries {
            if let Some(value) = entry.meta_mut().get_mut("filename") {
                *value = MetaValue::from(name.clone());
            }
        }
    }

    let mut out = format!(";; Account: {}\n", importers.account(kind, path));
    if let Some(name) = importers.filename(kind, path) {
        out.push_str(&format!(";; Name: {name}\n"));
    }
    out.push('\n');
    out.push_str(&format_entries(&entries));
    Ok(out)
}

pub fn generate<E: TextExtractor>(
    importers: &Importers<E>,
    path: &Path,
    out: &mut impl Write,
) -> Result<()> {
    let rendered = render_expected(importers, path)?;
    let target = expected_path(path);
    std::fs::write(&target, rendered)
        .with_context(|| format!("writing {}", target.display()))?;
    writeln!(out, "{}: wrote {}", path.display(), target.display())?;
    Ok(())
}

/// Returns whether the output still matches the stored expectation.
pub fn test<E: TextExtractor>(
    importers: &Importers<E>,
    path: &Path,
    out: &mut impl Write,
) -> Result<bool> {
    let target = expected_path(path);
    let expected = std::fs::read_to_string(&target)
        .with_context(|| format!("reading {}", target.display()))?;
    let actual = render_expected(importers, path)?;

    let diff = diff::unified(
        &expected,
        &actual,
        &target.display().to_string(),
        &path.display().to_string(),
    );
    if diff.is_empty() {
        writeln!(out, "{}: OK", path.display())?;
        Ok(true)
    } else {
        writeln!(out, "{}: FAILED", path.display())?;
        out.write_all(diff.as_bytes())?;
        Ok(false)
    }
}
