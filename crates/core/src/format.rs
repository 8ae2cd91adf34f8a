//! Beancount text rendering.

use std::fmt::{self, Write};

use crate::directive::{escape, Balance, Directive, Metadata, Transaction};

/// Column the amounts of postings are aligned to.
const AMOUNT_COLUMN: usize = 52;

fn write_meta(f: &mut fmt::Formatter<'_>, meta: &Metadata, indent: &str) -> fmt::Result {
    for (key, value) in meta.iter().filter(|(k, _)| !k.starts_with("__")) {
        writeln!(f, "{indent}{key}: {value}")?;
    }
    Ok(())
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.flag)?;
        if let Some(payee) = &self.payee {
            write!(f, " \"{}\"", escape(payee))?;
        }
        write!(f, " \"{}\"", escape(&self.narration))?;
        for tag in &self.tags {
            write!(f, " #{tag}")?;
        }
        for link in &self.links {
            write!(f, " ^{link}")?;
        }
        writeln!(f)?;
        write_meta(f, &self.meta, "  ")?;

        for posting in &self.postings {
            let account = posting.account.as_str();
            match &posting.units {
                Some(units) => {
                    let number = crate::amount::format_number(units.number);
                    // Right-align the number so decimal points line up. Width
                    // is in chars, like the `{:>width$}` padding.
                    let taken = account.chars().count() + 2;
                    let width = AMOUNT_COLUMN.saturating_sub(taken).max(number.len() + 2);
                    writeln!(f, "  {account}{number:>width$} {}", units.currency)?;
                }
                None => writeln!(f, "  {account}")?,
            }
            write_meta(f, &posting.meta, "    ")?;
        }
        Ok(())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} balance {}  {}", self.date, self.account, self.amount)?;
        write_meta(f, &self.meta, "  ")
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Directive::Transaction(t) => t.to_string(),
            Directive::Balance(b) => b.to_string(),
        };
        if self.is_duplicate() {
            for line in text.lines() {
                writeln!(f, "; {line}")?;
            }
            Ok(())
        } else {
            f.write_str(&text)
        }
    }
}

/// Renders entries separated by blank lines.
pub fn format_entries(entries: &[Directive]) -> String {
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        // Writing into a String cannot fail.
        let _ = write!(out, "{entry}");
    }
    out
}
