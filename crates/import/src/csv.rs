use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::str::FromStr;
use thiserror::Error;

/// Header line of a SpareBank 1 deposit account export.
pub const EXPECTED_HEADER: &str = "Dato;Beskrivelse;Rentedato;Inn;Ut;Til konto;Fra konto";

pub const DATE_FORMAT: &str = "%d.%m.%Y";

const COL_DATE: &str = "Dato";
const COL_NARRATION: &str = "Beskrivelse";
const COL_INTEREST_DATE: &str = "Rentedato";
const COL_CREDIT: &str = "Inn";
const COL_DEBIT: &str = "Ut";
const COL_TO_ACCOUNT: &str = "Til konto";
const COL_FROM_ACCOUNT: &str = "Fra konto";

const REQUIRED_COLUMNS: &[&str] = &[
    COL_DATE,
    COL_NARRATION,
    COL_INTEREST_DATE,
    COL_CREDIT,
    COL_DEBIT,
    COL_TO_ACCOUNT,
    COL_FROM_ACCOUNT,
];

/// One row of the export, with the signed amount resolved from the
/// credit/debit column pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRow {
    /// Physical line in the file; the header is line 1.
    pub lineno: usize,
    pub date: NaiveDate,
    pub narration: String,
    pub interest_date: Option<String>,
    /// Positive for money in, negative for money out.
    pub amount: Decimal,
    pub to_account: Option<String>,
    pub from_account: Option<String>,
}

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Line {line}: invalid date '{value}'")]
    InvalidDate { line: usize, value: String },
    #[error("Line {line}: invalid amount '{value}'")]
    InvalidAmount { line: usize, value: String },
    #[error("Line {line}: neither Inn nor Ut has a value")]
    MissingAmount { line: usize },
    #[error("Line {line}: both Inn and Ut have a value")]
    AmbiguousAmount { line: usize },
}

/// Column positions resolved from the header row.
struct ColumnIndex(HashMap<&'static str, usize>);

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, CsvError> {
        let mut map = HashMap::new();
        for &name in REQUIRED_COLUMNS {
            let idx = headers
                .iter()
                .position(|h| strip_bom(h).trim() == name)
                .ok_or_else(|| CsvError::MissingColumn(name.to_string()))?;
            map.insert(name, idx);
        }
        Ok(ColumnIndex(map))
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, name: &str) -> &'r str {
        self.0
            .get(name)
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .unwrap_or_default()
    }
}

fn strip_bom(s: &str) -> &str {
    s.strip_prefix('\u{feff}').unwrap_or(s)
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// True when the text starts with a SpareBank 1 deposit export header.
pub fn identify_header(text: &str) -> bool {
    strip_bom(text)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .is_some_and(|first| first.contains(EXPECTED_HEADER))
}

fn parse_date(s: &str, line: usize) -> Result<NaiveDate, CsvError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| CsvError::InvalidDate {
        line,
        value: s.to_string(),
    })
}

/// Parses one side of the credit/debit pair. The sign is dropped: the column
/// decides the direction, and some exports already write debits as negative.
fn parse_unsigned_amount(s: &str, line: usize) -> Result<Decimal, CsvError> {
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '-' | '\u{2212}'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    Decimal::from_str(&cleaned).map_err(|_| CsvError::InvalidAmount {
        line,
        value: s.to_string(),
    })
}

fn resolve_amount(credit: &str, debit: &str, line: usize) -> Result<Decimal, CsvError> {
    match (credit.is_empty(), debit.is_empty()) {
        (false, true) => parse_unsigned_amount(credit, line),
        (true, false) => Ok(-parse_unsigned_amount(debit, line)?),
        (true, true) => Err(CsvError::MissingAmount { line }),
        (false, false) => Err(CsvError::AmbiguousAmount { line }),
    }
}

pub struct DepositCsvReader;

impl DepositCsvReader {
    pub fn parse_rows<R: Read>(reader: &mut csv::Reader<R>) -> Result<Vec<DepositRow>, CsvError> {
        let columns = ColumnIndex::from_headers(reader.headers()?)?;
        let mut rows = Vec::new();

        for result in reader.records() {
            let record = result?;
            // The csv crate counts lines from 1, header included.
            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(rows.len() + 2);

            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }

            let date = parse_date(columns.get(&record, COL_DATE), line)?;
            let amount = resolve_amount(
                columns.get(&record, COL_CREDIT),
                columns.get(&record, COL_DEBIT),
                line,
            )?;

            rows.push(DepositRow {
                lineno: line,
                date,
                narration: columns.get(&record, COL_NARRATION).to_string(),
                interest_date: non_empty(columns.get(&record, COL_INTEREST_DATE)),
                amount,
                to_account: non_empty(columns.get(&record, COL_TO_ACCOUNT)),
                from_account: non_empty(columns.get(&record, COL_FROM_ACCOUNT)),
            });
        }

        Ok(rows)
    }
}

/// Reads an export with the SpareBank 1 dialect: `;` delimited, `"` quoted,
/// optional UTF-8 byte order mark.
pub fn read_deposit_csv<R: Read>(mut data: R) -> Result<Vec<DepositRow>, CsvError> {
    let mut text = String::new();
    data.read_to_string(&mut text)?;
    let text = strip_bom(&text);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b';')
        .quote(b'"')
        .double_quote(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    DepositCsvReader::parse_rows(&mut reader)
}
