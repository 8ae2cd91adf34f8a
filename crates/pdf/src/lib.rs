pub mod extractor;
pub mod importer;
pub mod statement;

pub use extractor::{PdfTextExtractor, StaticText, TextExtractor};
pub use importer::PdfStatementImporter;
pub use statement::{parse_statement, PdfError, StatementSummary};
