pub mod account;
pub mod amount;
pub mod directive;
pub mod format;
pub mod importer;
pub mod ledger;

pub use account::{AccountName, AccountType, LedgerError};
pub use amount::{parse_norwegian_number, Amount};
pub use directive::{Balance, Directive, MetaValue, Metadata, Posting, Transaction, DUPLICATE_META};
pub use format::format_entries;
pub use importer::{has_extension, Importer};
pub use ledger::{load_ledger, parse_ledger, LoadError};
