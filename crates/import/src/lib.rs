pub mod config;
pub mod csv;
pub mod dedup;
pub mod deposit;
pub mod rules;
pub(crate) mod util;

pub use config::{default_config_path, BalanceSettings, Config, ConfigError, DedupConfig, DepositConfig};
pub use csv::{read_deposit_csv, CsvError, DepositRow};
pub use dedup::{mark_duplicate_entries, HeuristicComparator, SimilarityComparator};
pub use deposit::{DepositAccountImporter, ImportError};
pub use rules::{
    AccountNumberRule, AmountCondition, AmountOperator, CategorizableTransaction, Categorization,
    CategoryRules, Categorizer, Direction, MatchType, NarrationRule, RuleError, RuleSource,
};
