use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sparebank1_core::AccountName;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::dedup::HeuristicComparator;
use crate::rules::{
    AccountNumberRule, CategoryRules, NarrationRule, DEFAULT_EXPENSE_ACCOUNT,
    DEFAULT_INCOME_ACCOUNT,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn default_currency() -> String {
    "NOK".to_string()
}

fn default_flag() -> char {
    '*'
}

fn default_expense_account() -> AccountName {
    AccountName::new(DEFAULT_EXPENSE_ACCOUNT).expect("default expense account is valid")
}

fn default_income_account() -> AccountName {
    AccountName::new(DEFAULT_INCOME_ACCOUNT).expect("default income account is valid")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DedupConfig {
    #[serde(default = "DedupConfig::default_window_days")]
    pub window_days: i64,
    #[serde(default = "DedupConfig::default_max_date_delta_days")]
    pub max_date_delta_days: Option<i64>,
    #[serde(default = "DedupConfig::default_epsilon")]
    pub epsilon: Decimal,
    #[serde(default)]
    pub require_account_subset: bool,
}

impl DedupConfig {
    fn default_window_days() -> i64 {
        3
    }

    fn default_max_date_delta_days() -> Option<i64> {
        Some(2)
    }

    fn default_epsilon() -> Decimal {
        Decimal::new(5, 2)
    }

    pub fn window(&self) -> Duration {
        Duration::days(self.window_days)
    }

    pub fn comparator(&self) -> HeuristicComparator {
        HeuristicComparator {
            max_date_delta: self.max_date_delta_days.map(Duration::days),
            epsilon: self.epsilon,
            require_account_subset: self.require_account_subset,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_days: Self::default_window_days(),
            max_date_delta_days: Self::default_max_date_delta_days(),
            epsilon: Self::default_epsilon(),
            require_account_subset: false,
        }
    }
}

/// Settings for the deposit account CSV importer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepositConfig {
    pub account: AccountName,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_flag")]
    pub flag: char,
    /// The bank's own number for the imported account.
    #[serde(default)]
    pub primary_account_number: Option<String>,
    #[serde(default = "default_expense_account")]
    pub default_expense_account: AccountName,
    #[serde(default = "default_income_account")]
    pub default_income_account: AccountName,
    #[serde(default)]
    pub account_number_rules: Vec<AccountNumberRule>,
    #[serde(default)]
    pub narration_rules: Vec<NarrationRule>,
    #[serde(default)]
    pub dedup: DedupConfig,
}

impl DepositConfig {
    pub fn new(account: AccountName) -> Self {
        Self {
            account,
            currency: default_currency(),
            flag: default_flag(),
            primary_account_number: None,
            default_expense_account: default_expense_account(),
            default_income_account: default_income_account(),
            account_number_rules: Vec::new(),
            narration_rules: Vec::new(),
            dedup: DedupConfig::default(),
        }
    }

    pub fn category_rules(&self) -> CategoryRules {
        CategoryRules {
            account_number_rules: self.account_number_rules.clone(),
            narration_rules: self.narration_rules.clone(),
            default_expense_account: self.default_expense_account.clone(),
            default_income_account: self.default_income_account.clone(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.currency.is_empty() || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::Invalid(format!(
                "currency must be an upper-case code, got '{}'",
                self.currency
            )));
        }
        if self.dedup.window_days < 0 {
            return Err(ConfigError::Invalid("dedup.window_days must not be negative".into()));
        }
        if self.dedup.max_date_delta_days.is_some_and(|d| d < 0) {
            return Err(ConfigError::Invalid(
                "dedup.max_date_delta_days must not be negative".into(),
            ));
        }
        if self.dedup.epsilon.is_sign_negative() {
            return Err(ConfigError::Invalid("dedup.epsilon must not be negative".into()));
        }
        Ok(())
    }
}

/// Optional overrides for the PDF statement importer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BalanceConfig {
    pub account: Option<AccountName>,
    pub currency: Option<String>,
    pub account_number: Option<String>,
}

/// Resolved settings for the PDF statement importer.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSettings {
    pub account: AccountName,
    pub currency: String,
    pub account_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub deposit: DepositConfig,
    #[serde(default)]
    pub balance: BalanceConfig,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.deposit.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            narration_rules = config.deposit.narration_rules.len(),
            account_number_rules = config.deposit.account_number_rules.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Balance importer settings, falling back to the deposit account.
    pub fn balance_settings(&self) -> BalanceSettings {
        BalanceSettings {
            account: self
                .balance
                .account
                .clone()
                .unwrap_or_else(|| self.deposit.account.clone()),
            currency: self
                .balance
                .currency
                .clone()
                .unwrap_or_else(|| self.deposit.currency.clone()),
            account_number: self
                .balance
                .account_number
                .clone()
                .or_else(|| self.deposit.primary_account_number.clone()),
        }
    }
}

/// `~/.config/sparebank1/config.toml` on Linux, the platform equivalent elsewhere.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("no", "sparebank1", "sparebank1")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{AmountOperator, MatchType};
    use std::str::FromStr;

    const FULL: &str = r#"
[deposit]
account = "Assets:Bank:SpareBank1:Checking"
currency = "NOK"
flag = "!"
primary_account_number = "1234.56.78901"
default_expense_account = "Expenses:Unknown"

[[deposit.account_number_rules]]
account_number = "9871.23.45678"
account = "Assets:Bank:SpareBank1:Savings"

[[deposit.narration_rules]]
pattern = "KIWI"
account = "Expenses:Groceries"

[[deposit.narration_rules]]
pattern = "^VIPPS"
account = "Expenses:Vipps"
match_type = "regex"
amount = { operator = "lt", value = "200" }

[deposit.dedup]
window_days = 5
max_date_delta_days = 1
epsilon = "0.01"

[balance]
account = "Assets:Bank:SpareBank1:Statement"
"#;

    #[test]
    fn parses_full_config() {
        let config = Config::from_toml_str(FULL).unwrap();
        let d = &config.deposit;
        assert_eq!(d.account.as_str(), "Assets:Bank:SpareBank1:Checking");
        assert_eq!(d.flag, '!');
        assert_eq!(d.default_expense_account.as_str(), "Expenses:Unknown");
        assert_eq!(d.default_income_account.as_str(), DEFAULT_INCOME_ACCOUNT);
        assert_eq!(d.account_number_rules.len(), 1);
        assert_eq!(d.narration_rules.len(), 2);
        assert_eq!(d.narration_rules[0].match_type, MatchType::Contains);
        assert_eq!(d.narration_rules[1].match_type, MatchType::Regex);
        let cond = d.narration_rules[1].amount.as_ref().unwrap();
        assert_eq!(cond.operator, AmountOperator::Lt);
        assert_eq!(cond.value, Decimal::from(200));
        assert_eq!(d.dedup.window(), Duration::days(5));
        assert_eq!(d.dedup.epsilon, Decimal::from_str("0.01").unwrap());
    }

    #[test]
    fn defaults_apply_to_minimal_config() {
        let config = Config::from_toml_str(
            "[deposit]\naccount = \"Assets:Bank:SpareBank1:Checking\"\n",
        )
        .unwrap();
        let d = &config.deposit;
        assert_eq!(d.currency, "NOK");
        assert_eq!(d.flag, '*');
        assert_eq!(d.dedup, DedupConfig::default());
        assert_eq!(d.default_expense_account.as_str(), DEFAULT_EXPENSE_ACCOUNT);
    }

    #[test]
    fn balance_settings_fall_back_to_deposit() {
        let config = Config::from_toml_str(
            "[deposit]\naccount = \"Assets:Bank:SpareBank1:Checking\"\nprimary_account_number = \"1234.56.78901\"\n",
        )
        .unwrap();
        let b = config.balance_settings();
        assert_eq!(b.account.as_str(), "Assets:Bank:SpareBank1:Checking");
        assert_eq!(b.currency, "NOK");
        assert_eq!(b.account_number.as_deref(), Some("1234.56.78901"));

        let full = Config::from_toml_str(FULL).unwrap().balance_settings();
        assert_eq!(full.account.as_str(), "Assets:Bank:SpareBank1:Statement");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = Config::from_toml_str(
            "[deposit]\naccount = \"Assets:Bank:X\"\ncategorization_rules = []\n",
        );
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn invalid_account_is_rejected() {
        let result = Config::from_toml_str("[deposit]\naccount = \"bank\"\n");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn negative_window_is_rejected() {
        let result = Config::from_toml_str(
            "[deposit]\naccount = \"Assets:Bank:X\"\n[deposit.dedup]\nwindow_days = -1\n",
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, FULL).unwrap();
        assert_eq!(Config::load(&path).unwrap().deposit.narration_rules.len(), 2);
    }
}
