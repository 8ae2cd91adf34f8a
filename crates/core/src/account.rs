use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    Assets,
    Liabilities,
    Equity,
    Income,
    Expenses,
}

impl AccountType {
    /// Assets and liabilities carry balances that a bank statement can assert.
    pub fn is_balance_sheet(self) -> bool {
        matches!(self, AccountType::Assets | AccountType::Liabilities)
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Assets => write!(f, "Assets"),
            AccountType::Liabilities => write!(f, "Liabilities"),
            AccountType::Equity => write!(f, "Equity"),
            AccountType::Income => write!(f, "Income"),
            AccountType::Expenses => write!(f, "Expenses"),
        }
    }
}

impl FromStr for AccountType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Assets" => Ok(AccountType::Assets),
            "Liabilities" => Ok(AccountType::Liabilities),
            "Equity" => Ok(AccountType::Equity),
            "Income" => Ok(AccountType::Income),
            "Expenses" => Ok(AccountType::Expenses),
            other => Err(LedgerError::InvalidAccount(other.to_string())),
        }
    }
}

/// A colon-separated ledger account name such as `Assets:Bank:SpareBank1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountName(String);

impl AccountName {
    pub fn new(name: &str) -> Result<Self, LedgerError> {
        let mut parts = name.split(':');
        let root = parts.next().unwrap_or_default();
        root.parse::<AccountType>()
            .map_err(|_| LedgerError::InvalidAccount(name.to_string()))?;

        let mut components = 0;
        for part in parts {
            let valid_start = part
                .chars()
                .next()
                .is_some_and(|c| c.is_uppercase() || c.is_ascii_digit());
            if !valid_start || part.chars().any(char::is_whitespace) {
                return Err(LedgerError::InvalidAccount(name.to_string()));
            }
            components += 1;
        }
        if components == 0 {
            return Err(LedgerError::InvalidAccount(name.to_string()));
        }

        Ok(AccountName(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn account_type(&self) -> AccountType {
        // Validated on construction.
        self.0
            .split(':')
            .next()
            .and_then(|root| root.parse().ok())
            .unwrap_or(AccountType::Assets)
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountName {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountName::new(s)
    }
}

impl TryFrom<String> for AccountName {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AccountName::new(&value)
    }
}

impl From<AccountName> for String {
    fn from(value: AccountName) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("Invalid account name: '{0}'")]
    InvalidAccount(String),
    #[error("Unbalanced transaction: {currency} postings sum to {residual}")]
    Unbalanced {
        currency: String,
        residual: rust_decimal::Decimal,
    },
    #[error("Transaction must have at least two postings")]
    EmptyTransaction,
    #[error("Invalid ledger syntax: {0}")]
    Syntax(String),
}
