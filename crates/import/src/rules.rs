use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sparebank1_core::AccountName;
use std::fmt;
use thiserror::Error;

use crate::util::levenshtein_distance;

pub const DEFAULT_EXPENSE_ACCOUNT: &str = "Expenses:Uncategorized";
pub const DEFAULT_INCOME_ACCOUNT: &str = "Income:Uncategorized";

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Narration rule {index} has an invalid regex '{pattern}': {source}")]
    InvalidRegex {
        index: usize,
        pattern: String,
        source: regex::Error,
    },
    #[error("Account number rule {index} has no digits")]
    EmptyAccountNumber { index: usize },
    #[error("Narration rule {index}: 'between' needs an upper bound")]
    MissingUpperBound { index: usize },
}

/// Which way money moved, seen from the imported account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl Direction {
    /// Zero counts as outgoing: zero-amount rows are fee reversals and the like.
    pub fn of(amount: Decimal) -> Self {
        if amount > Decimal::ZERO {
            Direction::Incoming
        } else {
            Direction::Outgoing
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(try_from = "String", into = "String")]
pub enum MatchType {
    #[default]
    Contains,
    Exact,
    Regex,
    Fuzzy {
        threshold: f32,
    },
}

impl std::str::FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(MatchType::Contains),
            "exact" => Ok(MatchType::Exact),
            "regex" => Ok(MatchType::Regex),
            s if s.starts_with("fuzzy:") => {
                let threshold = s[6..]
                    .parse::<f32>()
                    .map_err(|_| "Invalid fuzzy threshold".to_string())?;
                Ok(MatchType::Fuzzy { threshold })
            }
            other => Err(format!("Unknown match type: '{other}'")),
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchType::Contains => write!(f, "contains"),
            MatchType::Exact => write!(f, "exact"),
            MatchType::Regex => write!(f, "regex"),
            MatchType::Fuzzy { threshold } => write!(f, "fuzzy:{threshold}"),
        }
    }
}

impl TryFrom<String> for MatchType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MatchType> for String {
    fn from(value: MatchType) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountOperator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Between,
}

/// Constraint on the absolute amount of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmountCondition {
    pub operator: AmountOperator,
    pub value: Decimal,
    /// Inclusive upper bound for `between`.
    #[serde(default)]
    pub upper: Option<Decimal>,
}

impl AmountCondition {
    pub fn matches(&self, amount: Decimal) -> bool {
        let amount = amount.abs();
        match self.operator {
            AmountOperator::Lt => amount < self.value,
            AmountOperator::Le => amount <= self.value,
            AmountOperator::Gt => amount > self.value,
            AmountOperator::Ge => amount >= self.value,
            AmountOperator::Eq => amount == self.value,
            AmountOperator::Between => self
                .upper
                .is_some_and(|upper| amount >= self.value && amount <= upper),
        }
    }
}

/// Maps a counterparty account number to a ledger account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountNumberRule {
    pub account_number: String,
    pub account: AccountName,
}

/// Maps a narration pattern to a ledger account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NarrationRule {
    pub pattern: String,
    pub account: AccountName,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub ignore_case: bool,
    #[serde(default)]
    pub amount: Option<AmountCondition>,
}

impl NarrationRule {
    pub fn contains(pattern: &str, account: AccountName) -> Self {
        NarrationRule {
            pattern: pattern.to_string(),
            account,
            match_type: MatchType::Contains,
            ignore_case: false,
            amount: None,
        }
    }
}

/// The full rule set, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRules {
    pub account_number_rules: Vec<AccountNumberRule>,
    pub narration_rules: Vec<NarrationRule>,
    pub default_expense_account: AccountName,
    pub default_income_account: AccountName,
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self {
            account_number_rules: Vec::new(),
            narration_rules: Vec::new(),
            default_expense_account: AccountName::new(DEFAULT_EXPENSE_ACCOUNT)
                .expect("default expense account is valid"),
            default_income_account: AccountName::new(DEFAULT_INCOME_ACCOUNT)
                .expect("default income account is valid"),
        }
    }
}

/// What the categorizer sees of a bank row.
#[derive(Debug, Clone)]
pub struct CategorizableTransaction<'a> {
    pub narration: &'a str,
    pub amount: Decimal,
    pub to_account: Option<&'a str>,
    pub from_account: Option<&'a str>,
}

impl CategorizableTransaction<'_> {
    pub fn direction(&self) -> Direction {
        Direction::of(self.amount)
    }

    /// Destination for money out, source for money in.
    pub fn counterparty(&self) -> Option<&str> {
        match self.direction() {
            Direction::Outgoing => self.to_account,
            Direction::Incoming => self.from_account,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    AccountNumber(usize),
    Narration(usize),
    Default,
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::AccountNumber(i) => write!(f, "account number rule #{i}"),
            RuleSource::Narration(i) => write!(f, "narration rule #{i}"),
            RuleSource::Default => write!(f, "default"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Categorization<'a> {
    pub account: &'a AccountName,
    pub source: RuleSource,
}

/// Account number rule with its digits pre-extracted.
struct CompiledAccountRule {
    rule: AccountNumberRule,
    digits: String,
}

/// Internal pairing of a rule with its precompiled regex (if applicable).
struct CompiledRule {
    rule: NarrationRule,
    compiled_regex: Option<Regex>,
}

pub struct Categorizer {
    account_rules: Vec<CompiledAccountRule>,
    narration_rules: Vec<CompiledRule>,
    default_expense_account: AccountName,
    default_income_account: AccountName,
}

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

impl Categorizer {
    pub fn new(rules: CategoryRules) -> Result<Self, RuleError> {
        let account_rules = rules
            .account_number_rules
            .into_iter()
            .enumerate()
            .map(|(index, rule)| {
                let digits = digits(&rule.account_number);
                if digits.is_empty() {
                    return Err(RuleError::EmptyAccountNumber { index });
                }
                Ok(CompiledAccountRule { rule, digits })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let narration_rules = rules
            .narration_rules
            .into_iter()
            .enumerate()
            .map(|(index, rule)| {
                if let Some(cond) = &rule.amount {
                    if cond.operator == AmountOperator::Between && cond.upper.is_none() {
                        return Err(RuleError::MissingUpperBound { index });
                    }
                }
                let compiled_regex = match &rule.match_type {
                    MatchType::Regex => Some(
                        RegexBuilder::new(&rule.pattern)
                            .case_insensitive(rule.ignore_case)
                            .build()
                            .map_err(|source| RuleError::InvalidRegex {
                                index,
                                pattern: rule.pattern.clone(),
                                source,
                            })?,
                    ),
                    _ => None,
                };
                Ok(CompiledRule { rule, compiled_regex })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            account_rules,
            narration_rules,
            default_expense_account: rules.default_expense_account,
            default_income_account: rules.default_income_account,
        })
    }

    /// Picks the balancing account: account number rules first, then
    /// narration rules, then the default for the direction.
    pub fn categorize(&self, tx: &CategorizableTransaction<'_>) -> Categorization<'_> {
        if let Some((index, rule)) = self.match_account_number(tx) {
            return Categorization {
                account: &rule.account,
                source: RuleSource::AccountNumber(index),
            };
        }

        if let Some((index, rule)) = self
            .narration_rules
            .iter()
            .enumerate()
            .find(|(_, cr)| narration_matches(cr, tx))
        {
            return Categorization {
                account: &rule.rule.account,
                source: RuleSource::Narration(index),
            };
        }

        let account = match tx.direction() {
            Direction::Outgoing => &self.default_expense_account,
            Direction::Incoming => &self.default_income_account,
        };
        Categorization {
            account,
            source: RuleSource::Default,
        }
    }

    fn match_account_number(
        &self,
        tx: &CategorizableTransaction<'_>,
    ) -> Option<(usize, &AccountNumberRule)> {
        let counterparty = digits(tx.counterparty()?);
        if counterparty.is_empty() {
            return None;
        }
        self.account_rules
            .iter()
            .enumerate()
            .find(|(_, cr)| counterparty.contains(&cr.digits))
            .map(|(i, cr)| (i, &cr.rule))
    }
}

fn narration_matches(cr: &CompiledRule, tx: &CategorizableTransaction<'_>) -> bool {
    let rule = &cr.rule;

    if let Some(cond) = &rule.amount {
        if !cond.matches(tx.amount) {
            return false;
        }
    }

    let (text, pattern) = if rule.ignore_case {
        (tx.narration.to_lowercase(), rule.pattern.to_lowercase())
    } else {
        (tx.narration.to_string(), rule.pattern.clone())
    };

    match &rule.match_type {
        MatchType::Contains => text.contains(&pattern),
        MatchType::Exact => text.trim() == pattern,
        MatchType::Regex => cr
            .compiled_regex
            .as_ref()
            .is_some_and(|re| re.is_match(tx.narration)),
        MatchType::Fuzzy { threshold } => {
            fuzzy_score(&tx.narration.to_lowercase(), &rule.pattern.to_lowercase()) >= *threshold
        }
    }
}

fn fuzzy_score(s1: &str, s2: &str) -> f32 {
    let max_len = s1.chars().count().max(s2.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein_distance(s1, s2) as f32 / max_len as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn acct(s: &str) -> AccountName {
        AccountName::new(s).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn tx<'a>(
        narration: &'a str,
        amount: &str,
        to: Option<&'a str>,
        from: Option<&'a str>,
    ) -> CategorizableTransaction<'a> {
        CategorizableTransaction {
            narration,
            amount: dec(amount),
            to_account: to,
            from_account: from,
        }
    }

    fn number_rule(number: &str, account: &str) -> AccountNumberRule {
        AccountNumberRule {
            account_number: number.to_string(),
            account: acct(account),
        }
    }

    fn engine(numbers: Vec<AccountNumberRule>, narrations: Vec<NarrationRule>) -> Categorizer {
        Categorizer::new(CategoryRules {
            account_number_rules: numbers,
            narration_rules: narrations,
            ..CategoryRules::default()
        })
        .unwrap()
    }

    #[test]
    fn direction_from_sign() {
        assert_eq!(Direction::of(dec("-1")), Direction::Outgoing);
        assert_eq!(Direction::of(dec("1")), Direction::Incoming);
        assert_eq!(Direction::of(Decimal::ZERO), Direction::Outgoing);
    }

    #[test]
    fn account_number_beats_narration() {
        let c = engine(
            vec![number_rule("9871.23.45678", "Assets:Bank:Savings")],
            vec![NarrationRule::contains("Overføring", acct("Assets:Bank:Transfer"))],
        );
        let t = tx("Overføring", "-500", Some("9871.23.45678"), None);
        let cat = c.categorize(&t);
        assert_eq!(cat.account.as_str(), "Assets:Bank:Savings");
        assert_eq!(cat.source, RuleSource::AccountNumber(0));
    }

    #[test]
    fn outgoing_consults_to_account_only() {
        let c = engine(vec![number_rule("98712345678", "Assets:Bank:Savings")], vec![]);
        // The matching number sits in the source field, which outgoing rows ignore.
        let t = tx("x", "-500", None, Some("9871.23.45678"));
        let cat = c.categorize(&t);
        assert_eq!(cat.source, RuleSource::Default);
        assert_eq!(cat.account.as_str(), DEFAULT_EXPENSE_ACCOUNT);
    }

    #[test]
    fn incoming_consults_from_account_only() {
        let c = engine(vec![number_rule("98712345678", "Assets:Bank:Savings")], vec![]);
        let hit = tx("x", "500", None, Some("9871.23.45678"));
        assert_eq!(c.categorize(&hit).source, RuleSource::AccountNumber(0));

        let miss = tx("x", "500", Some("9871.23.45678"), None);
        let cat = c.categorize(&miss);
        assert_eq!(cat.source, RuleSource::Default);
        assert_eq!(cat.account.as_str(), DEFAULT_INCOME_ACCOUNT);
    }

    #[test]
    fn zero_amount_is_outgoing() {
        let c = engine(vec![number_rule("9871.23.45678", "Assets:Bank:Savings")], vec![]);
        let hit = c.categorize(&tx("x", "0", Some("9871.23.45678"), None));
        assert_eq!(hit.source, RuleSource::AccountNumber(0));

        let miss = c.categorize(&tx("x", "0", None, Some("9871.23.45678")));
        assert_eq!(miss.source, RuleSource::Default);
        assert_eq!(miss.account.as_str(), DEFAULT_EXPENSE_ACCOUNT);
    }

    #[test]
    fn account_number_formatting_is_ignored() {
        let c = engine(vec![number_rule("9871 23 45678", "Assets:Bank:Savings")], vec![]);
        let t = tx("x", "-1", Some("98712345678"), None);
        assert_eq!(c.categorize(&t).source, RuleSource::AccountNumber(0));
    }

    #[test]
    fn first_matching_rule_wins_within_category() {
        let c = engine(
            vec![
                number_rule("45678", "Assets:Bank:First"),
                number_rule("9871.23.45678", "Assets:Bank:Second"),
            ],
            vec![
                NarrationRule::contains("KIWI", acct("Expenses:Groceries")),
                NarrationRule::contains("KIWI 505", acct("Expenses:Other")),
            ],
        );
        let by_number = c.categorize(&tx("x", "-1", Some("9871.23.45678"), None));
        assert_eq!(by_number.account.as_str(), "Assets:Bank:First");

        let by_narration = c.categorize(&tx("KIWI 505 BARCODE", "-1", None, None));
        assert_eq!(by_narration.account.as_str(), "Expenses:Groceries");
        assert_eq!(by_narration.source, RuleSource::Narration(0));
    }

    #[test]
    fn contains_is_case_sensitive_by_default() {
        let c = engine(vec![], vec![NarrationRule::contains("KIWI", acct("Expenses:Groceries"))]);
        assert_eq!(c.categorize(&tx("kiwi", "-1", None, None)).source, RuleSource::Default);

        let mut rule = NarrationRule::contains("KIWI", acct("Expenses:Groceries"));
        rule.ignore_case = true;
        let c = engine(vec![], vec![rule]);
        assert_eq!(
            c.categorize(&tx("kiwi", "-1", None, None)).source,
            RuleSource::Narration(0)
        );
    }

    #[test]
    fn exact_and_regex_matching() {
        let mut exact = NarrationRule::contains("Renter", acct("Income:Interest"));
        exact.match_type = MatchType::Exact;
        let mut regex = NarrationRule::contains(r"^(MENY|REMA) \d+", acct("Expenses:Groceries"));
        regex.match_type = MatchType::Regex;
        let c = engine(vec![], vec![exact, regex]);

        assert_eq!(c.categorize(&tx("Renter", "10", None, None)).source, RuleSource::Narration(0));
        assert_eq!(
            c.categorize(&tx("Renter og gebyr", "10", None, None)).source,
            RuleSource::Default
        );
        assert_eq!(
            c.categorize(&tx("REMA 1000 SENTRUM", "-1", None, None)).source,
            RuleSource::Narration(1)
        );
    }

    #[test]
    fn regex_honours_ignore_case() {
        let mut rule = NarrationRule::contains(r"^kiwi \d+", acct("Expenses:Groceries"));
        rule.match_type = MatchType::Regex;
        let c = engine(vec![], vec![rule.clone()]);
        assert_eq!(c.categorize(&tx("KIWI 505", "-1", None, None)).source, RuleSource::Default);

        rule.ignore_case = true;
        let c = engine(vec![], vec![rule]);
        assert_eq!(
            c.categorize(&tx("KIWI 505", "-1", None, None)).source,
            RuleSource::Narration(0)
        );
    }

    #[test]
    fn fuzzy_matching() {
        let mut rule = NarrationRule::contains("vinmonopolet", acct("Expenses:Alcohol"));
        rule.match_type = MatchType::Fuzzy { threshold: 0.8 };
        let c = engine(vec![], vec![rule]);
        assert_eq!(
            c.categorize(&tx("VINMONOPOLE", "-1", None, None)).source,
            RuleSource::Narration(0)
        );
        assert_eq!(c.categorize(&tx("KIWI", "-1", None, None)).source, RuleSource::Default);
    }

    #[test]
    fn amount_condition_uses_magnitude() {
        let mut big = NarrationRule::contains("VIPPS", acct("Expenses:Large"));
        big.amount = Some(AmountCondition {
            operator: AmountOperator::Ge,
            value: dec("1000"),
            upper: None,
        });
        let small = NarrationRule::contains("VIPPS", acct("Expenses:Small"));
        let c = engine(vec![], vec![big, small]);

        assert_eq!(c.categorize(&tx("VIPPS", "-1500", None, None)).account.as_str(), "Expenses:Large");
        assert_eq!(c.categorize(&tx("VIPPS", "-15", None, None)).account.as_str(), "Expenses:Small");
    }

    #[test]
    fn between_condition_is_inclusive() {
        let cond = AmountCondition {
            operator: AmountOperator::Between,
            value: dec("10"),
            upper: Some(dec("20")),
        };
        assert!(cond.matches(dec("-10")));
        assert!(cond.matches(dec("20")));
        assert!(!cond.matches(dec("20.01")));
    }

    #[test]
    fn between_without_upper_is_rejected() {
        let mut rule = NarrationRule::contains("X", acct("Expenses:X"));
        rule.amount = Some(AmountCondition {
            operator: AmountOperator::Between,
            value: dec("1"),
            upper: None,
        });
        let result = Categorizer::new(CategoryRules {
            narration_rules: vec![rule],
            ..CategoryRules::default()
        });
        assert!(matches!(result, Err(RuleError::MissingUpperBound { index: 0 })));
    }

    #[test]
    fn invalid_regex_is_an_error() {
        let mut rule = NarrationRule::contains("(unclosed", acct("Expenses:X"));
        rule.match_type = MatchType::Regex;
        let result = Categorizer::new(CategoryRules {
            narration_rules: vec![rule],
            ..CategoryRules::default()
        });
        assert!(matches!(result, Err(RuleError::InvalidRegex { index: 0, .. })));
    }

    #[test]
    fn empty_account_number_is_rejected() {
        let result = Categorizer::new(CategoryRules {
            account_number_rules: vec![number_rule(" . ", "Assets:Bank:X")],
            ..CategoryRules::default()
        });
        assert!(matches!(result, Err(RuleError::EmptyAccountNumber { index: 0 })));
    }

    #[test]
    fn match_type_parses_from_strings() {
        assert_eq!("regex".parse::<MatchType>().unwrap(), MatchType::Regex);
        assert_eq!(
            "fuzzy:0.75".parse::<MatchType>().unwrap(),
            MatchType::Fuzzy { threshold: 0.75 }
        );
        assert!("glob".parse::<MatchType>().is_err());
    }

    #[test]
    fn fuzzy_score_identical_is_one() {
        assert_eq!(fuzzy_score("kiwi", "kiwi"), 1.0);
        assert_eq!(fuzzy_score("", ""), 1.0);
    }
}
