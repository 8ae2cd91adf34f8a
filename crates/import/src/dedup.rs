use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use sparebank1_core::{AccountName, Directive, Transaction};
use std::collections::{BTreeMap, BTreeSet};

/// Decides whether a freshly imported entry is the same as an existing one.
pub trait SimilarityComparator {
    fn similar(&self, new: &Directive, existing: &Directive) -> bool;
}

/// Date and amount heuristic for spotting re-imported transactions.
///
/// Two transactions are similar when their dates are at most `max_date_delta`
/// apart and at least one asset or liability account they share moved by
/// amounts whose relative difference is at most `epsilon`.
#[derive(Debug, Clone)]
pub struct HeuristicComparator {
    pub max_date_delta: Option<Duration>,
    pub epsilon: Decimal,
    /// Also require one entry's accounts to be a subset of the other's.
    pub require_account_subset: bool,
}

impl Default for HeuristicComparator {
    fn default() -> Self {
        Self {
            max_date_delta: Some(Duration::days(2)),
            epsilon: Decimal::new(5, 2),
            require_account_subset: false,
        }
    }
}

impl HeuristicComparator {
    pub fn new(max_date_delta: Option<Duration>, epsilon: Decimal) -> Self {
        Self {
            max_date_delta,
            epsilon,
            require_account_subset: false,
        }
    }

    fn close_amounts(&self, a: Decimal, b: Decimal) -> bool {
        if a.is_zero() && b.is_zero() {
            return true;
        }
        if a.is_zero() || b.is_zero() || a.is_sign_negative() != b.is_sign_negative() {
            return false;
        }
        let (a, b) = (a.abs(), b.abs());
        let (big, small) = if a >= b { (a, b) } else { (b, a) };
        big / small - Decimal::ONE <= self.epsilon
    }

    fn similar_transactions(&self, t1: &Transaction, t2: &Transaction) -> bool {
        if let Some(delta) = self.max_date_delta {
            if (t1.date - t2.date).num_days().abs() > delta.num_days() {
                return false;
            }
        }

        let amounts1 = amounts_map(t1);
        let amounts2 = amounts_map(t2);
        let any_close = amounts1.iter().any(|(key, &n1)| {
            amounts2
                .get(key)
                .is_some_and(|&n2| self.close_amounts(n1, n2))
        });
        if !any_close {
            return false;
        }

        if self.require_account_subset {
            let accounts1: BTreeSet<&AccountName> = t1.postings.iter().map(|p| &p.account).collect();
            let accounts2: BTreeSet<&AccountName> = t2.postings.iter().map(|p| &p.account).collect();
            return accounts1.is_subset(&accounts2) || accounts2.is_subset(&accounts1);
        }
        true
    }
}

impl SimilarityComparator for HeuristicComparator {
    fn similar(&self, new: &Directive, existing: &Directive) -> bool {
        match (new.as_transaction(), existing.as_transaction()) {
            (Some(t1), Some(t2)) => self.similar_transactions(t1, t2),
            _ => false,
        }
    }
}

/// Net movement per (account, currency), for balance sheet accounts only.
fn amounts_map(tx: &Transaction) -> BTreeMap<(&AccountName, &str), Decimal> {
    let mut map = BTreeMap::new();
    for posting in &tx.postings {
        if !posting.account.account_type().is_balance_sheet() {
            continue;
        }
        if let Some(units) = &posting.units {
            *map.entry((&posting.account, units.currency.as_str()))
                .or_insert(Decimal::ZERO) += units.number;
        }
    }
    map
}

/// Marks every new entry that has a similar existing entry dated within
/// `window` days of it. Returns how many were marked.
pub fn mark_duplicate_entries<C: SimilarityComparator>(
    entries: &mut [Directive],
    existing: &[Directive],
    window: Duration,
    comparator: &C,
) -> usize {
    let mut sorted: Vec<&Directive> = existing.iter().collect();
    sorted.sort_by_key(|d| d.date());

    let mut marked = 0;
    for entry in entries.iter_mut() {
        let date = entry.date();
        let (lo, hi) = window_bounds(date, window);
        let start = sorted.partition_point(|d| d.date() < lo);

        let current: &Directive = entry;
        let hit = sorted[start..]
            .iter()
            .take_while(|d| d.date() <= hi)
            .find(|d| comparator.similar(current, d));

        if let Some(found) = hit {
            tracing::debug!(
                date = %date,
                existing_date = %found.date(),
                "marking duplicate entry"
            );
            entry.mark_duplicate();
            marked += 1;
        }
    }
    marked
}

fn window_bounds(date: NaiveDate, window: Duration) -> (NaiveDate, NaiveDate) {
    let lo = date.checked_sub_signed(window).unwrap_or(NaiveDate::MIN);
    let hi = date.checked_add_signed(window).unwrap_or(NaiveDate::MAX);
    (lo, hi)
}
