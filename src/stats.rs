//! Aggregate statistics derived from the expense collection. Nothing here is
//! persisted; callers recompute whenever they need a fresh view.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use crate::models::{Expense, ExpenseCategory, ReviewStatus, SyncedTransaction, TriageDecision};

/// IRS floor for deductible medical expenses, as a fraction of AGI.
pub const AGI_FLOOR_RATE: Decimal = Decimal::from_parts(75, 0, 0, false, 3);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub count: usize,
    pub amount: Decimal,
}

impl Tally {
    fn add(&mut self, amount: Decimal) {
        self.count += 1;
        self.amount += amount;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseStats {
    pub total: Tally,
    pub deductible: Tally,
    pub this_month: Tally,
    pub this_year: Tally,
    pub this_year_deductible: Tally,
    pub manual: usize,
    pub imported: usize,
    pub by_category: BTreeMap<ExpenseCategory, Tally>,
}

impl ExpenseStats {
    pub fn compute(expenses: &[Expense], today: NaiveDate) -> Self {
        let mut stats = Self::default();
        for e in expenses {
            stats.total.add(e.amount);
            stats.by_category.entry(e.category).or_default().add(e.amount);
            if e.is_tax_deductible {
                stats.deductible.add(e.amount);
            }
            if e.date.year() == today.year() {
                stats.this_year.add(e.amount);
                if e.is_tax_deductible {
                    stats.this_year_deductible.add(e.amount);
                }
                if e.date.month() == today.month() {
                    stats.this_month.add(e.amount);
                }
            }
            if e.is_imported() {
                stats.imported += 1;
            } else {
                stats.manual += 1;
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaxProgress {
    pub threshold: Decimal,
    pub tracked: Decimal,
    /// 0 to 100.
    pub percent: Decimal,
    pub unlocked: Decimal,
}

impl TaxProgress {
    /// A missing or non-positive AGI yields a zero threshold and 0% progress.
    pub fn compute(household_agi: Option<Decimal>, tracked: Decimal) -> Self {
        let threshold = match household_agi {
            Some(agi) if agi > Decimal::ZERO => agi * AGI_FLOOR_RATE,
            _ => Decimal::ZERO,
        };
        if threshold.is_zero() {
            return Self {
                threshold,
                tracked,
                ..Self::default()
            };
        }
        let percent = (tracked / threshold * Decimal::ONE_HUNDRED)
            .min(Decimal::ONE_HUNDRED)
            .max(Decimal::ZERO);
        Self {
            threshold,
            tracked,
            percent,
            unlocked: (tracked - threshold).max(Decimal::ZERO),
        }
    }

    pub fn from_stats(household_agi: Option<Decimal>, stats: &ExpenseStats) -> Self {
        Self::compute(household_agi, stats.this_year_deductible.amount)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriageBreakdown {
    pub pending: usize,
    pub kept: usize,
    pub skipped: usize,
    pub potential_medical_pending: usize,
}

impl TriageBreakdown {
    pub fn from_transactions(transactions: &[SyncedTransaction]) -> Self {
        let mut breakdown = Self::default();
        for t in transactions {
            match t.review_status {
                ReviewStatus::Pending => {
                    breakdown.pending += 1;
                    if t.is_potential_medical {
                        breakdown.potential_medical_pending += 1;
                    }
                }
                ReviewStatus::Kept => breakdown.kept += 1,
                ReviewStatus::Skipped => breakdown.skipped += 1,
            }
        }
        breakdown
    }

    pub fn total(&self) -> usize {
        self.pending + self.kept + self.skipped
    }
}

/// Decisions logged on `day`, net of anything since undone.
pub fn reviewed_on(decisions: &[TriageDecision], day: NaiveDate) -> usize {
    decisions.iter().filter(|d| d.decided_at.date() == day).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decision;

    fn expense(id: i64, dollars: i64, date: NaiveDate, deductible: bool) -> Expense {
        Expense {
            id,
            user_id: "u1".to_string(),
            amount: Decimal::new(dollars, 0),
            date,
            category: ExpenseCategory::Medical,
            subcategory: None,
            vendor: None,
            description: None,
            notes: None,
            care_recipient_id: None,
            receipt_refs: Vec::new(),
            is_tax_deductible: deductible,
            is_reimbursed: false,
            reimbursement_source: None,
            source_transaction_id: None,
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_aggregator_totals() {
        let today = ymd(2025, 6, 15);
        let mut pharmacy = expense(3, 400, ymd(2024, 11, 2), true);
        pharmacy.category = ExpenseCategory::Pharmacy;
        pharmacy.source_transaction_id = Some(9);
        let expenses = vec![
            expense(1, 100, ymd(2025, 6, 3), false),
            expense(2, 250, ymd(2025, 2, 10), true),
            pharmacy,
        ];

        let stats = ExpenseStats::compute(&expenses, today);
        assert_eq!(stats.total.count, 3);
        assert_eq!(stats.total.amount, Decimal::new(750, 0));
        assert_eq!(stats.deductible, Tally { count: 2, amount: Decimal::new(650, 0) });
        assert_eq!(stats.this_month, Tally { count: 1, amount: Decimal::new(100, 0) });
        assert_eq!(stats.this_year.amount, Decimal::new(350, 0));
        assert_eq!(stats.this_year_deductible.amount, Decimal::new(250, 0));
        assert_eq!(stats.manual, 2);
        assert_eq!(stats.imported, 1);
        assert_eq!(stats.by_category[&ExpenseCategory::Pharmacy].count, 1);
        assert_eq!(stats.by_category[&ExpenseCategory::Medical].amount, Decimal::new(350, 0));
    }

    #[test]
    fn test_same_month_other_year_not_counted() {
        let stats = ExpenseStats::compute(&[expense(1, 80, ymd(2024, 6, 3), true)], ymd(2025, 6, 20));
        assert_eq!(stats.this_month.count, 0);
        assert_eq!(stats.this_year.count, 0);
        assert_eq!(stats.deductible.count, 1);
    }

    #[test]
    fn test_empty_collection() {
        let stats = ExpenseStats::compute(&[], ymd(2025, 1, 1));
        assert_eq!(stats, ExpenseStats::default());
        assert_eq!(TaxProgress::from_stats(Some(Decimal::new(50_000, 0)), &stats).percent, Decimal::ZERO);
    }

    #[test]
    fn test_tax_progress_at_threshold() {
        let p = TaxProgress::compute(Some(Decimal::new(80_000, 0)), Decimal::new(6_000, 0));
        assert_eq!(p.threshold, Decimal::new(6_000, 0));
        assert_eq!(p.percent, Decimal::ONE_HUNDRED);
        assert_eq!(p.unlocked, Decimal::ZERO);
    }

    #[test]
    fn test_tax_progress_above_threshold() {
        let p = TaxProgress::compute(Some(Decimal::new(80_000, 0)), Decimal::new(9_000, 0));
        assert_eq!(p.percent, Decimal::ONE_HUNDRED);
        assert_eq!(p.unlocked, Decimal::new(3_000, 0));
    }

    #[test]
    fn test_tax_progress_partial() {
        let p = TaxProgress::compute(Some(Decimal::new(80_000, 0)), Decimal::new(1_500, 0));
        assert_eq!(p.percent, Decimal::new(25, 0));
        assert_eq!(p.unlocked, Decimal::ZERO);
    }

    #[test]
    fn test_tax_progress_without_agi() {
        for agi in [None, Some(Decimal::ZERO), Some(Decimal::new(-10, 0))] {
            let p = TaxProgress::compute(agi, Decimal::new(1_200, 0));
            assert_eq!(p.threshold, Decimal::ZERO);
            assert_eq!(p.percent, Decimal::ZERO);
            assert_eq!(p.unlocked, Decimal::ZERO);
            assert_eq!(p.tracked, Decimal::new(1_200, 0));
        }
    }

    #[test]
    fn test_reviewed_on_counts_only_that_day() {
        let at = |d: u32, h: u32| ymd(2025, 3, d).and_hms_opt(h, 0, 0).unwrap();
        let decisions = vec![
            TriageDecision { transaction_id: 1, decision: Decision::Keep, expense_id: Some(4), decided_at: at(4, 9) },
            TriageDecision { transaction_id: 2, decision: Decision::Skip, expense_id: None, decided_at: at(4, 23) },
            TriageDecision { transaction_id: 3, decision: Decision::Skip, expense_id: None, decided_at: at(5, 0) },
        ];
        assert_eq!(reviewed_on(&decisions, ymd(2025, 3, 4)), 2);
        assert_eq!(reviewed_on(&decisions, ymd(2025, 3, 6)), 0);
    }
}
