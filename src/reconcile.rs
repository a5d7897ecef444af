//! Repair pass for the expense <-> transaction link.
//!
//! An expense created by triage carries `source_transaction_id`; its transaction
//! must be `kept` with `matched_expense_id` pointing back. A crashed or
//! uncompensated keep/undo can leave either half behind.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::models::ReviewStatus;
use crate::store::TriageStore;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// (expense id, transaction id) pairs whose link was completed.
    pub linked: Vec<(i64, i64)>,
    pub removed_orphans: Vec<i64>,
    pub reset_transactions: Vec<i64>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.linked.is_empty() && self.removed_orphans.is_empty() && self.reset_transactions.is_empty()
    }
}

pub fn reconcile_links<S: TriageStore>(store: &mut S, user_id: &str) -> Result<ReconcileReport> {
    store.atomically(|store| {
        let mut report = ReconcileReport::default();
        let mut transactions: HashMap<i64, _> = store
            .list_transactions(user_id)?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();
        let expenses = store.list_expenses(user_id)?;
        let mut live_expenses: HashSet<i64> = expenses.iter().map(|e| e.id).collect();

        for expense in &expenses {
            let Some(txn_id) = expense.source_transaction_id else {
                continue;
            };
            // Source transaction no longer synced; the expense stands alone.
            let Some(txn) = transactions.get_mut(&txn_id) else {
                continue;
            };
            match txn.review_status {
                ReviewStatus::Kept if txn.matched_expense_id == Some(expense.id) => {}
                ReviewStatus::Pending => {
                    store.mark_transaction_kept(user_id, txn_id, expense.id)?;
                    txn.review_status = ReviewStatus::Kept;
                    txn.matched_expense_id = Some(expense.id);
                    log::info!("linked expense {} to transaction {txn_id}", expense.id);
                    report.linked.push((expense.id, txn_id));
                }
                _ => {
                    store.delete_expense(user_id, expense.id)?;
                    live_expenses.remove(&expense.id);
                    log::info!("removed orphan expense {} (transaction {txn_id})", expense.id);
                    report.removed_orphans.push(expense.id);
                }
            }
        }

        let mut dangling: Vec<i64> = transactions
            .values()
            .filter(|t| t.review_status == ReviewStatus::Kept)
            .filter(|t| !t.matched_expense_id.is_some_and(|id| live_expenses.contains(&id)))
            .map(|t| t.id)
            .collect();
        dangling.sort_unstable();
        for txn_id in dangling {
            store.reset_transaction(user_id, txn_id)?;
            log::info!("reset transaction {txn_id}: its expense is gone");
            report.reset_transactions.push(txn_id);
        }

        Ok(report)
    })
}
