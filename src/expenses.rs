//! User-facing expense operations. Triage creates expenses through the store
//! directly; this module covers manual entry and deletion.

use chrono::Datelike;
use rusqlite::Connection;

use crate::error::{CareError, Result};
use crate::models::{Expense, ExpenseDraft, ReviewStatus};
use crate::recipients;
use crate::store::{ExpenseStore, SqliteStore, TransactionStore, TriageStore};

pub fn add(conn: &Connection, draft: &ExpenseDraft) -> Result<Expense> {
    draft.validate()?;
    if let Some(recipient_id) = draft.care_recipient_id {
        recipients::get(conn, &draft.user_id, recipient_id)?;
    }
    let expense = SqliteStore::new(conn).create_expense(draft)?;
    log::debug!("added expense {} ({})", expense.id, expense.amount);
    Ok(expense)
}

/// Newest first, optionally limited to one calendar year.
pub fn list(conn: &Connection, user_id: &str, year: Option<i32>) -> Result<Vec<Expense>> {
    let mut expenses = SqliteStore::new(conn).list_expenses(user_id)?;
    if let Some(year) = year {
        expenses.retain(|e| e.date.year() == year);
    }
    expenses.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
    Ok(expenses)
}

/// Delete an expense. When triage created it, the source transaction goes back
/// to pending so it can be reviewed again; returns that transaction's id.
pub fn delete(conn: &Connection, user_id: &str, id: i64) -> Result<Option<i64>> {
    delete_with(&mut SqliteStore::new(conn), user_id, id)
}

pub(crate) fn delete_with<S: TriageStore>(store: &mut S, user_id: &str, id: i64) -> Result<Option<i64>> {
    store.atomically(|store| {
        let expense = store
            .get_expense(user_id, id)?
            .ok_or_else(|| CareError::NotFound(format!("expense {id}")))?;
        store.delete_expense(user_id, id)?;

        let Some(txn_id) = expense.source_transaction_id else {
            return Ok(None);
        };
        match store.get_transaction(user_id, txn_id)? {
            Some(txn) if txn.review_status == ReviewStatus::Kept && txn.matched_expense_id == Some(id) => {
                store.reset_transaction(user_id, txn_id)?;
                log::info!("transaction {txn_id} back in the review queue");
                Ok(Some(txn_id))
            }
            _ => Ok(None),
        }
    })
}
