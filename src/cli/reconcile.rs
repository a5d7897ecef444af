use crate::error::Result;
use crate::reconcile::reconcile_links;
use crate::store::SqliteStore;

use super::open_db;

pub fn run() -> Result<()> {
    let (settings, conn) = open_db()?;
    let report = reconcile_links(&mut SqliteStore::new(&conn), &settings.user_id)?;

    if report.is_clean() {
        println!("Expenses and transactions are consistent.");
        return Ok(());
    }
    for (expense_id, txn_id) in &report.linked {
        println!("Linked expense {expense_id} to transaction {txn_id}");
    }
    for expense_id in &report.removed_orphans {
        println!("Removed orphan expense {expense_id}");
    }
    for txn_id in &report.reset_transactions {
        println!("Returned transaction {txn_id} to review");
    }
    Ok(())
}
