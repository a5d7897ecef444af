//! Storage seams used by the ingestor and the triage engine, and the SQLite
//! backend behind them.

use std::str::FromStr;

use chrono::{Local, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{CareError, Result};
use crate::models::{
    Decision, Expense, ExpenseDraft, Location, ReviewStatus, SyncedTransaction, TransactionUpsert,
    TriageDecision,
};

pub trait TransactionStore {
    fn find_by_external_id(
        &self,
        user_id: &str,
        external_transaction_id: &str,
    ) -> Result<Option<SyncedTransaction>>;

    /// Returns `Ok(None)` when a row with the same external id already exists.
    fn insert_transaction(&mut self, row: &TransactionUpsert) -> Result<Option<i64>>;

    /// Overwrites provider-owned fields only; review state is left untouched.
    fn update_synced_fields(&mut self, id: i64, row: &TransactionUpsert) -> Result<()>;

    fn get_transaction(&self, user_id: &str, id: i64) -> Result<Option<SyncedTransaction>>;

    fn list_transactions(&self, user_id: &str) -> Result<Vec<SyncedTransaction>>;

    fn fetch_pending_transactions(&self, user_id: &str, limit: usize) -> Result<Vec<SyncedTransaction>>;

    /// Moves a pending transaction to the decision's terminal status and logs it.
    fn persist_decision(&mut self, user_id: &str, transaction_id: i64, decision: Decision) -> Result<()>;

    /// `persist_decision(Keep)` plus the link to the created expense.
    fn mark_transaction_kept(&mut self, user_id: &str, transaction_id: i64, expense_id: i64) -> Result<()>;

    /// Back to pending: clears the expense link and the decision log entry.
    fn reset_transaction(&mut self, user_id: &str, transaction_id: i64) -> Result<()>;

    /// Oldest first, in write order.
    fn list_decisions(&self, user_id: &str) -> Result<Vec<TriageDecision>>;
}

pub trait ExpenseStore {
    fn create_expense(&mut self, draft: &ExpenseDraft) -> Result<Expense>;

    fn get_expense(&self, user_id: &str, id: i64) -> Result<Option<Expense>>;

    fn find_expense_by_transaction(&self, user_id: &str, transaction_id: i64) -> Result<Option<Expense>>;

    fn delete_expense(&mut self, user_id: &str, id: i64) -> Result<()>;

    fn list_expenses(&self, user_id: &str) -> Result<Vec<Expense>>;
}

pub trait TriageStore: TransactionStore + ExpenseStore {
    /// Run `f` as one unit. Backends without transactions run it as-is and
    /// rely on the caller's compensating actions.
    fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
        Self: Sized,
    {
        f(self)
    }
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn review_status(&self, user_id: &str, transaction_id: i64) -> Result<ReviewStatus> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT review_status FROM synced_transactions WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![transaction_id, user_id],
                |r| r.get(0),
            )
            .optional()?;
        match status {
            Some(s) => s.parse(),
            None => Err(CareError::NotFound(format!("transaction {transaction_id}"))),
        }
    }

    /// Conditional pending -> decided write; distinguishes a missing row from
    /// one that was already decided.
    fn decide(
        &self,
        user_id: &str,
        transaction_id: i64,
        decision: Decision,
        expense_id: Option<i64>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE synced_transactions \
             SET review_status = ?1, matched_expense_id = ?2, is_confirmed_medical = ?3, \
                 updated_at = datetime('now') \
             WHERE id = ?4 AND user_id = ?5 AND review_status = 'pending'",
            rusqlite::params![
                decision.status().key(),
                expense_id,
                decision == Decision::Keep,
                transaction_id,
                user_id
            ],
        )?;
        if changed == 0 {
            let status = self.review_status(user_id, transaction_id)?;
            return Err(CareError::AlreadyDecided {
                transaction_id,
                status,
            });
        }
        self.conn.execute(
            "INSERT INTO triage_decisions (user_id, transaction_id, decision, expense_id, decided_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(transaction_id) DO UPDATE SET decision = excluded.decision, \
                 expense_id = excluded.expense_id, decided_at = excluded.decided_at",
            rusqlite::params![
                user_id,
                transaction_id,
                decision.key(),
                expense_id,
                Local::now().naive_local()
            ],
        )?;
        Ok(())
    }
}

pub(crate) fn parse_col<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn json_col<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

const TXN_COLUMNS: &str = "id, user_id, account_id, external_transaction_id, amount, currency_code, \
     date, authorized_date, description, merchant_name, category, subcategory, payment_channel, \
     pending, location, is_refund, is_potential_medical, is_confirmed_medical, suggested_category, \
     review_status, matched_expense_id";

fn txn_from_row(row: &Row) -> rusqlite::Result<SyncedTransaction> {
    Ok(SyncedTransaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        external_transaction_id: row.get(3)?,
        amount: parse_col(row, 4)?,
        currency_code: row.get(5)?,
        date: row.get(6)?,
        authorized_date: row.get(7)?,
        description: row.get(8)?,
        merchant_name: row.get(9)?,
        category: row.get(10)?,
        subcategory: row.get(11)?,
        payment_channel: row.get(12)?,
        pending: row.get(13)?,
        location: json_col::<Location>(row, 14)?,
        is_refund: row.get(15)?,
        is_potential_medical: row.get(16)?,
        is_confirmed_medical: row.get(17)?,
        suggested_category: parse_col(row, 18)?,
        review_status: parse_col(row, 19)?,
        matched_expense_id: row.get(20)?,
    })
}

const EXPENSE_COLUMNS: &str = "id, user_id, amount, date, category, subcategory, vendor, description, \
     notes, care_recipient_id, receipt_refs, is_tax_deductible, is_reimbursed, reimbursement_source, \
     source_transaction_id";

fn expense_from_row(row: &Row) -> rusqlite::Result<Expense> {
    Ok(Expense {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: parse_col(row, 2)?,
        date: row.get(3)?,
        category: parse_col(row, 4)?,
        subcategory: row.get(5)?,
        vendor: row.get(6)?,
        description: row.get(7)?,
        notes: row.get(8)?,
        care_recipient_id: row.get(9)?,
        receipt_refs: json_col::<Vec<String>>(row, 10)?.unwrap_or_default(),
        is_tax_deductible: row.get(11)?,
        is_reimbursed: row.get(12)?,
        reimbursement_source: row.get(13)?,
        source_transaction_id: row.get(14)?,
    })
}

impl TransactionStore for SqliteStore<'_> {
    fn find_by_external_id(
        &self,
        user_id: &str,
        external_transaction_id: &str,
    ) -> Result<Option<SyncedTransaction>> {
        let sql = format!(
            "SELECT {TXN_COLUMNS} FROM synced_transactions \
             WHERE user_id = ?1 AND external_transaction_id = ?2"
        );
        Ok(self
            .conn
            .query_row(&sql, [user_id, external_transaction_id], txn_from_row)
            .optional()?)
    }

    fn insert_transaction(&mut self, row: &TransactionUpsert) -> Result<Option<i64>> {
        let location = row.location.as_ref().map(to_json).transpose()?;
        let changed = self.conn.execute(
            "INSERT INTO synced_transactions (user_id, account_id, external_transaction_id, amount, \
                 currency_code, date, authorized_date, description, merchant_name, category, \
                 subcategory, payment_channel, pending, location, is_refund, is_potential_medical, \
                 suggested_category, review_status) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, 'pending') \
             ON CONFLICT(user_id, external_transaction_id) DO NOTHING",
            rusqlite::params![
                row.user_id,
                row.account_id,
                row.external_transaction_id,
                row.amount.to_string(),
                row.currency_code,
                row.date,
                row.authorized_date,
                row.description,
                row.merchant_name,
                row.category,
                row.subcategory,
                row.payment_channel,
                row.pending,
                location,
                row.is_refund,
                row.is_potential_medical,
                row.suggested_category.key(),
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(self.conn.last_insert_rowid()))
    }

    fn update_synced_fields(&mut self, id: i64, row: &TransactionUpsert) -> Result<()> {
        let location = row.location.as_ref().map(to_json).transpose()?;
        let changed = self.conn.execute(
            "UPDATE synced_transactions SET account_id = ?1, amount = ?2, currency_code = ?3, \
                 date = ?4, authorized_date = ?5, description = ?6, merchant_name = ?7, \
                 category = ?8, subcategory = ?9, payment_channel = ?10, pending = ?11, \
                 location = ?12, is_refund = ?13, is_potential_medical = ?14, \
                 suggested_category = ?15, updated_at = datetime('now') \
             WHERE id = ?16 AND user_id = ?17",
            rusqlite::params![
                row.account_id,
                row.amount.to_string(),
                row.currency_code,
                row.date,
                row.authorized_date,
                row.description,
                row.merchant_name,
                row.category,
                row.subcategory,
                row.payment_channel,
                row.pending,
                location,
                row.is_refund,
                row.is_potential_medical,
                row.suggested_category.key(),
                id,
                row.user_id,
            ],
        )?;
        if changed == 0 {
            return Err(CareError::NotFound(format!("transaction {id}")));
        }
        Ok(())
    }

    fn get_transaction(&self, user_id: &str, id: i64) -> Result<Option<SyncedTransaction>> {
        let sql = format!("SELECT {TXN_COLUMNS} FROM synced_transactions WHERE id = ?1 AND user_id = ?2");
        Ok(self
            .conn
            .query_row(&sql, rusqlite::params![id, user_id], txn_from_row)
            .optional()?)
    }

    fn list_transactions(&self, user_id: &str) -> Result<Vec<SyncedTransaction>> {
        let sql = format!(
            "SELECT {TXN_COLUMNS} FROM synced_transactions WHERE user_id = ?1 ORDER BY date, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([user_id], txn_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn fetch_pending_transactions(&self, user_id: &str, limit: usize) -> Result<Vec<SyncedTransaction>> {
        let sql = format!(
            "SELECT {TXN_COLUMNS} FROM synced_transactions \
             WHERE user_id = ?1 AND review_status = 'pending' \
             ORDER BY is_potential_medical DESC, date DESC, id LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params![user_id, limit as i64], txn_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn persist_decision(&mut self, user_id: &str, transaction_id: i64, decision: Decision) -> Result<()> {
        self.decide(user_id, transaction_id, decision, None)
    }

    fn mark_transaction_kept(&mut self, user_id: &str, transaction_id: i64, expense_id: i64) -> Result<()> {
        self.decide(user_id, transaction_id, Decision::Keep, Some(expense_id))
    }

    fn reset_transaction(&mut self, user_id: &str, transaction_id: i64) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE synced_transactions \
             SET review_status = 'pending', matched_expense_id = NULL, is_confirmed_medical = 0, \
                 updated_at = datetime('now') \
             WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![transaction_id, user_id],
        )?;
        if changed == 0 {
            return Err(CareError::NotFound(format!("transaction {transaction_id}")));
        }
        self.conn.execute(
            "DELETE FROM triage_decisions WHERE transaction_id = ?1 AND user_id = ?2",
            rusqlite::params![transaction_id, user_id],
        )?;
        Ok(())
    }

    fn list_decisions(&self, user_id: &str) -> Result<Vec<TriageDecision>> {
        let mut stmt = self.conn.prepare(
            "SELECT transaction_id, decision, expense_id, decided_at FROM triage_decisions \
             WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([user_id], |row| {
                Ok(TriageDecision {
                    transaction_id: row.get(0)?,
                    decision: parse_col(row, 1)?,
                    expense_id: row.get(2)?,
                    decided_at: row.get::<_, NaiveDateTime>(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl ExpenseStore for SqliteStore<'_> {
    fn create_expense(&mut self, draft: &ExpenseDraft) -> Result<Expense> {
        draft.validate()?;
        let receipts = to_json(&draft.receipt_refs)?;
        self.conn.execute(
            "INSERT INTO expenses (user_id, amount, date, category, subcategory, vendor, description, \
                 notes, care_recipient_id, receipt_refs, is_tax_deductible, is_reimbursed, \
                 reimbursement_source, source_transaction_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            rusqlite::params![
                draft.user_id,
                draft.amount.to_string(),
                draft.date,
                draft.category.key(),
                draft.subcategory,
                draft.vendor,
                draft.description,
                draft.notes,
                draft.care_recipient_id,
                receipts,
                draft.is_tax_deductible,
                draft.is_reimbursed,
                draft.reimbursement_source,
                draft.source_transaction_id,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_expense(&draft.user_id, id)?
            .ok_or_else(|| CareError::NotFound(format!("expense {id}")))
    }

    fn get_expense(&self, user_id: &str, id: i64) -> Result<Option<Expense>> {
        let sql = format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?1 AND user_id = ?2");
        Ok(self
            .conn
            .query_row(&sql, rusqlite::params![id, user_id], expense_from_row)
            .optional()?)
    }

    fn find_expense_by_transaction(&self, user_id: &str, transaction_id: i64) -> Result<Option<Expense>> {
        let sql = format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses \
             WHERE source_transaction_id = ?1 AND user_id = ?2 ORDER BY id LIMIT 1"
        );
        Ok(self
            .conn
            .query_row(&sql, rusqlite::params![transaction_id, user_id], expense_from_row)
            .optional()?)
    }

    fn delete_expense(&mut self, user_id: &str, id: i64) -> Result<()> {
        let changed = self.conn.execute(
            "DELETE FROM expenses WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![id, user_id],
        )?;
        if changed == 0 {
            return Err(CareError::NotFound(format!("expense {id}")));
        }
        Ok(())
    }

    fn list_expenses(&self, user_id: &str) -> Result<Vec<Expense>> {
        let sql = format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE user_id = ?1 ORDER BY date, id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([user_id], expense_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl TriageStore for SqliteStore<'_> {
    fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
        Self: Sized,
    {
        // Already inside a caller's transaction: join it.
        if !self.conn.is_autocommit() {
            return f(self);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    log::error!("rollback failed after '{e}': {rollback}");
                }
                Err(e)
            }
        }
    }
}
