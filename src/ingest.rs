//! Idempotent upsert of provider transactions keyed on the provider's id.
//!
//! Sync owns the provider fields only. Review status, the expense link and the
//! confirmed flag belong to triage and are never written here, so re-running a
//! batch can't undo a human decision.

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::classifier::Classifier;
use crate::error::{CareError, Result};
use crate::models::{RawProviderTransaction, TransactionUpsert};
use crate::store::TransactionStore;

const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, PartialEq)]
pub struct RowIssue {
    pub index: usize,
    pub external_transaction_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestSummary {
    pub inserted: usize,
    pub updated: usize,
    pub invalid: usize,
    pub failed: usize,
    pub issues: Vec<RowIssue>,
}

impl IngestSummary {
    pub fn processed(&self) -> usize {
        self.inserted + self.updated
    }
}

fn parse_iso_date(field: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CareError::Validation(format!("{field} '{raw}' is not a YYYY-MM-DD date")))
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Validate a provider row and turn it into the normalized, classified form.
pub fn prepare(
    user_id: &str,
    account_id: Option<i64>,
    raw: &RawProviderTransaction,
    classifier: &Classifier,
) -> Result<TransactionUpsert> {
    let external_transaction_id = non_blank(&raw.external_transaction_id)
        .ok_or_else(|| CareError::Validation("missing externalTransactionId".to_string()))?;
    let amount_signed = raw
        .amount_signed
        .ok_or_else(|| CareError::Validation("missing amountSigned".to_string()))?;
    let date = match raw.date.as_deref() {
        Some(d) => parse_iso_date("date", d)?,
        None => return Err(CareError::Validation("missing date".to_string())),
    };
    let authorized_date = raw
        .authorized_date
        .as_deref()
        .map(|d| parse_iso_date("authorizedDate", d))
        .transpose()?;

    let merchant_name = non_blank(&raw.merchant_name);
    let description = match (raw.name.trim(), merchant_name.as_deref()) {
        ("", Some(m)) => m.to_string(),
        ("", None) => return Err(CareError::Validation("missing name".to_string())),
        (name, _) => name.to_string(),
    };
    let category = non_blank(&raw.category);
    let subcategory = non_blank(&raw.subcategory);

    let hint = match (category.as_deref(), subcategory.as_deref()) {
        (Some(c), Some(s)) => Some(format!("{c} {s}")),
        (Some(c), None) => Some(c.to_string()),
        (None, Some(s)) => Some(s.to_string()),
        (None, None) => None,
    };
    let classification = classifier.classify(&description, merchant_name.as_deref(), hint.as_deref());

    Ok(TransactionUpsert {
        user_id: user_id.to_string(),
        account_id,
        external_transaction_id,
        amount: amount_signed.abs(),
        currency_code: non_blank(&raw.currency_code)
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        date,
        authorized_date,
        description,
        merchant_name,
        category,
        subcategory,
        payment_channel: non_blank(&raw.payment_channel),
        pending: raw.pending,
        location: raw.location.clone(),
        is_refund: amount_signed < Decimal::ZERO,
        is_potential_medical: classification.is_potential_medical,
        suggested_category: classification.suggested_category,
    })
}

enum Outcome {
    Inserted,
    Updated,
}

fn upsert<S: TransactionStore>(store: &mut S, row: &TransactionUpsert) -> Result<Outcome> {
    if let Some(existing) = store.find_by_external_id(&row.user_id, &row.external_transaction_id)? {
        store.update_synced_fields(existing.id, row)?;
        return Ok(Outcome::Updated);
    }
    match store.insert_transaction(row)? {
        Some(_) => Ok(Outcome::Inserted),
        // Lost a race with another writer for the same id: take the update path.
        None => {
            let existing = store
                .find_by_external_id(&row.user_id, &row.external_transaction_id)?
                .ok_or_else(|| CareError::NotFound(row.external_transaction_id.clone()))?;
            store.update_synced_fields(existing.id, row)?;
            Ok(Outcome::Updated)
        }
    }
}

/// Ingest one provider batch for one user/account, in order.
///
/// Invalid and failing rows are counted and reported; the rest of the batch
/// still goes through. A `Dependency` error means the backend is gone and is
/// returned as-is.
pub fn ingest<S: TransactionStore>(
    store: &mut S,
    user_id: &str,
    account_id: Option<i64>,
    batch: &[RawProviderTransaction],
    classifier: &Classifier,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();

    for (index, raw) in batch.iter().enumerate() {
        let row = match prepare(user_id, account_id, raw, classifier) {
            Ok(row) => row,
            Err(e) => {
                log::warn!("skipping provider row {index}: {e}");
                summary.invalid += 1;
                summary.issues.push(RowIssue {
                    index,
                    external_transaction_id: raw.external_transaction_id.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        match upsert(store, &row) {
            Ok(Outcome::Inserted) => summary.inserted += 1,
            Ok(Outcome::Updated) => summary.updated += 1,
            Err(e @ CareError::Dependency(_)) => return Err(e),
            Err(e) => {
                log::warn!("failed to store {}: {e}", row.external_transaction_id);
                summary.failed += 1;
                summary.issues.push(RowIssue {
                    index,
                    external_transaction_id: Some(row.external_transaction_id.clone()),
                    reason: e.to_string(),
                });
            }
        }
    }

    log::info!(
        "ingested {} rows for {user_id}: {} inserted, {} updated, {} invalid, {} failed",
        batch.len(),
        summary.inserted,
        summary.updated,
        summary.invalid,
        summary.failed
    );
    Ok(summary)
}

pub fn payload_checksum(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// Audit row for a sync batch; also stamps the account's last sync time.
pub fn record_sync_run(
    conn: &Connection,
    user_id: &str,
    account_id: Option<i64>,
    checksum: &str,
    summary: &IngestSummary,
) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_runs (user_id, account_id, checksum, inserted, updated, invalid, failed) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            user_id,
            account_id,
            checksum,
            summary.inserted as i64,
            summary.updated as i64,
            summary.invalid as i64,
            summary.failed as i64,
        ],
    )?;
    if let Some(id) = account_id {
        conn.execute(
            "UPDATE accounts SET last_synced_at = datetime('now') WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![id, user_id],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::memory::MemoryStore;
    use crate::models::{Decision, ExpenseCategory, ExpenseDraft, ReviewStatus};
    use crate::store::{ExpenseStore, SqliteStore};

    fn raw(ext: &str, cents: i64, name: &str, merchant: Option<&str>) -> RawProviderTransaction {
        RawProviderTransaction {
            external_transaction_id: Some(ext.to_string()),
            amount_signed: Some(Decimal::new(cents, 2)),
            date: Some("2025-03-14".to_string()),
            name: name.to_string(),
            merchant_name: merchant.map(str::to_string),
            ..RawProviderTransaction::default()
        }
    }

    #[test]
    fn test_cvs_purchase_lands_pending_and_medical() {
        let (_dir, conn) = test_db();
        let mut store = SqliteStore::new(&conn);
        let batch = vec![raw("tx1", -4250, "CVS PHARMACY #123", Some("CVS"))];
        let summary = ingest(&mut store, "u1", None, &batch, &Classifier::builtin()).unwrap();
        assert_eq!(summary.inserted, 1);

        let txn = store.find_by_external_id("u1", "tx1").unwrap().unwrap();
        assert_eq!(txn.amount, Decimal::new(4250, 2));
        assert!(txn.is_potential_medical);
        assert!(txn.is_refund);
        assert_eq!(txn.review_status, ReviewStatus::Pending);
        assert_eq!(txn.suggested_category, ExpenseCategory::Pharmacy);
        assert_eq!(txn.currency_code, "USD");
    }

    #[test]
    fn test_second_ingest_is_idempotent() {
        let (_dir, conn) = test_db();
        let mut store = SqliteStore::new(&conn);
        let batch = vec![
            raw("a", -1000, "UBER TRIP", None),
            raw("b", -2500, "GROCERY OUTLET", None),
            raw("c", 7000, "PAYROLL", None),
        ];
        let first = ingest(&mut store, "u1", None, &batch, &Classifier::builtin()).unwrap();
        let snapshot = store.list_transactions("u1").unwrap();
        let second = ingest(&mut store, "u1", None, &batch, &Classifier::builtin()).unwrap();

        assert_eq!(first.inserted, 3);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 3);
        assert_eq!(store.list_transactions("u1").unwrap(), snapshot);
    }

    #[test]
    fn test_reingest_never_clobbers_decisions() {
        let (_dir, conn) = test_db();
        let mut store = SqliteStore::new(&conn);
        let batch = vec![raw("a", -1000, "WALGREENS", None), raw("b", -900, "LYFT", None)];
        ingest(&mut store, "u1", None, &batch, &Classifier::builtin()).unwrap();

        let a = store.find_by_external_id("u1", "a").unwrap().unwrap();
        let b = store.find_by_external_id("u1", "b").unwrap().unwrap();
        let draft = ExpenseDraft::new("u1", a.amount, a.date, ExpenseCategory::Pharmacy);
        let expense = store.create_expense(&draft).unwrap();
        store.mark_transaction_kept("u1", a.id, expense.id).unwrap();
        store.persist_decision("u1", b.id, Decision::Skip).unwrap();
        let before_a = store.get_transaction("u1", a.id).unwrap().unwrap();

        let updated = vec![raw("a", -1299, "WALGREENS #9", None), raw("b", -950, "LYFT RIDE", None)];
        ingest(&mut store, "u1", None, &updated, &Classifier::builtin()).unwrap();

        let after_a = store.get_transaction("u1", a.id).unwrap().unwrap();
        let after_b = store.get_transaction("u1", b.id).unwrap().unwrap();
        assert_eq!(after_a.review_status, ReviewStatus::Kept);
        assert_eq!(after_a.review_status, before_a.review_status);
        assert_eq!(after_a.matched_expense_id, Some(expense.id));
        assert_eq!(after_a.matched_expense_id, before_a.matched_expense_id);
        assert_eq!(after_a.amount, Decimal::new(1299, 2));
        assert_eq!(after_b.review_status, ReviewStatus::Skipped);
        assert_eq!(after_b.description, "LYFT RIDE");
    }

    #[test]
    fn test_invalid_rows_are_counted_and_skipped() {
        let mut store = MemoryStore::new();
        let mut missing_id = raw("", -100, "CLINIC", None);
        missing_id.external_transaction_id = None;
        let mut bad_date = raw("d1", -100, "CLINIC", None);
        bad_date.date = Some("03/14/2025".to_string());
        let mut no_amount = raw("d2", 0, "CLINIC", None);
        no_amount.amount_signed = None;
        let batch = vec![missing_id, bad_date, raw("ok", -100, "CLINIC", None), no_amount];

        let summary = ingest(&mut store, "u1", None, &batch, &Classifier::builtin()).unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.invalid, 3);
        assert_eq!(summary.issues.len(), 3);
        assert_eq!(summary.issues[1].external_transaction_id.as_deref(), Some("d1"));
        assert_eq!(store.transactions.len(), 1);
    }

    #[test]
    fn test_row_failure_does_not_abort_batch() {
        let mut store = MemoryStore::new();
        store.faults.fail_insert_for = Some("bad");
        let batch = vec![raw("x", -100, "A", None), raw("bad", -100, "B", None), raw("y", -100, "C", None)];
        let summary = ingest(&mut store, "u1", None, &batch, &Classifier::builtin()).unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_lost_insert_race_takes_update_path() {
        let mut store = MemoryStore::new();
        store.faults.race_insert_for = Some("contested");
        let batch = vec![raw("contested", -100, "CLINIC", None), raw("calm", -100, "LYFT", None)];
        let summary = ingest(&mut store, "u1", None, &batch, &Classifier::builtin()).unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(store.transactions.len(), 2);
    }

    #[test]
    fn test_unavailable_backend_propagates() {
        let mut store = MemoryStore::new();
        store.faults.unavailable = true;
        let err = ingest(&mut store, "u1", None, &[raw("x", -100, "A", None)], &Classifier::builtin());
        assert!(matches!(err, Err(CareError::Dependency(_))));
    }

    #[test]
    fn test_same_external_id_for_two_users() {
        let mut store = MemoryStore::new();
        let batch = vec![raw("shared", -100, "CLINIC", None)];
        ingest(&mut store, "alice", None, &batch, &Classifier::builtin()).unwrap();
        let summary = ingest(&mut store, "bob", None, &batch, &Classifier::builtin()).unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(store.transactions.len(), 2);
    }

    #[test]
    fn test_name_falls_back_to_merchant() {
        let row = prepare("u1", None, &raw("m", -500, "  ", Some("Bright Smile Dental")), &Classifier::builtin()).unwrap();
        assert_eq!(row.description, "Bright Smile Dental");
        assert_eq!(row.suggested_category, ExpenseCategory::DentalVision);
    }

    #[test]
    fn test_positive_amount_is_not_refund() {
        let row = prepare("u1", None, &raw("p", 1875, "HOME INSTEAD SENIOR CARE", None), &Classifier::builtin()).unwrap();
        assert!(!row.is_refund);
        assert_eq!(row.amount, Decimal::new(1875, 2));
        assert_eq!(row.suggested_category, ExpenseCategory::HomeCare);
    }

    #[test]
    fn test_record_sync_run_stamps_account() {
        let (_dir, conn) = test_db();
        conn.execute(
            "INSERT INTO accounts (user_id, name, account_type) VALUES ('u1', 'Checking', 'bank')",
            [],
        )
        .unwrap();
        let account_id = conn.last_insert_rowid();
        let summary = IngestSummary { inserted: 2, ..IngestSummary::default() };
        record_sync_run(&conn, "u1", Some(account_id), &payload_checksum(b"[]"), &summary).unwrap();
        let stamped: Option<String> = conn
            .query_row("SELECT last_synced_at FROM accounts WHERE id = ?1", [account_id], |r| r.get(0))
            .unwrap();
        assert!(stamped.is_some());
        let runs: i64 = conn.query_row("SELECT count(*) FROM sync_runs", [], |r| r.get(0)).unwrap();
        assert_eq!(runs, 1);
    }
}
