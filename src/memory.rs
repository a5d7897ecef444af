//! In-memory store with fault injection, for exercising the failure paths
//! of ingestion and triage without a database.

use chrono::Local;

use crate::error::{CareError, Result};
use crate::models::{
    Decision, Expense, ExpenseDraft, ReviewStatus, SyncedTransaction, TransactionUpsert,
    TriageDecision,
};
use crate::store::{ExpenseStore, TransactionStore, TriageStore};

#[derive(Debug, Default, Clone, Copy)]
pub struct Faults {
    pub unavailable: bool,
    pub fail_insert_for: Option<&'static str>,
    /// Another writer inserts this id between the lookup and our insert.
    pub race_insert_for: Option<&'static str>,
    pub fail_mark_kept: bool,
    pub fail_delete_expense: bool,
    pub fail_reset: bool,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub transactions: Vec<SyncedTransaction>,
    pub expenses: Vec<Expense>,
    pub decisions: Vec<(String, TriageDecision)>,
    pub faults: Faults,
    next_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_available(&self) -> Result<()> {
        if self.faults.unavailable {
            return Err(CareError::Dependency("memory store offline".to_string()));
        }
        Ok(())
    }

    fn txn_mut(&mut self, user_id: &str, id: i64) -> Result<&mut SyncedTransaction> {
        self.transactions
            .iter_mut()
            .find(|t| t.id == id && t.user_id == user_id)
            .ok_or_else(|| CareError::NotFound(format!("transaction {id}")))
    }

    fn decide(&mut self, user_id: &str, id: i64, decision: Decision, expense_id: Option<i64>) -> Result<()> {
        let txn = self.txn_mut(user_id, id)?;
        if txn.review_status != ReviewStatus::Pending {
            return Err(CareError::AlreadyDecided {
                transaction_id: id,
                status: txn.review_status,
            });
        }
        txn.review_status = decision.status();
        txn.matched_expense_id = expense_id;
        txn.is_confirmed_medical = decision == Decision::Keep;
        self.decisions.retain(|(_, d)| d.transaction_id != id);
        self.decisions.push((
            user_id.to_string(),
            TriageDecision {
                transaction_id: id,
                decision,
                expense_id,
                decided_at: Local::now().naive_local(),
            },
        ));
        Ok(())
    }
}

impl TransactionStore for MemoryStore {
    fn find_by_external_id(&self, user_id: &str, external_id: &str) -> Result<Option<SyncedTransaction>> {
        self.check_available()?;
        Ok(self
            .transactions
            .iter()
            .find(|t| t.user_id == user_id && t.external_transaction_id == external_id)
            .cloned())
    }

    fn insert_transaction(&mut self, row: &TransactionUpsert) -> Result<Option<i64>> {
        self.check_available()?;
        if self.faults.fail_insert_for == Some(row.external_transaction_id.as_str()) {
            return Err(CareError::Other(format!("insert rejected for {}", row.external_transaction_id)));
        }
        if self.faults.race_insert_for == Some(row.external_transaction_id.as_str()) {
            self.faults.race_insert_for = None;
            self.insert_transaction(row)?;
            return Ok(None);
        }
        if self.find_by_external_id(&row.user_id, &row.external_transaction_id)?.is_some() {
            return Ok(None);
        }
        let id = self.next_id();
        self.transactions.push(SyncedTransaction {
            id,
            user_id: row.user_id.clone(),
            account_id: row.account_id,
            external_transaction_id: row.external_transaction_id.clone(),
            amount: row.amount,
            currency_code: row.currency_code.clone(),
            date: row.date,
            authorized_date: row.authorized_date,
            description: row.description.clone(),
            merchant_name: row.merchant_name.clone(),
            category: row.category.clone(),
            subcategory: row.subcategory.clone(),
            payment_channel: row.payment_channel.clone(),
            pending: row.pending,
            location: row.location.clone(),
            is_refund: row.is_refund,
            is_potential_medical: row.is_potential_medical,
            is_confirmed_medical: false,
            suggested_category: row.suggested_category,
            review_status: ReviewStatus::Pending,
            matched_expense_id: None,
        });
        Ok(Some(id))
    }

    fn update_synced_fields(&mut self, id: i64, row: &TransactionUpsert) -> Result<()> {
        self.check_available()?;
        let txn = self.txn_mut(&row.user_id, id)?;
        txn.account_id = row.account_id;
        txn.amount = row.amount;
        txn.currency_code = row.currency_code.clone();
        txn.date = row.date;
        txn.authorized_date = row.authorized_date;
        txn.description = row.description.clone();
        txn.merchant_name = row.merchant_name.clone();
        txn.category = row.category.clone();
        txn.subcategory = row.subcategory.clone();
        txn.payment_channel = row.payment_channel.clone();
        txn.pending = row.pending;
        txn.location = row.location.clone();
        txn.is_refund = row.is_refund;
        txn.is_potential_medical = row.is_potential_medical;
        txn.suggested_category = row.suggested_category;
        Ok(())
    }

    fn get_transaction(&self, user_id: &str, id: i64) -> Result<Option<SyncedTransaction>> {
        self.check_available()?;
        Ok(self
            .transactions
            .iter()
            .find(|t| t.id == id && t.user_id == user_id)
            .cloned())
    }

    fn list_transactions(&self, user_id: &str) -> Result<Vec<SyncedTransaction>> {
        self.check_available()?;
        Ok(self.transactions.iter().filter(|t| t.user_id == user_id).cloned().collect())
    }

    fn fetch_pending_transactions(&self, user_id: &str, limit: usize) -> Result<Vec<SyncedTransaction>> {
        self.check_available()?;
        Ok(self
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && t.review_status == ReviewStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    fn persist_decision(&mut self, user_id: &str, transaction_id: i64, decision: Decision) -> Result<()> {
        self.check_available()?;
        self.decide(user_id, transaction_id, decision, None)
    }

    fn mark_transaction_kept(&mut self, user_id: &str, transaction_id: i64, expense_id: i64) -> Result<()> {
        self.check_available()?;
        if self.faults.fail_mark_kept {
            return Err(CareError::Dependency("mark kept failed".to_string()));
        }
        self.decide(user_id, transaction_id, Decision::Keep, Some(expense_id))
    }

    fn reset_transaction(&mut self, user_id: &str, transaction_id: i64) -> Result<()> {
        self.check_available()?;
        if self.faults.fail_reset {
            return Err(CareError::Dependency("reset failed".to_string()));
        }
        let txn = self.txn_mut(user_id, transaction_id)?;
        txn.review_status = ReviewStatus::Pending;
        txn.matched_expense_id = None;
        txn.is_confirmed_medical = false;
        self.decisions.retain(|(_, d)| d.transaction_id != transaction_id);
        Ok(())
    }

    fn list_decisions(&self, user_id: &str) -> Result<Vec<TriageDecision>> {
        self.check_available()?;
        Ok(self
            .decisions
            .iter()
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, d)| d.clone())
            .collect())
    }
}

impl ExpenseStore for MemoryStore {
    fn create_expense(&mut self, draft: &ExpenseDraft) -> Result<Expense> {
        self.check_available()?;
        draft.validate()?;
        let expense = Expense {
            id: self.next_id(),
            user_id: draft.user_id.clone(),
            amount: draft.amount,
            date: draft.date,
            category: draft.category,
            subcategory: draft.subcategory.clone(),
            vendor: draft.vendor.clone(),
            description: draft.description.clone(),
            notes: draft.notes.clone(),
            care_recipient_id: draft.care_recipient_id,
            receipt_refs: draft.receipt_refs.clone(),
            is_tax_deductible: draft.is_tax_deductible,
            is_reimbursed: draft.is_reimbursed,
            reimbursement_source: draft.reimbursement_source.clone(),
            source_transaction_id: draft.source_transaction_id,
        };
        self.expenses.push(expense.clone());
        Ok(expense)
    }

    fn get_expense(&self, user_id: &str, id: i64) -> Result<Option<Expense>> {
        self.check_available()?;
        Ok(self.expenses.iter().find(|e| e.id == id && e.user_id == user_id).cloned())
    }

    fn find_expense_by_transaction(&self, user_id: &str, transaction_id: i64) -> Result<Option<Expense>> {
        self.check_available()?;
        Ok(self
            .expenses
            .iter()
            .find(|e| e.user_id == user_id && e.source_transaction_id == Some(transaction_id))
            .cloned())
    }

    fn delete_expense(&mut self, user_id: &str, id: i64) -> Result<()> {
        self.check_available()?;
        if self.faults.fail_delete_expense {
            return Err(CareError::Dependency("delete failed".to_string()));
        }
        let before = self.expenses.len();
        self.expenses.retain(|e| !(e.id == id && e.user_id == user_id));
        if self.expenses.len() == before {
            return Err(CareError::NotFound(format!("expense {id}")));
        }
        Ok(())
    }

    fn list_expenses(&self, user_id: &str) -> Result<Vec<Expense>> {
        self.check_available()?;
        Ok(self.expenses.iter().filter(|e| e.user_id == user_id).cloned().collect())
    }
}

impl TriageStore for MemoryStore {}
