//! Keep/skip review of pending bank transactions.
//!
//! A transaction moves `pending -> kept` or `pending -> skipped` and only goes
//! back to pending through `undo`. Keeping creates exactly one expense and links
//! it to the transaction as a single unit of work. The cursor, the undo stack and
//! the reviewed counter only move once the store has accepted the change.

use crate::error::{CareError, Result};
use crate::merchant::normalize;
use crate::models::{Decision, Expense, ExpenseDraft, ReviewStatus, SyncedTransaction};
use crate::store::TriageStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoRecord {
    pub decision: Decision,
    pub transaction_id: i64,
    pub expense_id: Option<i64>,
}

/// LIFO of triage decisions.
#[derive(Debug, Default)]
pub struct UndoStack {
    records: Vec<UndoRecord>,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: UndoRecord) {
        self.records.push(record);
    }

    pub fn pop(&mut self) -> Option<UndoRecord> {
        self.records.pop()
    }

    pub fn peek(&self) -> Option<&UndoRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Expense prefill for a kept transaction.
pub fn draft_from_transaction(txn: &SyncedTransaction) -> ExpenseDraft {
    let vendor = normalize(txn.merchant_name.as_deref().unwrap_or(&txn.description));
    let mut notes = format!("Imported from bank transaction {}", txn.external_transaction_id);
    if txn.is_refund {
        notes.push_str(" (negative provider amount)");
    }
    let mut draft = ExpenseDraft::new(&txn.user_id, txn.amount, txn.date, txn.suggested_category);
    draft.vendor = Some(vendor);
    draft.description = Some(txn.description.clone());
    draft.subcategory = txn.subcategory.clone();
    draft.notes = Some(notes);
    draft.is_tax_deductible = txn.is_potential_medical;
    draft.source_transaction_id = Some(txn.id);
    draft
}

/// The link step failed after the expense was written: remove the orphan, or
/// report the inconsistency if that fails too.
fn compensate_orphan<S: TriageStore>(
    store: &mut S,
    user_id: &str,
    expense: &Expense,
    transaction_id: i64,
    cause: CareError,
) -> CareError {
    match store.delete_expense(user_id, expense.id) {
        Ok(()) => {
            log::warn!(
                "keep of transaction {transaction_id} failed, removed expense {}: {cause}",
                expense.id
            );
            cause
        }
        Err(cleanup) => {
            log::error!(
                "expense {} orphaned from transaction {transaction_id}: {cause}; cleanup failed: {cleanup}",
                expense.id
            );
            CareError::InconsistentState {
                expense_id: expense.id,
                transaction_id,
                detail: format!("expense created but transaction not marked kept ({cause})"),
            }
        }
    }
}

pub struct TriageEngine<S: TriageStore> {
    store: S,
    user_id: String,
    queue: Vec<SyncedTransaction>,
    cursor: usize,
    undo: UndoStack,
    reviewed: usize,
}

impl<S: TriageStore> TriageEngine<S> {
    pub fn new(store: S, user_id: &str) -> Self {
        Self {
            store,
            user_id: user_id.to_string(),
            queue: Vec::new(),
            cursor: 0,
            undo: UndoStack::new(),
            reviewed: 0,
        }
    }

    /// Start a session over the first `limit` pending transactions.
    pub fn load(store: S, user_id: &str, limit: usize) -> Result<Self> {
        let mut engine = Self::new(store, user_id);
        engine.refresh(limit)?;
        Ok(engine)
    }

    /// Like `load`, with the undo stack rebuilt from the decision log so a
    /// later process can undo earlier decisions.
    pub fn resume(store: S, user_id: &str, limit: usize) -> Result<Self> {
        let mut engine = Self::load(store, user_id, limit)?;
        for decision in engine.store.list_decisions(user_id)? {
            engine.undo.push(UndoRecord {
                decision: decision.decision,
                transaction_id: decision.transaction_id,
                expense_id: decision.expense_id,
            });
        }
        Ok(engine)
    }

    pub fn refresh(&mut self, limit: usize) -> Result<()> {
        self.queue = self.store.fetch_pending_transactions(&self.user_id, limit)?;
        self.cursor = 0;
        Ok(())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn queue(&self) -> &[SyncedTransaction] {
        &self.queue
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&SyncedTransaction> {
        self.queue.get(self.cursor)
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.queue.len()
    }

    /// Keeps and skips this session, net of undos.
    pub fn reviewed_count(&self) -> usize {
        self.reviewed
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn next(&mut self) -> bool {
        if self.cursor + 1 < self.queue.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    pub fn previous(&mut self) -> bool {
        if self.cursor > 0 {
            self.cursor = (self.cursor - 1).min(self.queue.len().saturating_sub(1));
            true
        } else {
            false
        }
    }

    fn pending_transaction(&self, transaction_id: i64) -> Result<SyncedTransaction> {
        let txn = self
            .store
            .get_transaction(&self.user_id, transaction_id)?
            .ok_or_else(|| CareError::NotFound(format!("transaction {transaction_id}")))?;
        if txn.review_status != ReviewStatus::Pending {
            return Err(CareError::AlreadyDecided {
                transaction_id,
                status: txn.review_status,
            });
        }
        Ok(txn)
    }

    /// Mirror a committed change into the session queue and move past it.
    fn settle(&mut self, transaction_id: i64, status: ReviewStatus, expense_id: Option<i64>) {
        let position = self.queue.iter().position(|t| t.id == transaction_id);
        if let Some(i) = position {
            let entry = &mut self.queue[i];
            entry.review_status = status;
            entry.matched_expense_id = expense_id;
            entry.is_confirmed_medical = status == ReviewStatus::Kept;
        }
        if status == ReviewStatus::Pending {
            return;
        }
        let from = position.map_or(self.cursor, |i| i + 1);
        self.cursor = self.queue[from.min(self.queue.len())..]
            .iter()
            .position(|t| t.review_status == ReviewStatus::Pending)
            .map_or(self.queue.len(), |offset| from + offset);
    }

    pub fn keep(&mut self, transaction_id: i64) -> Result<Expense> {
        let txn = self.pending_transaction(transaction_id)?;
        let draft = draft_from_transaction(&txn);
        draft.validate()?;

        let user_id = self.user_id.clone();
        let expense = self.store.atomically(|store| {
            let expense = store.create_expense(&draft)?;
            if let Err(cause) = store.mark_transaction_kept(&user_id, transaction_id, expense.id) {
                return Err(compensate_orphan(store, &user_id, &expense, transaction_id, cause));
            }
            Ok(expense)
        })?;

        log::debug!("kept transaction {transaction_id} as expense {}", expense.id);
        self.undo.push(UndoRecord {
            decision: Decision::Keep,
            transaction_id,
            expense_id: Some(expense.id),
        });
        self.reviewed += 1;
        self.settle(transaction_id, ReviewStatus::Kept, Some(expense.id));
        Ok(expense)
    }

    pub fn skip(&mut self, transaction_id: i64) -> Result<()> {
        self.pending_transaction(transaction_id)?;
        let user_id = self.user_id.clone();
        self.store
            .atomically(|store| store.persist_decision(&user_id, transaction_id, Decision::Skip))?;

        log::debug!("skipped transaction {transaction_id}");
        self.undo.push(UndoRecord {
            decision: Decision::Skip,
            transaction_id,
            expense_id: None,
        });
        self.reviewed += 1;
        self.settle(transaction_id, ReviewStatus::Skipped, None);
        Ok(())
    }

    pub fn keep_current(&mut self) -> Result<Expense> {
        let id = self.current_id()?;
        self.keep(id)
    }

    pub fn skip_current(&mut self) -> Result<()> {
        let id = self.current_id()?;
        self.skip(id)
    }

    fn current_id(&self) -> Result<i64> {
        self.current()
            .map(|t| t.id)
            .ok_or_else(|| CareError::NotFound("no transaction under the cursor".to_string()))
    }

    /// Revert the most recent decision. `Ok(None)` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<Option<UndoRecord>> {
        let Some(record) = self.undo.peek().copied() else {
            return Ok(None);
        };
        let user_id = self.user_id.clone();

        let Some(txn) = self.store.get_transaction(&user_id, record.transaction_id)? else {
            self.undo.pop();
            return Err(CareError::NotFound(format!(
                "transaction {} is gone; dropped its undo entry",
                record.transaction_id
            )));
        };

        if txn.review_status == ReviewStatus::Pending {
            // Already reverted elsewhere (e.g. its expense was deleted).
            log::debug!("undo of {} found it already pending", record.transaction_id);
        } else {
            match record.decision {
                Decision::Keep => self.store.atomically(|store| {
                    let expense_id = match txn.matched_expense_id.or(record.expense_id) {
                        Some(id) => Some(id),
                        None => store
                            .find_expense_by_transaction(&user_id, txn.id)?
                            .map(|e| e.id),
                    };
                    let removed = match expense_id {
                        Some(id) => match store.delete_expense(&user_id, id) {
                            Ok(()) => Some(id),
                            Err(CareError::NotFound(_)) => None,
                            Err(e) => return Err(e),
                        },
                        None => None,
                    };
                    if let Err(cause) = store.reset_transaction(&user_id, txn.id) {
                        return Err(match removed {
                            Some(expense_id) => {
                                log::error!(
                                    "undo removed expense {expense_id} but transaction {} stays kept: {cause}",
                                    txn.id
                                );
                                CareError::InconsistentState {
                                    expense_id,
                                    transaction_id: txn.id,
                                    detail: format!("expense removed but transaction still kept ({cause})"),
                                }
                            }
                            None => cause,
                        });
                    }
                    Ok(())
                })?,
                Decision::Skip => self
                    .store
                    .atomically(|store| store.reset_transaction(&user_id, txn.id))?,
            }
        }

        self.undo.pop();
        self.reviewed = self.reviewed.saturating_sub(1);
        self.settle(record.transaction_id, ReviewStatus::Pending, None);
        self.cursor = match self.queue.iter().position(|t| t.id == record.transaction_id) {
            Some(i) => i,
            // Decided in an earlier session: bring it back into this queue.
            None => {
                let at = self.cursor.min(self.queue.len());
                let mut restored = txn;
                restored.review_status = ReviewStatus::Pending;
                restored.matched_expense_id = None;
                restored.is_confirmed_medical = false;
                self.queue.insert(at, restored);
                at
            }
        };
        log::debug!("undid {} of transaction {}", record.decision.key(), record.transaction_id);
        Ok(Some(record))
    }
}
