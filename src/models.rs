use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CareError, Result};

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewStatus {
    Pending,
    Kept,
    Skipped,
}

impl ReviewStatus {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Kept => "kept",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ReviewStatus {
    type Err = CareError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "kept" => Ok(Self::Kept),
            "skipped" => Ok(Self::Skipped),
            other => Err(CareError::Validation(format!("unknown review status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Keep,
    Skip,
}

impl Decision {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Skip => "skip",
        }
    }

    /// Review status a transaction ends up in after this decision.
    pub fn status(&self) -> ReviewStatus {
        match self {
            Self::Keep => ReviewStatus::Kept,
            Self::Skip => ReviewStatus::Skipped,
        }
    }
}

impl FromStr for Decision {
    type Err = CareError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keep" => Ok(Self::Keep),
            "skip" => Ok(Self::Skip),
            other => Err(CareError::Validation(format!("unknown decision '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExpenseCategory {
    Medical,
    Pharmacy,
    Transportation,
    HomeCare,
    DentalVision,
    Insurance,
    Equipment,
    Supplies,
    Other,
}

pub const ALL_CATEGORIES: &[ExpenseCategory] = &[
    ExpenseCategory::Medical,
    ExpenseCategory::Pharmacy,
    ExpenseCategory::Transportation,
    ExpenseCategory::HomeCare,
    ExpenseCategory::DentalVision,
    ExpenseCategory::Insurance,
    ExpenseCategory::Equipment,
    ExpenseCategory::Supplies,
    ExpenseCategory::Other,
];

impl ExpenseCategory {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Medical => "medical",
            Self::Pharmacy => "pharmacy",
            Self::Transportation => "transportation",
            Self::HomeCare => "home_care",
            Self::DentalVision => "dental_vision",
            Self::Insurance => "insurance",
            Self::Equipment => "equipment",
            Self::Supplies => "supplies",
            Self::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Medical => "Medical",
            Self::Pharmacy => "Pharmacy",
            Self::Transportation => "Transportation",
            Self::HomeCare => "In-Home Care",
            Self::DentalVision => "Dental & Vision",
            Self::Insurance => "Insurance",
            Self::Equipment => "Medical Equipment",
            Self::Supplies => "Supplies",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ExpenseCategory {
    type Err = CareError;

    /// Accepts either the storage key or the display label, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        ALL_CATEGORIES
            .iter()
            .find(|c| c.key().eq_ignore_ascii_case(needle) || c.label().eq_ignore_ascii_case(needle))
            .copied()
            .ok_or_else(|| CareError::UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    Parent,
    Spouse,
    Child,
    Sibling,
    Grandparent,
    OtherFamily,
    Friend,
    Other,
}

impl Relationship {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Spouse => "spouse",
            Self::Child => "child",
            Self::Sibling => "sibling",
            Self::Grandparent => "grandparent",
            Self::OtherFamily => "other_family",
            Self::Friend => "friend",
            Self::Other => "other",
        }
    }
}

impl FromStr for Relationship {
    type Err = CareError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "parent" => Ok(Self::Parent),
            "spouse" => Ok(Self::Spouse),
            "child" => Ok(Self::Child),
            "sibling" => Ok(Self::Sibling),
            "grandparent" => Ok(Self::Grandparent),
            "other_family" => Ok(Self::OtherFamily),
            "friend" => Ok(Self::Friend),
            "other" => Ok(Self::Other),
            other => Err(CareError::Validation(format!("unknown relationship '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    Bank,
    Fsa,
    Hsa,
    CreditCard,
}

impl AccountType {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Bank => "bank",
            Self::Fsa => "fsa",
            Self::Hsa => "hsa",
            Self::CreditCard => "credit_card",
        }
    }
}

impl FromStr for AccountType {
    type Err = CareError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bank" => Ok(Self::Bank),
            "fsa" => Ok(Self::Fsa),
            "hsa" => Ok(Self::Hsa),
            "credit_card" => Ok(Self::CreditCard),
            other => Err(CareError::Validation(format!("unknown account type '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncedTransaction {
    pub id: i64,
    pub user_id: String,
    pub account_id: Option<i64>,
    pub external_transaction_id: String,
    /// Always a positive magnitude; see `is_refund` for the provider sign.
    pub amount: Decimal,
    pub currency_code: String,
    pub date: NaiveDate,
    pub authorized_date: Option<NaiveDate>,
    pub description: String,
    pub merchant_name: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub payment_channel: Option<String>,
    pub pending: bool,
    pub location: Option<Location>,
    pub is_refund: bool,
    pub is_potential_medical: bool,
    pub is_confirmed_medical: bool,
    pub suggested_category: ExpenseCategory,
    pub review_status: ReviewStatus,
    pub matched_expense_id: Option<i64>,
}

/// Provider-owned fields of a synced transaction, as written by the ingestor.
/// Carries nothing the triage workflow owns.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionUpsert {
    pub user_id: String,
    pub account_id: Option<i64>,
    pub external_transaction_id: String,
    pub amount: Decimal,
    pub currency_code: String,
    pub date: NaiveDate,
    pub authorized_date: Option<NaiveDate>,
    pub description: String,
    pub merchant_name: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub payment_channel: Option<String>,
    pub pending: bool,
    pub location: Option<Location>,
    pub is_refund: bool,
    pub is_potential_medical: bool,
    pub suggested_category: ExpenseCategory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expense {
    pub id: i64,
    pub user_id: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub category: ExpenseCategory,
    pub subcategory: Option<String>,
    pub vendor: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub care_recipient_id: Option<i64>,
    pub receipt_refs: Vec<String>,
    pub is_tax_deductible: bool,
    pub is_reimbursed: bool,
    pub reimbursement_source: Option<String>,
    pub source_transaction_id: Option<i64>,
}

impl Expense {
    pub fn is_imported(&self) -> bool {
        self.source_transaction_id.is_some()
    }
}

/// A validated request to create an expense, either from a form or from triage.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseDraft {
    pub user_id: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub category: ExpenseCategory,
    pub subcategory: Option<String>,
    pub vendor: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub care_recipient_id: Option<i64>,
    pub receipt_refs: Vec<String>,
    pub is_tax_deductible: bool,
    pub is_reimbursed: bool,
    pub reimbursement_source: Option<String>,
    pub source_transaction_id: Option<i64>,
}

impl ExpenseDraft {
    pub fn new(user_id: &str, amount: Decimal, date: NaiveDate, category: ExpenseCategory) -> Self {
        Self {
            user_id: user_id.to_string(),
            amount,
            date,
            category,
            subcategory: None,
            vendor: None,
            description: None,
            notes: None,
            care_recipient_id: None,
            receipt_refs: Vec::new(),
            is_tax_deductible: false,
            is_reimbursed: false,
            reimbursement_source: None,
            source_transaction_id: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(CareError::Validation("expense has no owner".to_string()));
        }
        if self.amount <= Decimal::ZERO {
            return Err(CareError::Validation(format!(
                "expense amount must be positive, got {}",
                self.amount
            )));
        }
        if self.is_reimbursed
            && self
                .reimbursement_source
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
        {
            return Err(CareError::Validation(
                "reimbursed expenses need a reimbursement source".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CareRecipient {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub relationship: Relationship,
    pub medical_conditions: Vec<String>,
    pub insurance_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkedAccount {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub account_type: AccountType,
    pub institution: Option<String>,
    pub access_token_ref: Option<String>,
    pub is_active: bool,
    pub last_synced_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriageDecision {
    pub transaction_id: i64,
    pub decision: Decision,
    pub expense_id: Option<i64>,
    pub decided_at: NaiveDateTime,
}

/// Intermediate representation handed over by the bank-sync collaborator.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProviderTransaction {
    #[serde(default)]
    pub external_transaction_id: Option<String>,
    #[serde(default)]
    pub account_external_id: Option<String>,
    #[serde(default)]
    pub amount_signed: Option<Decimal>,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub authorized_date: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub payment_channel: Option<String>,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub location: Option<Location>,
}
