pub mod accounts;
pub mod expenses;
pub mod init;
pub mod reconcile;
pub mod recipients;
pub mod review;
pub mod rules;
pub mod status;
pub mod sync;
pub mod triage;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::{get_connection, DB_FILE};
use crate::error::{CareError, Result};
use crate::settings::{load_settings, Settings};

/// Load settings and open the configured database, refusing to create one.
pub(crate) fn open_db() -> Result<(Settings, Connection)> {
    let settings = load_settings();
    let db_path = std::path::PathBuf::from(&settings.data_dir).join(DB_FILE);
    if !db_path.exists() {
        return Err(CareError::Settings(
            "No database found. Run `carekeep init` first.".to_string(),
        ));
    }
    let conn = get_connection(&db_path)?;
    Ok((settings, conn))
}

#[derive(Parser)]
#[command(
    name = "carekeep",
    version,
    about = "Track caregiving medical expenses from your bank transactions."
)]
pub struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,
    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up carekeep: choose a data directory and initialize the database.
    Init {
        /// Path for carekeep data (default: ~/Documents/carekeep)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Household adjusted gross income, for the deduction threshold
        #[arg(long)]
        agi: Option<String>,
    },
    /// Manage linked financial accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Manage the people you care for.
    Recipients {
        #[command(subcommand)]
        command: RecipientsCommands,
    },
    /// Manage medical classification rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Ingest a JSON batch of bank transactions.
    Sync {
        /// Path to a JSON array of provider transactions
        payload: String,
        /// Account name the batch belongs to
        #[arg(long)]
        account: Option<String>,
    },
    /// Interactively keep or skip pending transactions.
    Review,
    /// Keep, skip or undo a single transaction decision.
    Triage {
        #[command(subcommand)]
        command: TriageCommands,
    },
    /// Manage tracked expenses.
    Expenses {
        #[command(subcommand)]
        command: ExpensesCommands,
    },
    /// Show expense totals, tax progress and the review queue.
    Status,
    /// Repair links between expenses and kept transactions.
    Reconcile,
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Add a new account.
    Add {
        /// Account name, e.g. 'Joint Checking'
        name: String,
        /// Account type: bank, fsa, hsa, credit_card
        #[arg(long = "type", default_value = "bank")]
        account_type: String,
        /// Institution name
        #[arg(long)]
        institution: Option<String>,
    },
    /// List all accounts.
    List,
}

#[derive(Subcommand)]
pub enum RecipientsCommands {
    /// Add a care recipient.
    Add {
        name: String,
        /// parent, spouse, child, sibling, grandparent, other_family, friend, other
        #[arg(long, default_value = "parent")]
        relationship: String,
        /// Medical condition (repeatable)
        #[arg(long = "condition")]
        conditions: Vec<String>,
        /// Insurance notes
        #[arg(long)]
        insurance: Option<String>,
    },
    /// List care recipients.
    List,
    /// Delete a care recipient with no expenses.
    Delete { id: i64 },
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Add a classification rule.
    Add {
        /// Pattern to match against description and merchant
        pattern: String,
        /// Expense category to assign
        #[arg(long)]
        category: String,
        /// Match type: contains, starts_with, regex
        #[arg(long = "match-type", default_value = "contains")]
        match_type: String,
        /// Rule priority (higher wins)
        #[arg(long, default_value = "0")]
        priority: i64,
    },
    /// List active classification rules.
    List,
    /// Delete (deactivate) a rule by ID.
    Delete {
        /// Rule ID (shown in `carekeep rules list`)
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum TriageCommands {
    /// List pending transactions, likely-medical first.
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Keep a transaction as an expense.
    Keep { id: i64 },
    /// Skip a transaction.
    Skip { id: i64 },
    /// Undo the most recent keep or skip.
    Undo,
}

#[derive(Subcommand)]
pub enum ExpensesCommands {
    /// Record an expense by hand.
    Add {
        /// Amount, e.g. 42.50
        amount: String,
        /// Date: YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "medical")]
        category: String,
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Care recipient ID
        #[arg(long)]
        recipient: Option<i64>,
        /// Counts toward the medical deduction
        #[arg(long)]
        deductible: bool,
        /// Reimbursed by (e.g. 'HSA'); marks the expense reimbursed
        #[arg(long = "reimbursed-by")]
        reimbursed_by: Option<String>,
    },
    /// List expenses.
    List {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Delete an expense. Triage-created expenses return their transaction to review.
    Delete { id: i64 },
}
