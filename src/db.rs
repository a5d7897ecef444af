use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;

pub const DB_FILE: &str = "carekeep.db";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    account_type TEXT NOT NULL,
    institution TEXT,
    access_token_ref TEXT,
    is_active INTEGER DEFAULT 1,
    last_synced_at TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE (user_id, name)
);

CREATE TABLE IF NOT EXISTS care_recipients (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    relationship TEXT NOT NULL,
    medical_conditions TEXT NOT NULL DEFAULT '[]',
    insurance_notes TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS synced_transactions (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    account_id INTEGER,
    external_transaction_id TEXT NOT NULL,
    amount TEXT NOT NULL,
    currency_code TEXT NOT NULL DEFAULT 'USD',
    date TEXT NOT NULL,
    authorized_date TEXT,
    description TEXT NOT NULL,
    merchant_name TEXT,
    category TEXT,
    subcategory TEXT,
    payment_channel TEXT,
    pending INTEGER NOT NULL DEFAULT 0,
    location TEXT,
    is_refund INTEGER NOT NULL DEFAULT 0,
    is_potential_medical INTEGER NOT NULL DEFAULT 0,
    is_confirmed_medical INTEGER NOT NULL DEFAULT 0,
    suggested_category TEXT NOT NULL DEFAULT 'other',
    review_status TEXT NOT NULL DEFAULT 'pending',
    matched_expense_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    UNIQUE (user_id, external_transaction_id),
    FOREIGN KEY (account_id) REFERENCES accounts(id)
);

CREATE TABLE IF NOT EXISTS expenses (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    amount TEXT NOT NULL,
    date TEXT NOT NULL,
    category TEXT NOT NULL,
    subcategory TEXT,
    vendor TEXT,
    description TEXT,
    notes TEXT,
    care_recipient_id INTEGER,
    receipt_refs TEXT NOT NULL DEFAULT '[]',
    is_tax_deductible INTEGER NOT NULL DEFAULT 0,
    is_reimbursed INTEGER NOT NULL DEFAULT 0,
    reimbursement_source TEXT,
    source_transaction_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (care_recipient_id) REFERENCES care_recipients(id),
    FOREIGN KEY (source_transaction_id) REFERENCES synced_transactions(id)
);

CREATE TABLE IF NOT EXISTS triage_decisions (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    transaction_id INTEGER NOT NULL UNIQUE,
    decision TEXT NOT NULL,
    expense_id INTEGER,
    decided_at TEXT NOT NULL,
    FOREIGN KEY (transaction_id) REFERENCES synced_transactions(id)
);

CREATE TABLE IF NOT EXISTS classifier_rules (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    pattern TEXT NOT NULL,
    match_type TEXT DEFAULT 'contains',
    category TEXT NOT NULL,
    priority INTEGER DEFAULT 0,
    is_active INTEGER DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    account_id INTEGER,
    checksum TEXT NOT NULL,
    inserted INTEGER NOT NULL,
    updated INTEGER NOT NULL,
    invalid INTEGER NOT NULL,
    failed INTEGER NOT NULL,
    synced_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (account_id) REFERENCES accounts(id)
);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_synced_review ON synced_transactions (user_id, review_status, date);
CREATE INDEX IF NOT EXISTS idx_expenses_source ON expenses (source_transaction_id);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    conn.execute(
        "INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', '1')",
        [],
    )?;
    Ok(())
}

pub fn get_metadata(conn: &Connection, key: &str) -> Option<String> {
    conn.query_row("SELECT value FROM metadata WHERE key = ?1", [key], |r| r.get(0))
        .optional()
        .ok()
        .flatten()
}

pub fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_db() -> (tempfile::TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let conn = get_connection(&dir.path().join(DB_FILE)).unwrap();
    init_db(&conn).unwrap();
    (dir, conn)
}
