use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{CareError, Result};
use crate::models::{AccountType, LinkedAccount};
use crate::store::parse_col;

const COLUMNS: &str = "id, user_id, name, account_type, institution, access_token_ref, is_active, last_synced_at";

fn from_row(row: &Row) -> rusqlite::Result<LinkedAccount> {
    Ok(LinkedAccount {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        account_type: parse_col(row, 3)?,
        institution: row.get(4)?,
        access_token_ref: row.get(5)?,
        is_active: row.get(6)?,
        last_synced_at: row.get(7)?,
    })
}

pub fn add(
    conn: &Connection,
    user_id: &str,
    name: &str,
    account_type: AccountType,
    institution: Option<&str>,
) -> Result<LinkedAccount> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CareError::Validation("account name is empty".to_string()));
    }
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM accounts WHERE user_id = ?1 AND name = ?2",
            rusqlite::params![user_id, name],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Err(CareError::Validation(format!("account '{name}' already exists")));
    }
    conn.execute(
        "INSERT INTO accounts (user_id, name, account_type, institution) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![user_id, name, account_type.key(), institution],
    )?;
    find_by_name(conn, user_id, name)
}

pub fn list(conn: &Connection, user_id: &str) -> Result<Vec<LinkedAccount>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM accounts WHERE user_id = ?1 ORDER BY name"
    ))?;
    let rows = stmt
        .query_map([user_id], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn find_by_name(conn: &Connection, user_id: &str, name: &str) -> Result<LinkedAccount> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM accounts WHERE user_id = ?1 AND name = ?2"),
        rusqlite::params![user_id, name.trim()],
        from_row,
    )
    .optional()?
    .ok_or_else(|| CareError::UnknownAccount(name.to_string()))
}
