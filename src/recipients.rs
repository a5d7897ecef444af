use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{CareError, Result};
use crate::models::{CareRecipient, Relationship};
use crate::store::{json_col, parse_col, to_json};

const COLUMNS: &str = "id, user_id, name, relationship, medical_conditions, insurance_notes";

fn from_row(row: &Row) -> rusqlite::Result<CareRecipient> {
    Ok(CareRecipient {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        relationship: parse_col(row, 3)?,
        medical_conditions: json_col(row, 4)?.unwrap_or_default(),
        insurance_notes: row.get(5)?,
    })
}

pub fn add(
    conn: &Connection,
    user_id: &str,
    name: &str,
    relationship: Relationship,
    medical_conditions: &[String],
    insurance_notes: Option<&str>,
) -> Result<CareRecipient> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CareError::Validation("care recipient needs a name".to_string()));
    }
    let conditions: Vec<String> = medical_conditions
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    conn.execute(
        "INSERT INTO care_recipients (user_id, name, relationship, medical_conditions, insurance_notes) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![user_id, name, relationship.key(), to_json(&conditions)?, insurance_notes],
    )?;
    get(conn, user_id, conn.last_insert_rowid())
}

pub fn get(conn: &Connection, user_id: &str, id: i64) -> Result<CareRecipient> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM care_recipients WHERE id = ?1 AND user_id = ?2"),
        rusqlite::params![id, user_id],
        from_row,
    )
    .optional()?
    .ok_or_else(|| CareError::NotFound(format!("care recipient {id}")))
}

pub fn list(conn: &Connection, user_id: &str) -> Result<Vec<CareRecipient>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM care_recipients WHERE user_id = ?1 ORDER BY name"
    ))?;
    let rows = stmt
        .query_map([user_id], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Refuses while any expense still points at the recipient.
pub fn delete(conn: &Connection, user_id: &str, id: i64) -> Result<()> {
    get(conn, user_id, id)?;
    let expenses: i64 = conn.query_row(
        "SELECT COUNT(*) FROM expenses WHERE care_recipient_id = ?1 AND user_id = ?2",
        rusqlite::params![id, user_id],
        |row| row.get(0),
    )?;
    if expenses > 0 {
        return Err(CareError::RecipientInUse {
            recipient_id: id,
            expenses,
        });
    }
    conn.execute(
        "DELETE FROM care_recipients WHERE id = ?1 AND user_id = ?2",
        rusqlite::params![id, user_id],
    )?;
    Ok(())
}
