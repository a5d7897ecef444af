use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::models::Relationship;
use crate::recipients;

use super::open_db;

pub fn add(name: &str, relationship: &str, conditions: &[String], insurance: Option<&str>) -> Result<()> {
    let (settings, conn) = open_db()?;
    let relationship: Relationship = relationship.parse()?;
    let recipient = recipients::add(&conn, &settings.user_id, name, relationship, conditions, insurance)?;
    println!("Added care recipient {}: {}", recipient.id, recipient.name);
    Ok(())
}

pub fn list() -> Result<()> {
    let (settings, conn) = open_db()?;
    let rows = recipients::list(&conn, &settings.user_id)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Relationship", "Conditions", "Insurance"]);
    for r in rows {
        table.add_row(vec![
            Cell::new(r.id),
            Cell::new(r.name),
            Cell::new(r.relationship.key()),
            Cell::new(r.medical_conditions.join(", ")),
            Cell::new(r.insurance_notes.unwrap_or_default()),
        ]);
    }
    println!("Care recipients\n{table}");
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let (settings, conn) = open_db()?;
    recipients::delete(&conn, &settings.user_id, id)?;
    println!("Deleted care recipient {id}");
    Ok(())
}
