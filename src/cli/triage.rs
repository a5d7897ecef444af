use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::money;
use crate::models::Decision;
use crate::store::SqliteStore;
use crate::triage::TriageEngine;

use super::open_db;

pub fn list(limit: Option<usize>) -> Result<()> {
    let (settings, conn) = open_db()?;
    let limit = limit.unwrap_or(settings.review_batch_size);
    let engine = TriageEngine::load(SqliteStore::new(&conn), &settings.user_id, limit)?;

    if engine.queue().is_empty() {
        println!("No transactions waiting for review.");
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Description", "Amount", "Suggested", ""]);
    for txn in engine.queue() {
        let amount = if txn.is_refund {
            format!("-{}", money(txn.amount)).yellow().to_string()
        } else {
            money(txn.amount)
        };
        table.add_row(vec![
            Cell::new(txn.id),
            Cell::new(txn.date),
            Cell::new(&txn.description),
            Cell::new(amount),
            Cell::new(txn.suggested_category.label()),
            Cell::new(if txn.is_potential_medical { "medical?".cyan().to_string() } else { String::new() }),
        ]);
    }
    println!("Pending review\n{table}");
    Ok(())
}

pub fn keep(id: i64) -> Result<()> {
    let (settings, conn) = open_db()?;
    let mut engine = TriageEngine::new(SqliteStore::new(&conn), &settings.user_id);
    let expense = engine.keep(id)?;
    println!(
        "Kept transaction {id} as expense {}: {} {} ({})",
        expense.id,
        money(expense.amount),
        expense.vendor.as_deref().unwrap_or("-"),
        expense.category
    );
    Ok(())
}

pub fn skip(id: i64) -> Result<()> {
    let (settings, conn) = open_db()?;
    let mut engine = TriageEngine::new(SqliteStore::new(&conn), &settings.user_id);
    engine.skip(id)?;
    println!("Skipped transaction {id}");
    Ok(())
}

pub fn undo() -> Result<()> {
    let (settings, conn) = open_db()?;
    let mut engine = TriageEngine::resume(SqliteStore::new(&conn), &settings.user_id, 0)?;
    match engine.undo()? {
        None => println!("Nothing to undo."),
        Some(record) => {
            let verb = match record.decision {
                Decision::Keep => "keep",
                Decision::Skip => "skip",
            };
            println!("Undid {verb} of transaction {}; it is pending again", record.transaction_id);
        }
    }
    Ok(())
}
