use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::accounts;
use crate::classifier::Classifier;
use crate::error::Result;
use crate::ingest::{ingest, payload_checksum, record_sync_run};
use crate::models::RawProviderTransaction;
use crate::store::SqliteStore;

use super::open_db;

pub fn run(payload: &str, account: Option<&str>) -> Result<()> {
    let (settings, conn) = open_db()?;
    let account_id = match account {
        Some(name) => Some(accounts::find_by_name(&conn, &settings.user_id, name)?.id),
        None => None,
    };

    let bytes = std::fs::read(payload)?;
    let batch: Vec<RawProviderTransaction> = serde_json::from_slice(&bytes)?;
    let classifier = Classifier::load(&conn, &settings.user_id)?;

    let mut store = SqliteStore::new(&conn);
    let summary = ingest(&mut store, &settings.user_id, account_id, &batch, &classifier)?;
    record_sync_run(&conn, &settings.user_id, account_id, &payload_checksum(&bytes), &summary)?;

    println!(
        "Synced {} transactions: {} new, {} updated",
        summary.processed(),
        summary.inserted.to_string().green(),
        summary.updated,
    );
    if summary.invalid + summary.failed > 0 {
        println!(
            "{} invalid, {} failed",
            summary.invalid.to_string().yellow(),
            summary.failed.to_string().red(),
        );
        let mut table = Table::new();
        table.set_header(vec!["Row", "Transaction", "Problem"]);
        for issue in &summary.issues {
            table.add_row(vec![
                Cell::new(issue.index),
                Cell::new(issue.external_transaction_id.as_deref().unwrap_or("-")),
                Cell::new(&issue.reason),
            ]);
        }
        println!("{table}");
    }
    Ok(())
}
