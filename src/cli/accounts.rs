use comfy_table::{Cell, Table};

use crate::accounts;
use crate::error::Result;
use crate::models::AccountType;

use super::open_db;

pub fn add(name: &str, account_type: &str, institution: Option<&str>) -> Result<()> {
    let (settings, conn) = open_db()?;
    let account_type: AccountType = account_type.parse()?;
    let account = accounts::add(&conn, &settings.user_id, name, account_type, institution)?;
    println!("Added account: {} ({})", account.name, account.account_type.key());
    Ok(())
}

pub fn list() -> Result<()> {
    let (settings, conn) = open_db()?;
    let rows = accounts::list(&conn, &settings.user_id)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Type", "Institution", "Linked", "Last Synced"]);
    for account in rows {
        table.add_row(vec![
            Cell::new(account.id),
            Cell::new(account.name),
            Cell::new(account.account_type.key()),
            Cell::new(account.institution.unwrap_or_default()),
            Cell::new(match (account.is_active, account.access_token_ref.is_some()) {
                (false, _) => "inactive",
                (true, true) => "yes",
                (true, false) => "manual",
            }),
            Cell::new(
                account
                    .last_synced_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string()),
            ),
        ]);
    }
    println!("Accounts\n{table}");
    Ok(())
}
