use comfy_table::{Cell, Table};

use crate::classifier::{add_rule, deactivate_rule, list_rules, MatchType};
use crate::error::Result;
use crate::models::ExpenseCategory;

use super::open_db;

pub fn add(pattern: &str, category: &str, match_type: &str, priority: i64) -> Result<()> {
    let (settings, conn) = open_db()?;
    let category: ExpenseCategory = category.parse()?;
    let match_type: MatchType = match_type.parse()?;
    let id = add_rule(&conn, &settings.user_id, pattern, match_type, category, priority)?;
    println!("Added rule {id}: '{pattern}' \u{2192} {category}");
    Ok(())
}

pub fn list() -> Result<()> {
    let (settings, conn) = open_db()?;
    let rules = list_rules(&conn, &settings.user_id)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Pattern", "Type", "Category", "Priority"]);
    for rule in rules {
        table.add_row(vec![
            Cell::new(rule.id.map(|id| id.to_string()).unwrap_or_default()),
            Cell::new(rule.pattern),
            Cell::new(rule.match_type.key()),
            Cell::new(rule.category.label()),
            Cell::new(rule.priority),
        ]);
    }
    println!("Rules\n{table}");
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let (settings, conn) = open_db()?;
    deactivate_rule(&conn, &settings.user_id, id)?;
    println!("Deleted rule {id}");
    Ok(())
}
