use chrono::{Local, NaiveDate};
use comfy_table::{Cell, Table};
use rust_decimal::Decimal;

use crate::error::{CareError, Result};
use crate::expenses;
use crate::fmt::money;
use crate::models::{ExpenseCategory, ExpenseDraft};

use super::open_db;

pub struct ExpenseArgs {
    pub amount: String,
    pub date: Option<String>,
    pub category: String,
    pub vendor: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub recipient: Option<i64>,
    pub deductible: bool,
    pub reimbursed_by: Option<String>,
}

fn parse_amount(raw: &str) -> Result<Decimal> {
    raw.trim()
        .trim_start_matches('$')
        .replace(',', "")
        .parse()
        .map_err(|_| CareError::Validation(format!("amount '{raw}' is not a number")))
}

pub fn add(args: ExpenseArgs) -> Result<()> {
    let (settings, conn) = open_db()?;
    let date = match args.date.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| CareError::Validation(format!("date '{raw}' is not YYYY-MM-DD")))?,
        None => Local::now().date_naive(),
    };
    let category: ExpenseCategory = args.category.parse()?;

    let mut draft = ExpenseDraft::new(&settings.user_id, parse_amount(&args.amount)?, date, category);
    draft.vendor = args.vendor;
    draft.description = args.description;
    draft.notes = args.notes;
    draft.care_recipient_id = args.recipient;
    draft.is_tax_deductible = args.deductible;
    draft.is_reimbursed = args.reimbursed_by.is_some();
    draft.reimbursement_source = args.reimbursed_by;

    let expense = expenses::add(&conn, &draft)?;
    println!("Added expense {}: {} on {}", expense.id, money(expense.amount), expense.date);
    Ok(())
}

pub fn list(year: Option<i32>) -> Result<()> {
    let (settings, conn) = open_db()?;
    let rows = expenses::list(&conn, &settings.user_id, year)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Vendor", "Category", "Amount", "Deductible", "Source"]);
    let mut total = Decimal::ZERO;
    for e in &rows {
        total += e.amount;
        table.add_row(vec![
            Cell::new(e.id),
            Cell::new(e.date),
            Cell::new(e.vendor.as_deref().unwrap_or("")),
            Cell::new(e.category.label()),
            Cell::new(money(e.amount)),
            Cell::new(if e.is_tax_deductible { "yes" } else { "" }),
            Cell::new(if e.is_imported() { "bank" } else { "manual" }),
        ]);
    }
    println!("Expenses\n{table}");
    println!("{} expenses, {}", rows.len(), money(total));
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let (settings, conn) = open_db()?;
    match expenses::delete(&conn, &settings.user_id, id)? {
        Some(txn_id) => println!("Deleted expense {id}; transaction {txn_id} is back in review"),
        None => println!("Deleted expense {id}"),
    }
    Ok(())
}
