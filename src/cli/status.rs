use chrono::Local;
use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::db::get_metadata;
use crate::error::Result;
use crate::fmt::{money, percent};
use crate::stats::{reviewed_on, ExpenseStats, TaxProgress, TriageBreakdown};
use crate::store::{ExpenseStore, SqliteStore, TransactionStore};

use super::open_db;

pub fn run() -> Result<()> {
    let (settings, conn) = open_db()?;
    let store = SqliteStore::new(&conn);
    let today = Local::now().date_naive();

    let expenses = store.list_expenses(&settings.user_id)?;
    let stats = ExpenseStats::compute(&expenses, today);
    let tax = TaxProgress::from_stats(settings.household_agi, &stats);
    let triage = TriageBreakdown::from_transactions(&store.list_transactions(&settings.user_id)?);
    let reviewed_today = reviewed_on(&store.list_decisions(&settings.user_id)?, today);

    println!("User:       {}", settings.user_id);
    println!("Data dir:   {}", settings.data_dir);
    if let Some(since) = get_metadata(&conn, "initialized_at") {
        println!("Since:      {since}");
    }
    println!();

    let mut table = Table::new();
    table.set_header(vec!["", "Count", "Amount"]);
    for (label, tally) in [
        ("All expenses", stats.total),
        ("Tax deductible", stats.deductible),
        ("This month", stats.this_month),
        ("This year", stats.this_year),
    ] {
        table.add_row(vec![Cell::new(label), Cell::new(tally.count), Cell::new(money(tally.amount))]);
    }
    println!("{table}");
    println!("Manual: {}   From bank: {}", stats.manual, stats.imported);
    println!();

    match settings.household_agi {
        Some(_) if !tax.threshold.is_zero() => {
            println!(
                "Deduction threshold (7.5% of AGI): {}  tracked {}  progress {}",
                money(tax.threshold),
                money(tax.tracked),
                percent(tax.percent).bold()
            );
            if tax.unlocked.is_zero() {
                println!("{} more before deductions unlock", money(tax.threshold - tax.tracked));
            } else {
                println!("Deductible above threshold: {}", money(tax.unlocked).green());
            }
        }
        _ => println!("Set household AGI with `carekeep init --agi <amount>` to track the deduction threshold."),
    }
    println!();

    println!(
        "Review queue: {} of {} pending ({} likely medical), {} kept, {} skipped",
        triage.pending.to_string().yellow(),
        triage.total(),
        triage.potential_medical_pending,
        triage.kept,
        triage.skipped
    );
    println!("Reviewed today: {reviewed_today}");
    Ok(())
}
