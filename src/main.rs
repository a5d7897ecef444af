mod accounts;
mod classifier;
mod cli;
mod db;
mod error;
mod expenses;
mod fmt;
mod ingest;
#[cfg(test)]
mod memory;
mod merchant;
mod models;
mod reconcile;
mod recipients;
mod settings;
mod stats;
mod store;
mod triage;
mod tui;

use clap::Parser;

use cli::expenses::ExpenseArgs;
use cli::{
    AccountsCommands, Cli, Commands, ExpensesCommands, RecipientsCommands, RulesCommands,
    TriageCommands,
};

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Init { data_dir, agi } => cli::init::run(data_dir, agi),
        Commands::Accounts { command } => match command {
            AccountsCommands::Add {
                name,
                account_type,
                institution,
            } => cli::accounts::add(&name, &account_type, institution.as_deref()),
            AccountsCommands::List => cli::accounts::list(),
        },
        Commands::Recipients { command } => match command {
            RecipientsCommands::Add {
                name,
                relationship,
                conditions,
                insurance,
            } => cli::recipients::add(&name, &relationship, &conditions, insurance.as_deref()),
            RecipientsCommands::List => cli::recipients::list(),
            RecipientsCommands::Delete { id } => cli::recipients::delete(id),
        },
        Commands::Rules { command } => match command {
            RulesCommands::Add {
                pattern,
                category,
                match_type,
                priority,
            } => cli::rules::add(&pattern, &category, &match_type, priority),
            RulesCommands::List => cli::rules::list(),
            RulesCommands::Delete { id } => cli::rules::delete(id),
        },
        Commands::Sync { payload, account } => cli::sync::run(&payload, account.as_deref()),
        Commands::Review => cli::review::run(),
        Commands::Triage { command } => match command {
            TriageCommands::List { limit } => cli::triage::list(limit),
            TriageCommands::Keep { id } => cli::triage::keep(id),
            TriageCommands::Skip { id } => cli::triage::skip(id),
            TriageCommands::Undo => cli::triage::undo(),
        },
        Commands::Expenses { command } => match command {
            ExpensesCommands::Add {
                amount,
                date,
                category,
                vendor,
                description,
                notes,
                recipient,
                deductible,
                reimbursed_by,
            } => cli::expenses::add(ExpenseArgs {
                amount,
                date,
                category,
                vendor,
                description,
                notes,
                recipient,
                deductible,
                reimbursed_by,
            }),
            ExpensesCommands::List { year } => cli::expenses::list(year),
            ExpensesCommands::Delete { id } => cli::expenses::delete(id),
        },
        Commands::Status => cli::status::run(),
        Commands::Reconcile => cli::reconcile::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
