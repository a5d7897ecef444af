use std::path::PathBuf;

use rust_decimal::Decimal;

use crate::db::{get_connection, get_metadata, init_db, set_metadata, DB_FILE};
use crate::error::{CareError, Result};
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>, agi: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    if let Some(raw) = agi {
        let value: Decimal = raw
            .trim()
            .parse()
            .map_err(|_| CareError::Validation(format!("AGI '{raw}' is not a number")))?;
        if value < Decimal::ZERO {
            return Err(CareError::Validation("AGI cannot be negative".to_string()));
        }
        settings.household_agi = Some(value);
    }

    let data_dir = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join(DB_FILE);
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;
    if get_metadata(&conn, "initialized_at").is_none() {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        set_metadata(&conn, "initialized_at", &now)?;
    }
    save_settings(&settings)?;

    log::info!("initialized {}", db_path.display());
    println!("Initialized carekeep at {}", data_dir.display());
    Ok(())
}
