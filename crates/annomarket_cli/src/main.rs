//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `annomarket_core` linkage.
//! - Optionally open (and migrate) a store and print its ledger summary.
//!
//! Usage: `annomarket_cli [db_path]`. Set `ANNOMARKET_LOG_DIR` to an absolute
//! directory to enable file logging.

use annomarket_core::db::migrations::{current_user_version, latest_version};
use annomarket_core::db::open_db;
use annomarket_core::{
    init_logging, AccountRepository, LogConfig, LogLevel, SqliteAccountRepository,
};
use log::info;
use std::error::Error;
use std::process::ExitCode;

const LOG_DIR_ENV: &str = "ANNOMARKET_LOG_DIR";

fn main() -> ExitCode {
    println!("annomarket_core ping={}", annomarket_core::ping());
    println!("annomarket_core version={}", annomarket_core::core_version());

    if let Ok(dir) = std::env::var(LOG_DIR_ENV) {
        if let Err(err) = init_logging(&LogConfig::new(LogLevel::build_default(), dir)) {
            eprintln!("logging disabled: {err}");
        }
    }

    let Some(db_path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    match summarize(&db_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn summarize(db_path: &str) -> Result<(), Box<dyn Error>> {
    let conn = open_db(db_path)?;
    let accounts = SqliteAccountRepository::try_new(&conn)?;
    let annotators = accounts.list_annotators()?;

    info!("event=cli_summary module=cli status=ok annotators={}", annotators.len());
    println!(
        "schema version={} (latest {})",
        current_user_version(&conn)?,
        latest_version()
    );
    println!("annotator pool size={}", annotators.len());
    Ok(())
}
