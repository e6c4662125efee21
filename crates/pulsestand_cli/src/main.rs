//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `pulsestand_core` linkage and database bootstrap.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `pulsestand_cli [DB_PATH]`; without a path an in-memory database
//! is opened.

use pulsestand_core::db::migrations::current_version;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("pulsestand_core ping={}", pulsestand_core::ping());
    println!("pulsestand_core version={}", pulsestand_core::core_version());

    let opened = match std::env::args().nth(1) {
        Some(path) => pulsestand_core::open_db(path),
        None => pulsestand_core::open_db_in_memory(),
    };
    let schema = opened.and_then(|conn| current_version(&conn));
    match schema {
        Ok(version) => {
            println!("pulsestand_core schema_version={version}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("pulsestand_core db_error={err}");
            ExitCode::FAILURE
        }
    }
}
