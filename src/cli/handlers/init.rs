//! Database initialization

use crate::cli::output::print_success;
use crate::Database;
use crate::Result;

/// Create all tables and indexes; safe to run repeatedly
///
/// # Errors
/// Database failures
pub async fn handle_init_command(database: &Database) -> Result<()> {
    tracing::info!("Initializing database schema");
    database.init_schema().await?;
    print_success("Database schema initialized");
    Ok(())
}
