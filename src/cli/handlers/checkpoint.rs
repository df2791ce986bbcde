//! Checkpoint inspection and reset

use std::io::Write;
use std::io::{
    self,
};

use crate::cli::commands::CheckpointCommands;
use crate::cli::output::print_info;
use crate::cli::output::print_success;
use crate::cli::output::print_warning;
use crate::database::Store;
use crate::Result;

/// # Errors
/// Database or terminal I/O failures
pub async fn handle_checkpoint_command(store: &dyn Store, command: &CheckpointCommands) -> Result<()> {
    match command {
        CheckpointCommands::Show => handle_checkpoint_show(store).await,
        CheckpointCommands::Reset { name, force } => handle_checkpoint_reset(store, name, *force).await,
    }
}

async fn handle_checkpoint_show(store: &dyn Store) -> Result<()> {
    let checkpoints = store.list_checkpoints().await?;
    if checkpoints.is_empty() {
        print_info("No checkpoints saved yet");
        return Ok(());
    }

    println!("{:<12} {:>16}  updated", "name", "value");
    println!("{}", "─".repeat(56));
    for checkpoint in checkpoints {
        println!(
            "{:<12} {:>16}  {}",
            checkpoint.name,
            checkpoint.value,
            checkpoint.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

async fn handle_checkpoint_reset(store: &dyn Store, name: &str, force: bool) -> Result<()> {
    if !force {
        print!("Reset checkpoint '{name}'? The next run starts from the beginning. [y/N] ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("❌ Aborted");
            return Ok(());
        }
    }

    if store.delete_checkpoint(name).await? {
        print_success(&format!("Checkpoint '{name}' removed"));
    } else {
        print_warning(&format!("No checkpoint named '{name}'"));
    }
    Ok(())
}
