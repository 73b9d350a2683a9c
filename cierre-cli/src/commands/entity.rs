//! Entity command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use std::process::ExitCode;

use crate::commands::task::colorize_status;
use crate::config::Config;

/// Entity subcommands
#[derive(Subcommand)]
pub enum EntityCommands {
    /// Get an entity and its current status
    Get {
        /// Resource path segment (e.g. "cierres")
        resource: String,

        /// Entity id
        id: i64,
    },
}

/// Handle entity commands
pub async fn handle_entity_command(command: EntityCommands, config: &Config) -> Result<ExitCode> {
    let client = config.client();

    match command {
        EntityCommands::Get { resource, id } => {
            let entity = client
                .get_entity(&resource, id)
                .await
                .with_context(|| format!("Failed to fetch {}/{}", resource, id))?;

            println!("{}", "Entity Details:".bold());
            println!("  Resource: {}", resource.dimmed());
            println!("  ID:       {}", entity.id.to_string().cyan());
            println!("  Status:   {}", colorize_status(&entity.estado));

            if !entity.fields.is_empty() {
                println!("\n{}", "Fields:".bold());
                for (key, value) in &entity.fields {
                    println!("  {} = {}", key.cyan(), value);
                }
            }

            Ok(ExitCode::SUCCESS)
        }
    }
}
