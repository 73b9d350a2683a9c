//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod entity;
mod task;

pub use entity::EntityCommands;

use anyhow::Result;
use cierre_core::domain::job::{JobHandle, JobKind};
use cierre_core::dto::task::StartOperation;
use clap::Subcommand;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start an operation and track its job until it finishes
    Start {
        /// Resource path segment (e.g. "cierres")
        resource: String,

        /// Entity id
        id: i64,

        /// Operation name, as in `start-{operation}` (e.g. "verificacion")
        operation: String,

        /// Kind of job the operation starts
        #[arg(short, long)]
        kind: JobKind,

        /// JSON body sent with the request
        #[arg(long)]
        options: Option<String>,

        /// Status shown for the entity while the job runs (e.g. "procesando")
        #[arg(long)]
        optimistic: Option<String>,

        /// Print the task id and exit instead of tracking the job
        #[arg(long)]
        detach: bool,
    },
    /// Upload a spreadsheet (.xlsx, .xls, .csv) and track its processing
    Upload {
        /// Resource path segment (e.g. "libros-remuneraciones")
        resource: String,

        /// Entity id
        id: i64,

        /// File to upload
        file: PathBuf,

        /// Print the task id and exit instead of tracking the job
        #[arg(long)]
        detach: bool,
    },
    /// Track a job started elsewhere until it finishes
    Watch {
        /// Resource path segment of the owning entity
        resource: String,

        /// Owning entity id
        id: i64,

        /// Task id returned by the backend
        task_id: String,

        /// Kind of job, selects the polling interval
        #[arg(short, long)]
        kind: JobKind,
    },
    /// Show the current status of a job once
    Status {
        /// Resource path segment of the owning entity
        resource: String,

        /// Owning entity id
        id: i64,

        /// Task id returned by the backend
        task_id: String,

        /// Kind of job
        #[arg(short, long, default_value_t = JobKind::Verification)]
        kind: JobKind,
    },
    /// Entity inspection
    Entity {
        #[command(subcommand)]
        command: EntityCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module and returns the
/// process exit code.
pub async fn handle_command(command: Commands, config: &Config) -> Result<ExitCode> {
    match command {
        Commands::Start {
            resource,
            id,
            operation,
            kind,
            options,
            optimistic,
            detach,
        } => {
            let options = task::parse_options(options.as_deref())?;
            let req = StartOperation {
                resource,
                entity_id: id,
                operation,
                kind,
                options,
            };
            task::start(config, req, optimistic, detach).await
        }
        Commands::Upload {
            resource,
            id,
            file,
            detach,
        } => task::upload(config, &resource, id, &file, detach).await,
        Commands::Watch {
            resource,
            id,
            task_id,
            kind,
        } => task::watch(config, JobHandle::new(task_id, kind, resource, id)).await,
        Commands::Status {
            resource,
            id,
            task_id,
            kind,
        } => task::status(config, &JobHandle::new(task_id, kind, resource, id)).await,
        Commands::Entity { command } => entity::handle_entity_command(command, config).await,
    }
}
