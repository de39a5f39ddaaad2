//! rgrid: the RenderGrid command line.
//!
//! Every command prints one JSON envelope on stdout:
//!
//! ```text
//! { "success": true,  "data": { ... } }
//! { "success": false, "error": { "kind": "invalidConfig", "message": "..." } }
//! ```
//!
//! Exit status is 0 on success, 2 when the request itself is invalid
//! (bad config, missing permissions, unsupported region features) and
//! 1 when a valid request failed while running. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use rendergrid_deploy::Operation;

mod commands;
mod context;
mod output;

#[derive(Parser)]
#[command(
    name = "rgrid",
    about = "RenderGrid: chunked rendering on serverless workers",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to rendergrid.toml
    #[arg(short, long, global = true, default_value = "rendergrid.toml")]
    config: PathBuf,

    /// Override [platform].region
    #[arg(long, global = true)]
    region: Option<String>,

    /// Log format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter rendergrid.toml
    Init {
        /// Platform account id
        #[arg(long, default_value = "000000000000")]
        account_id: String,
        /// Renderer version the workers run
        #[arg(long, default_value = "1.0.0")]
        renderer_version: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the worker name derived from the config
    Name,
    /// Manage workers
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },
    /// Manage uploaded site bundles
    Site {
        #[command(subcommand)]
        action: SiteAction,
    },
    /// Render a deployed site
    Render {
        /// Site name
        site: String,
        /// Length of the output timeline in milliseconds
        #[arg(long)]
        duration_ms: u64,
        /// Maximum concurrent invocations for this job
        #[arg(long)]
        parallelism: Option<u32>,
        /// Job id; generated when omitted
        #[arg(long)]
        job_id: Option<String>,
    },
    /// Show the last recorded progress of a render
    Progress {
        job_id: String,
    },
    /// Check the configured credentials
    Permissions {
        #[command(subcommand)]
        action: PermissionsAction,
    },
}

#[derive(Subcommand)]
enum WorkerAction {
    /// Provision the configured worker unless it already exists
    Deploy,
    /// List workers in the region
    List,
    /// Delete one worker, or every worker with --all
    Delete {
        #[arg(required_unless_present = "all")]
        name: Option<String>,
        #[arg(long, conflicts_with = "name")]
        all: bool,
    },
}

#[derive(Subcommand)]
enum SiteAction {
    /// Upload a bundle directory
    Deploy {
        dir: PathBuf,
        /// Site name; derived from the bundle contents when omitted
        #[arg(long)]
        name: Option<String>,
    },
    /// List sites in the region's bucket
    List,
    /// Delete every object of a site
    Delete { name: String },
}

#[derive(Subcommand)]
enum PermissionsAction {
    /// Simulate every capability, or just those one operation needs
    Validate {
        /// e.g. deploy-worker, render
        #[arg(long)]
        operation: Option<Operation>,
    },
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,rendergrid=debug"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let config = cli.config.as_path();
    let region = cli.region.as_deref();
    let result = match cli.command {
        Command::Init {
            account_id,
            renderer_version,
            force,
        } => commands::init::init(config, region, &account_id, &renderer_version, force),
        Command::Name => commands::init::name(config, region),
        Command::Worker { action } => match action {
            WorkerAction::Deploy => commands::worker::deploy(config, region).await,
            WorkerAction::List => commands::worker::list(config, region).await,
            WorkerAction::Delete { name, all } => {
                commands::worker::delete(config, region, name.as_deref(), all).await
            }
        },
        Command::Site { action } => match action {
            SiteAction::Deploy { dir, name } => {
                commands::site::deploy(config, region, &dir, name.as_deref()).await
            }
            SiteAction::List => commands::site::list(config, region).await,
            SiteAction::Delete { name } => commands::site::delete(config, region, &name).await,
        },
        Command::Render {
            site,
            duration_ms,
            parallelism,
            job_id,
        } => {
            commands::render::render(
                config,
                region,
                &site,
                duration_ms,
                parallelism,
                job_id.as_deref(),
            )
            .await
        }
        Command::Progress { job_id } => commands::render::progress(config, region, &job_id).await,
        Command::Permissions { action } => match action {
            PermissionsAction::Validate { operation } => {
                commands::permissions::validate(config, region, operation).await
            }
        },
    };

    output::emit(result)
}
