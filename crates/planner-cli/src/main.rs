mod config;
mod plan_cmd;
mod serve_cmd;
#[cfg(test)]
mod test_util;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use planner_core::{BackendRegistry, Orchestrator};

use config::{CliOverrides, LogFormat, PlannerConfig};

#[derive(Parser)]
#[command(name = "planner", about = "Repository-aware plan generation service")]
struct Cli {
    /// Log output format (overrides PLANNER_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a planner config file with a fresh debug token
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Start the HTTP service
    Serve {
        /// Address to bind (overrides PLANNER_BIND env var)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides PLANNER_PORT env var)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the pipeline once on a JSON request file and print the response
    Plan {
        /// Path to a plan request body
        file: PathBuf,
    },
    /// Fetch repository context through the configured context driver
    Context {
        /// Repository owner
        #[arg(long)]
        owner: String,
        /// Repository name
        #[arg(long)]
        name: String,
        /// Git ref (defaults to refs/heads/main)
        #[arg(long = "ref")]
        git_ref: Option<String>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Execute the `planner init` command: write config file with a generated
/// debug token.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let debug_token = config::generate_debug_token();

    let cfg = config::ConfigFile {
        server: config::ServerSection {
            bind: Some(config::DEFAULT_BIND.to_string()),
            port: Some(config::DEFAULT_PORT),
            request_timeout_secs: Some(config::DEFAULT_REQUEST_TIMEOUT_SECS),
        },
        auth: config::AuthSection {
            debug_token: Some(debug_token.clone()),
        },
        ..Default::default()
    };

    config::save_config_to(&cfg, &path)?;

    println!("Config written to {}", path.display());
    println!(
        "  server = {}:{}",
        config::DEFAULT_BIND,
        config::DEFAULT_PORT
    );
    println!(
        "  auth.debug_token = {}...{}",
        &debug_token[..8],
        &debug_token[56..]
    );
    println!();
    println!("Next: run `planner serve` to start the service.");

    Ok(())
}

/// Resolve configuration, start logging, and build the orchestrator.
fn setup(
    log_format: Option<LogFormat>,
    bind: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<(PlannerConfig, Orchestrator)> {
    let resolved = PlannerConfig::resolve(&CliOverrides {
        bind,
        port,
        log_format,
    })?;
    init_tracing(resolved.log_format);

    let backends = BackendRegistry::with_builtins().build(&resolved.backends);
    Ok((resolved, Orchestrator::new(backends)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            // Skips config resolution so a broken file can be overwritten.
            init_tracing(cli.log_format.unwrap_or_default());
            cmd_init(force)?;
        }
        Commands::Serve { bind, port } => {
            let (resolved, orchestrator) = setup(cli.log_format, bind, port)?;
            if resolved.debug_token_is_default {
                tracing::warn!(
                    token = config::DEFAULT_DEBUG_TOKEN,
                    hint = "set PLANNER_DEBUG_TOKEN or auth.debug_token",
                    "debug_token_is_default"
                );
            }
            let state = serve_cmd::AppState::new(
                orchestrator,
                &resolved.debug_token,
                resolved.request_timeout,
            );
            serve_cmd::run_serve(state, &resolved.bind, resolved.port).await?;
        }
        Commands::Plan { file } => {
            let (_, orchestrator) = setup(cli.log_format, None, None)?;
            if !plan_cmd::cmd_plan(&orchestrator, &file).await? {
                std::process::exit(1);
            }
        }
        Commands::Context {
            owner,
            name,
            git_ref,
        } => {
            let (_, orchestrator) = setup(cli.log_format, None, None)?;
            plan_cmd::cmd_context(&orchestrator, &owner, &name, git_ref.as_deref()).await?;
        }
    }

    Ok(())
}
