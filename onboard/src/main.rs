pub mod bridge;
pub mod commands;
pub mod config;
pub mod due_date;
pub mod pagination;
pub mod reconcile;
pub mod tracker;
pub mod types;
pub mod workflow;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::types::LogFormat;
use crate::workflow::DEFAULT_WEB_URL;

#[derive(Parser)]
#[command(
    name = "onboard",
    version,
    about = "Idempotent GitHub onboarding boards",
    long_about = "Onboard turns a task file into a milestone, a project board and one assigned issue per task for a new hire, reusing whatever already exists."
)]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format: pretty or json
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or update the onboarding board and stream progress
    Run {
        /// Path to the task file (default: onboard.config.yaml, then ~/.config/onboard/config.yaml)
        #[arg(short, long)]
        config: Option<String>,

        /// GitHub token
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// GitHub API root, for GitHub Enterprise
        #[arg(long, env = "GITHUB_API_URL")]
        api_url: Option<String>,

        /// GitHub web root used in the board link
        #[arg(long, default_value = DEFAULT_WEB_URL)]
        web_url: String,

        /// Onboard this user instead of the token's owner
        #[arg(short, long)]
        user: Option<String>,

        /// Run against an in-memory tracker; nothing is written to GitHub
        #[arg(long)]
        dry_run: bool,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show and validate the task file
    Config {
        /// Path to the task file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Print the milestone due date for a start day
    DueDate {
        /// Start day as YYYY-MM-DD (default: today)
        #[arg(long)]
        from: Option<String>,
    },
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match cli.command {
        Command::Run {
            config,
            token,
            api_url,
            web_url,
            user,
            dry_run,
            json,
        } => {
            let args = commands::run::RunArgs {
                config: config.as_deref(),
                token: token.as_deref(),
                api_url: api_url.as_deref(),
                web_url: &web_url,
                user: user.as_deref(),
                dry_run,
                json,
            };
            if let Err(e) = commands::run::run(args) {
                eprintln!("Run error: {:#}", e);
                std::process::exit(1);
            }
        }
        Command::Config { config } => {
            if let Err(e) = commands::config::run(config.as_deref()) {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            }
        }
        Command::DueDate { from } => {
            if let Err(e) = commands::due_date::run(from.as_deref()) {
                eprintln!("Due date error: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}
