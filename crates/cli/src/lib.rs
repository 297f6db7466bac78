pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "leadflow",
    about = "Leadflow operator CLI",
    long_about = "Operate Leadflow migrations, config inspection, readiness checks, and \
                  reconciliation sweeps.",
    after_help = "Examples:\n  leadflow doctor --json\n  leadflow config\n  leadflow sweep creation"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, CRM token readiness, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Trigger a reconciliation sweep on a running server")]
    Sweep {
        #[arg(value_enum, help = "Which reconciliation pass to run")]
        kind: SweepKind,
        #[arg(long, help = "Server base URL (defaults to the configured bind address)")]
        server_url: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SweepKind {
    Creation,
    Update,
}

impl SweepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creation => "creation",
            Self::Update => "update",
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Sweep { kind, server_url } => {
            commands::sweep::run(kind, server_url.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
