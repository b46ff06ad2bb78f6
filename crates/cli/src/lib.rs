pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "neubot",
    about = "Neubot operator CLI",
    long_about = "Apply migrations, check readiness, inspect quota usage, and run queries through the router locally.",
    after_help = "Examples:\n  neubot doctor --json\n  neubot ask \"what time is it\"\n  neubot limits 203.0.113.9"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config, DB connectivity, and integration readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Route a query locally; network integrations report they are not linked")]
    Ask {
        #[arg(help = "Query text, e.g. \"what is 12 * 4\"")]
        text: Vec<String>,
        #[arg(long, help = "IANA timezone of the caller (defaults to server.default_timezone)")]
        timezone: Option<String>,
    },
    #[command(about = "Print the rolling quota status for an identity as JSON")]
    Limits {
        #[arg(help = "Peer address, or user id with --authenticated")]
        identity: String,
        #[arg(long, help = "Treat the identity as a signed-in user")]
        authenticated: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Ask { text, timezone } => commands::ask::run(&text.join(" "), timezone.as_deref()),
        Command::Limits { identity, authenticated } => {
            commands::limits::run(&identity, authenticated)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
