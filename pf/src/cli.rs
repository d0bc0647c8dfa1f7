//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use planstore::PlanStatus;
use std::path::PathBuf;

/// Planforge - marketing plan generation service
#[derive(Parser)]
#[command(
    name = "pf",
    about = "Generates strategic marketing plans from business questionnaires"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default when no subcommand is given)
    Serve,

    /// Generate one plan from a questionnaire file and exit
    Run {
        /// Path to a JSON file with the questionnaire answers
        #[arg(value_name = "FILE")]
        questionnaire: PathBuf,

        /// Contact email for the completion notification
        #[arg(short, long)]
        email: Option<String>,

        /// Contact name to greet in the notification
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show a stored plan: status, cost and document
    Show {
        /// Plan ID
        plan_id: String,
    },

    /// List stored plans, newest first
    Plans {
        /// Filter by status (pending, analysing, generating, reviewing,
        /// finalising, completed, failed)
        #[arg(short, long)]
        status: Option<PlanStatus>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["pf"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_serve() {
        let cli = Cli::parse_from(["pf", "serve"]);
        assert!(matches!(cli.command, Some(Command::Serve)));
    }

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from([
            "pf",
            "run",
            "answers.json",
            "--email",
            "maria@example.pt",
            "--name",
            "Maria",
        ]);
        if let Some(Command::Run {
            questionnaire,
            email,
            name,
        }) = cli.command
        {
            assert_eq!(questionnaire, PathBuf::from("answers.json"));
            assert_eq!(email.as_deref(), Some("maria@example.pt"));
            assert_eq!(name.as_deref(), Some("Maria"));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_cli_parse_show() {
        let cli = Cli::parse_from(["pf", "show", "0199c2d5"]);
        if let Some(Command::Show { plan_id }) = cli.command {
            assert_eq!(plan_id, "0199c2d5");
        } else {
            panic!("Expected Show command");
        }
    }

    #[test]
    fn test_cli_parse_plans_with_status_filter() {
        let cli = Cli::parse_from(["pf", "plans", "--status", "completed"]);
        assert!(matches!(
            cli.command,
            Some(Command::Plans {
                status: Some(PlanStatus::Completed)
            })
        ));
    }

    #[test]
    fn test_cli_rejects_unknown_status() {
        let result = Cli::try_parse_from(["pf", "plans", "--status", "archived"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["pf", "-c", "/path/to/planforge.yml", "serve"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/planforge.yml")));
    }
}
