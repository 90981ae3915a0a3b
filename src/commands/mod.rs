pub mod poll;

use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::tasks::tally_reporter;

/// Operator entry point: tally finished polls or watch for them to finish.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the tally of a finished poll as JSON.
    Tally {
        #[clap(value_parser)]
        poll_id: String,
    },
    /// Keep running and log each poll's tally as it finishes.
    Watch,
}

pub async fn handle_command(database: Arc<Database>, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Tally { poll_id } => {
            let report = poll::handle_tally(&database, &poll_id).await?;
            println!("{}", report);
        }
        Command::Watch => {
            tally_reporter::check_finished_polls_task(database, config.check_interval).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("jubivote").chain(args.iter().copied())).map(|cli| cli.command)
    }

    #[test]
    fn parses_known_commands() {
        assert_eq!(
            parse(&["tally", "abc"]).unwrap(),
            Command::Tally { poll_id: "abc".to_string() }
        );
        assert_eq!(parse(&["watch"]).unwrap(), Command::Watch);
    }

    #[test]
    fn rejects_everything_else() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["tally"]).is_err());
        assert!(parse(&["tally", "a", "b"]).is_err());
        assert!(parse(&["watch", "now"]).is_err());
        assert!(parse(&["vote"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
