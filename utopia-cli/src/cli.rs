use clap::{Parser, Subcommand};
use utopia_sync::domain::EntityId;

#[derive(Debug, Parser)]
#[command(name = "utopia")]
#[command(about = "Offline-first time tracking client")]
pub struct Cli {
    /// Use a local simulated server instead of the configured API
    #[arg(long, global = true)]
    pub dev: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Log in and replace local data with the server's
    Login {
        /// Account name, the password is prompted for
        username: String,
    },
    /// Forget the session and all local data
    Logout,
    /// Send local changes and fetch the server's
    Sync,
    /// Start a new running entry
    Start {
        description: Option<String>,
    },
    /// Stop the running entry
    Stop,
    /// Start a new entry with the description and project of an existing one
    Continue {
        #[arg(allow_negative_numbers = true)]
        id: EntityId,
    },
    /// Change the description of an entry
    Describe {
        #[arg(allow_negative_numbers = true)]
        id: EntityId,
        text: String,
    },
    /// Assign an entry to a project, or clear it when no project is given
    Project {
        #[arg(allow_negative_numbers = true)]
        id: EntityId,
        project_id: Option<EntityId>,
    },
    /// Delete an entry
    Delete {
        #[arg(allow_negative_numbers = true)]
        id: EntityId,
    },
    /// List time entries, newest first
    List {
        /// Only show entries not yet confirmed by the server
        #[arg(long)]
        pending: bool,
    },
    /// Show session state and the running entry
    Status,
    /// Throw away entries the server has never seen
    Discard,
    /// Print config path and create default file if missing
    ConfigPath,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_ids_are_accepted() {
        let cli = Cli::try_parse_from(["utopia", "describe", "-1", "Standup"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Describe { id: -1, ref text } if text == "Standup"
        ));
    }

    #[test]
    fn dev_flag_is_global() {
        let cli = Cli::try_parse_from(["utopia", "sync", "--dev"]).unwrap();
        assert!(cli.dev);
        assert!(matches!(cli.command, Commands::Sync));
    }

    #[test]
    fn project_can_be_cleared() {
        let cli = Cli::try_parse_from(["utopia", "project", "12"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Project {
                id: 12,
                project_id: None
            }
        ));
    }
}
