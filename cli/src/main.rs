mod api;
mod auth;
mod commands;
mod config;
mod remote;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    ClientContext, cmd_calendar, cmd_change_password, cmd_local_add, cmd_local_delete,
    cmd_local_edit, cmd_local_history, cmd_local_list, cmd_local_rollover, cmd_local_toggle,
    cmd_login, cmd_logout, cmd_routines_add, cmd_routines_delete, cmd_routines_edit,
    cmd_routines_list, cmd_routines_set_completed, cmd_signup, cmd_sync, cmd_whoami,
};
use crate::config::{Config, DEFAULT_SERVER, StorageKind};
use routinest_core::db::Database;

#[derive(Parser)]
#[command(
    name = "routinest",
    version,
    about = "A local-first routine tracker",
    long_about = "Track daily routines on this device, then sign in to keep them on a \
                  routinest server with a full completion calendar."
)]
struct Cli {
    /// Server URL for account and routine commands
    #[arg(long, global = true, env = "ROUTINEST_SERVER", default_value = DEFAULT_SERVER)]
    server: String,
    /// Where local routines are stored on this device
    #[arg(long, global = true, env = "ROUTINEST_STORAGE", value_enum, default_value_t = StorageKind::File)]
    storage: StorageKind,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Manage routines kept on this device
    Local {
        #[command(subcommand)]
        command: LocalCommands,
    },
    /// Create an account, sending local routines along
    Signup {
        /// Account email
        email: String,
        /// Display name
        #[arg(short, long)]
        name: String,
        /// Password (prompted when omitted)
        #[arg(long, env = "ROUTINEST_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign in and sync local routines
    Login {
        /// Account email
        email: String,
        /// Password (prompted when omitted)
        #[arg(long, env = "ROUTINEST_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign out and forget the stored session
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the signed-in account
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change the account password
    ChangePassword {
        /// Current password (prompted when omitted)
        #[arg(long)]
        current: Option<String>,
        /// New password, at least 8 characters (prompted when omitted)
        #[arg(long)]
        new: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage routines on the server
    Routines {
        #[command(subcommand)]
        command: RoutineCommands,
    },
    /// Merge local routines into the server list
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the completion calendar
    Calendar {
        /// First day (YYYY-MM-DD or today/yesterday, default: first of this month)
        #[arg(long)]
        start: Option<String>,
        /// Last day (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        end: Option<String>,
        /// Let the server fill in missing days
        #[arg(long)]
        server_side: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum LocalCommands {
    /// Add a routine on this device
    Add {
        /// Routine text
        text: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List routines on this device
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Flip a routine between done and not done
    Toggle {
        /// Local routine ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename a routine
    Edit {
        /// Local routine ID
        id: String,
        /// New text
        text: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a routine
    Delete {
        /// Local routine ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save the day to history and uncheck every routine
    Rollover {
        /// Day to record (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recorded days
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RoutineCommands {
    /// List routines with today's status
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a routine
    Add {
        /// Routine title
        title: String,
        /// Link opened with the routine
        #[arg(long)]
        url: Option<String>,
        /// Mark it done for today right away
        #[arg(long)]
        done: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a routine's title or link
    Edit {
        /// Routine ID
        id: String,
        /// New title
        title: String,
        /// New link (omit to clear)
        #[arg(long)]
        url: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a routine done for today
    Check {
        /// Routine ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a routine not done for today
    Uncheck {
        /// Routine ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a routine and its history
    Delete {
        /// Routine ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("{e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = ClientContext {
        config: Config::load()?,
        server: cli.server,
        storage: cli.storage,
    };

    match cli.command {
        Commands::Serve { port, bind } => {
            let db = Database::open(&ctx.config.db_path)?;
            server::start_server(db, port, &bind).await
        }
        Commands::Local { command } => {
            let store = ctx.local_store()?;
            match command {
                LocalCommands::Add { text, json } => cmd_local_add(&store, &text, json),
                LocalCommands::List { json } => cmd_local_list(&store, json),
                LocalCommands::Toggle { id, json } => cmd_local_toggle(&store, &id, json),
                LocalCommands::Edit { id, text, json } => cmd_local_edit(&store, &id, &text, json),
                LocalCommands::Delete { id, json } => cmd_local_delete(&store, &id, json),
                LocalCommands::Rollover { date, json } => {
                    cmd_local_rollover(&store, date.as_deref(), json)
                }
                LocalCommands::History { json } => cmd_local_history(&store, json),
            }
        }
        Commands::Signup {
            email,
            name,
            password,
            json,
        } => cmd_signup(&ctx, &email, &name, password, json).await,
        Commands::Login {
            email,
            password,
            json,
        } => cmd_login(&ctx, &email, password, json).await,
        Commands::Logout { json } => cmd_logout(&ctx, json).await,
        Commands::Whoami { json } => cmd_whoami(&ctx, json).await,
        Commands::ChangePassword { current, new, json } => {
            cmd_change_password(&ctx, current, new, json).await
        }
        Commands::Routines { command } => match command {
            RoutineCommands::List { json } => cmd_routines_list(&ctx, json).await,
            RoutineCommands::Add {
                title,
                url,
                done,
                json,
            } => cmd_routines_add(&ctx, &title, url.as_deref(), done, json).await,
            RoutineCommands::Edit {
                id,
                title,
                url,
                json,
            } => cmd_routines_edit(&ctx, &id, &title, url.as_deref(), json).await,
            RoutineCommands::Check { id, json } => {
                cmd_routines_set_completed(&ctx, &id, true, json).await
            }
            RoutineCommands::Uncheck { id, json } => {
                cmd_routines_set_completed(&ctx, &id, false, json).await
            }
            RoutineCommands::Delete { id, json } => cmd_routines_delete(&ctx, &id, json).await,
        },
        Commands::Sync { json } => cmd_sync(&ctx, json).await,
        Commands::Calendar {
            start,
            end,
            server_side,
            json,
        } => cmd_calendar(&ctx, start.as_deref(), end.as_deref(), server_side, json).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_storage_and_server() {
        let cli = Cli::try_parse_from([
            "routinest",
            "--storage",
            "db",
            "--server",
            "http://example.com:9000",
            "local",
            "list",
        ])
        .unwrap();
        assert_eq!(cli.storage, StorageKind::Db);
        assert_eq!(cli.server, "http://example.com:9000");
        assert!(matches!(
            cli.command,
            Commands::Local {
                command: LocalCommands::List { json: false }
            }
        ));
    }

    #[test]
    fn test_parse_calendar_window() {
        let cli = Cli::try_parse_from([
            "routinest",
            "calendar",
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-31",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Calendar {
                start, end, json, ..
            } => {
                assert_eq!(start.as_deref(), Some("2024-01-01"));
                assert_eq!(end.as_deref(), Some("2024-01-31"));
                assert!(json);
            }
            _ => panic!("expected calendar command"),
        }
    }
}
