use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parsed command line.
#[allow(missing_docs)]
#[derive(Parser, Debug)]
#[command(
    name = "diffs",
    about = "Runs and administers a diff-server database",
    disable_version_flag = true,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[arg(
        short = 'v',
        long,
        global = true,
        help = "Prints the version of diffs"
    )]
    pub version: bool,

    #[arg(
        long,
        global = true,
        env = "DIFFS_DB",
        value_name = "/path/to/db",
        help = "The prefix to use for databases managed. For local databases, specify a directory path to store the database in. For remote databases, specify the http(s) URL to the database"
    )]
    pub db: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "Name of a file to write a trace to"
    )]
    pub trace: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "Name of file to write CPU profile to"
    )]
    pub cpu: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Top-level commands.
#[allow(missing_docs)]
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    #[command(about = "Starts a local diff-server")]
    Serve {
        #[arg(long, value_name = "PORT", help = "The port to run on [default: 7001]")]
        port: Option<u16>,
    },

    #[command(about = "Deletes a diff-server database and its history")]
    Drop,
}

impl Command {
    /// Name used on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Serve { .. } => "serve",
            Command::Drop => "drop",
        }
    }
}
