//! Command orchestration for the `diffs` binary.
//!
//! [`run`] parses the arguments, handles the version query, installs logging,
//! starts diagnostic capture, arms the signal watcher and then runs exactly
//! one command. Capture is stopped on every way out of a command: normal
//! return, error return, unwinding (through [`StopOnDrop`]) and signals
//! (through the watcher).

mod args;
pub mod config;
mod prompt;

use std::ffi::OsString;
use std::io::{self, BufRead, Write};
use std::iter;

use clap::{CommandFactory, Parser};
use thiserror::Error;
use tracing::{debug, info, info_span};

use crate::capture::{CaptureError, CaptureOptions, CaptureSession, StopOnDrop};
use crate::db::{DbError, Hash, LOCAL_DATASET};
use crate::logging::{self, LogOptions};
use crate::serve::{self, Accounts, ServeError, DEFAULT_PORT};
use crate::signal::{ExitFn, SignalWatcher};
use crate::spec::{SpecCell, SpecError};
use crate::VERSION;

pub use args::{Cli, Command};
pub use config::{CliConfig, ConfigError};
pub use prompt::{confirm, AFFIRMATIVE, DROP_WARNING};

/// Error type for command execution.
#[derive(Debug, Error)]
pub enum CliError {
    /// No database location was given on the command line, in the
    /// environment or in the config file.
    #[error("required flag --db not provided")]
    MissingDatabase,
    /// The config file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A diagnostic sink could not be opened or flushed.
    #[error(transparent)]
    Capture(#[from] CaptureError),
    /// The database location could not be resolved.
    #[error(transparent)]
    Spec(#[from] SpecError),
    /// The database rejected an operation.
    #[error(transparent)]
    Db(#[from] DbError),
    /// The HTTP service failed.
    #[error(transparent)]
    Serve(#[from] ServeError),
    /// Console I/O failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Options shared by every command, fixed once parsing is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalOptions {
    /// Database location string.
    pub db: String,
    /// Execution trace sink.
    pub trace: Option<std::path::PathBuf>,
    /// CPU profile sink.
    pub cpu: Option<std::path::PathBuf>,
}

impl GlobalOptions {
    /// Merges parsed flags with config file defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::MissingDatabase`] when no source names a database.
    pub fn resolve(cli: &Cli, config: &CliConfig) -> Result<Self, CliError> {
        let db = cli
            .db
            .clone()
            .or_else(|| config.db.clone())
            .ok_or(CliError::MissingDatabase)?;
        Ok(Self {
            db,
            trace: cli.trace.clone(),
            cpu: cli.cpu.clone(),
        })
    }

    /// Capture streams requested by these options.
    pub fn capture(&self) -> CaptureOptions {
        CaptureOptions {
            trace: self.trace.clone(),
            cpu: self.cpu.clone(),
        }
    }
}

/// Streams the commands read from and write to.
pub struct Console<R, W, E> {
    /// Operator input.
    pub input: R,
    /// Regular output.
    pub output: W,
    /// Usage, errors and logs.
    pub errors: E,
}

/// How a `drop` invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// The operator did not confirm; nothing was touched.
    Declined,
    /// The local dataset was deleted.
    Deleted {
        /// Head of the dataset before deletion.
        previous_head: Option<Hash>,
    },
}

/// Runs the CLI with `args` (program name excluded) and returns the exit
/// status.
///
/// `exit` is handed to the signal watcher and is only called when a
/// termination signal arrives.
pub async fn run<I, T, R, W, E>(args: I, console: &mut Console<R, W, E>, exit: ExitFn) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
    R: BufRead,
    W: Write,
    E: Write,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    if args.is_empty() {
        let result = print_usage(&mut console.errors).map_err(CliError::from);
        return finish(console, result);
    }

    let cli = match Cli::try_parse_from(iter::once(OsString::from("diffs")).chain(args)) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = write!(console.errors, "{}", err.render());
            return if err.use_stderr() { 1 } else { 0 };
        }
    };

    if cli.version {
        let result = writeln!(console.output, "{VERSION}").map_err(CliError::from);
        return finish(console, result);
    }

    let result = execute(cli, console, exit).await;
    finish(console, result)
}

fn finish<R, W: Write, E: Write>(console: &mut Console<R, W, E>, result: Result<(), CliError>) -> i32 {
    let _ = console.output.flush();
    match result {
        Ok(()) => 0,
        Err(err) => {
            let _ = writeln!(console.errors, "{err}");
            let _ = console.errors.flush();
            1
        }
    }
}

async fn execute<R, W, E>(cli: Cli, console: &mut Console<R, W, E>, exit: ExitFn) -> Result<(), CliError>
where
    R: BufRead,
    W: Write,
    E: Write,
{
    let Some(command) = cli.command.clone() else {
        print_usage(&mut console.errors)?;
        return Ok(());
    };

    let config = CliConfig::load()?;
    let globals = GlobalOptions::resolve(&cli, &config)?;

    let capture = CaptureSession::new();
    logging::init(
        &LogOptions {
            prefix: matches!(command, Command::Serve { .. }),
            filter: config.log.filter.clone(),
        },
        &capture,
    );
    let _teardown = StopOnDrop(capture.clone());
    capture.start(&globals.capture())?;
    let _watcher = SignalWatcher::arm(capture.clone(), exit)?;
    debug!(command = command.name(), db = %globals.db, "dispatching");

    let specs = SpecCell::new(globals.db.clone());
    match command {
        Command::Serve { port } => {
            let port = port.or(config.serve.port).unwrap_or(DEFAULT_PORT);
            serve::serve(specs.raw(), port, Accounts::builtin()).await?;
        }
        Command::Drop => {
            drop_database(&specs, &mut console.input, &mut console.output)?;
        }
    }
    Ok(())
}

fn print_usage<E: Write>(errors: &mut E) -> io::Result<()> {
    Cli::command().write_help(errors)?;
    errors.flush()
}

/// Asks for confirmation, then deletes the local dataset of the database in
/// `specs`. The database is only resolved once the operator confirmed.
///
/// # Errors
///
/// Fails if the prompt cannot be read, the location cannot be resolved or
/// the store rejects the deletion.
pub fn drop_database<R, W>(specs: &SpecCell, input: &mut R, output: &mut W) -> Result<DropOutcome, CliError>
where
    R: BufRead,
    W: Write,
{
    let _span = info_span!("drop").entered();
    if !confirm(input, output, DROP_WARNING)? {
        debug!("drop declined");
        return Ok(DropOutcome::Declined);
    }

    let spec = specs.get_or_resolve()?;
    let database = spec.database();
    let dataset = database.get_dataset(LOCAL_DATASET)?;
    database.delete(&dataset)?;
    info!(location = %spec.location(), dataset = LOCAL_DATASET, "dropped database");
    Ok(DropOutcome::Deleted {
        previous_head: dataset.head(),
    })
}
