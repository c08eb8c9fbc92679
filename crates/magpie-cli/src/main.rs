//! `magpie` — capture browser session data into a SQLite store.
//!
//! # Usage
//!
//! ```
//! magpie chrome --input ~/.config/chromium/Default/Bookmarks
//! magpie tabs-outliner --input session.db --output captures.db
//! ```
//!
//! The exit code tells failure kinds apart for scripting: see the
//! `EXIT_*` constants.

use std::{io, path::PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use magpie_loaders::Source;
use magpie_store_sqlite::{
  CancelToken, ConfirmedCancel, Stage, StoreReport, store_capture,
};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── Exit codes ───────────────────────────────────────────────────────────────

const EXIT_UNSPECIFIED: i32 = 1;
const EXIT_FILE_ACCESS: i32 = 2;
const EXIT_DATABASE: i32 = 5;
const EXIT_BAD_INPUT: i32 = 22;
/// Historical value for a user-requested interruption; kept stable so
/// wrapping scripts can keep matching on it.
const EXIT_INTERRUPTED: i32 = 10054;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "magpie", version, about = "Capture browser session data")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "magpie.toml")]
  config: PathBuf,

  /// Print the full cause chain of any error.
  #[arg(long)]
  verbose_errors: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Capture a Google Chrome bookmarks file.
  Chrome {
    /// The Chrome `Bookmarks` JSON file.
    #[arg(short, long)]
    input: PathBuf,

    /// The output store; overrides the config file.
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Capture a Tabs Outliner session database.
  TabsOutliner {
    /// The Tabs Outliner session SQLite database.
    #[arg(short, long)]
    input: PathBuf,

    /// The output store; overrides the config file.
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  output: Option<PathBuf>,
}

fn load_config(path: &PathBuf) -> anyhow::Result<ConfigFile> {
  let raw = match std::fs::read_to_string(path) {
    Ok(raw) => raw,
    Err(err) if err.kind() == io::ErrorKind::NotFound => {
      return Ok(ConfigFile::default());
    }
    Err(err) => {
      return Err(err)
        .with_context(|| format!("reading config file {}", path.display()));
    }
  };
  toml::from_str(&raw).context("parsing config file")
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
  let config = match load_config(&cli.config) {
    Ok(config) => config,
    Err(err) => {
      tracing::error!("{err:#}");
      return EXIT_UNSPECIFIED;
    }
  };

  let (source, input, output) = match cli.command {
    Command::Chrome { input, output } => (Source::Chrome, input, output),
    Command::TabsOutliner { input, output } => {
      (Source::TabsOutliner, input, output)
    }
  };
  let Some(output) = output.or(config.output) else {
    tracing::error!(
      "no output store path given; pass --output or set `output` in {}",
      cli.config.display()
    );
    return EXIT_UNSPECIFIED;
  };

  // A first Ctrl-C merely requests cancellation; the store acknowledges it
  // at a safe point. The handler keeps listening so repeated presses are
  // absorbed rather than killing the process mid-write.
  let token = CancelToken::new();
  {
    let token = token.clone();
    tokio::spawn(async move {
      while tokio::signal::ctrl_c().await.is_ok() {
        token.request();
      }
    });
  }

  // Both phases are blocking (file IO, SQLite); keep them off the runtime
  // threads so the signal handler stays responsive.
  let load_input = input.clone();
  let loaded = tokio::task::spawn_blocking(move || {
    magpie_loaders::load(source, &load_input)
  })
  .await;
  let capture = match loaded {
    Ok(Ok(capture)) => capture,
    Ok(Err(err)) => return report_load_error(err, cli.verbose_errors),
    Err(err) => {
      tracing::error!("loader task failed: {err}");
      return EXIT_UNSPECIFIED;
    }
  };
  tracing::info!(
    "loaded {} distinct entries from {}",
    capture.entries.len(),
    input.display()
  );

  let policy = ConfirmedCancel::new(token, confirm_termination);
  let store_output = output.clone();
  let stored = tokio::task::spawn_blocking(move || {
    store_capture(&capture, &store_output, &policy)
  })
  .await;
  match stored {
    Ok(Ok(report)) => {
      report_success(&report, &output);
      0
    }
    Ok(Err(err)) => report_store_error(err, cli.verbose_errors),
    Err(err) => {
      tracing::error!("storage task failed: {err}");
      EXIT_UNSPECIFIED
    }
  }
}

/// Asked when a cancellation request arrives while rows are being written.
/// Unreadable input counts as "no": keeping data wins over stopping fast.
fn confirm_termination() -> bool {
  use std::io::{BufRead, Write};

  let stdin = std::io::stdin();
  for _ in 0..3 {
    print!(
      "Data are being written to the output store. Do terminate the \
       program now? (y/n) "
    );
    let _ = std::io::stdout().flush();

    let mut answer = String::new();
    if stdin.lock().read_line(&mut answer).is_err() {
      return false;
    }
    match answer.trim() {
      "y" | "Y" => return true,
      "n" | "N" => return false,
      _ => {}
    }
  }
  false
}

// ─── Outcome reporting ────────────────────────────────────────────────────────

fn report_success(report: &StoreReport, output: &PathBuf) {
  if report.created {
    tracing::info!("created a new output store at {}", output.display());
  }
  tracing::info!(
    "stored {} new entries ({} duplicates skipped) into {}",
    report.inserted,
    report.duplicates,
    output.display()
  );
}

fn report_load_error(err: magpie_loaders::Error, verbose: bool) -> i32 {
  use magpie_loaders::Error;

  let (message, code) = match &err {
    Error::FileAccess { .. } => {
      ("Could not access the input file; job interrupted.", EXIT_FILE_ACCESS)
    }
    Error::Database { .. } => {
      ("Could not read the input database; job interrupted.", EXIT_DATABASE)
    }
    Error::Structural { .. } => {
      ("Unexpected input supplied; job interrupted.", EXIT_BAD_INPUT)
    }
  };
  tracing::error!("{message}");
  tracing::error!("{err}");
  if verbose {
    print_source_chain(&err);
  }
  code
}

fn report_store_error(err: magpie_store_sqlite::Error, verbose: bool) -> i32 {
  use magpie_store_sqlite::Error;

  let code = match &err {
    Error::FileAccess { .. } => {
      tracing::error!("Could not access the output file; job interrupted.");
      EXIT_FILE_ACCESS
    }
    Error::Database { stage, .. } | Error::Header { stage, .. } => {
      tracing::error!(
        "Output store failure while {stage}; job interrupted."
      );
      report_corruption_state(*stage);
      EXIT_DATABASE
    }
    Error::Interrupted { stage } => {
      tracing::warn!("Job interrupted on user request (while {stage}).");
      // Interruption lands only at commit or rollback boundaries.
      tracing::warn!(
        "The output store is intact; re-run to finish storing this capture."
      );
      EXIT_INTERRUPTED
    }
  };
  tracing::error!("{err}");
  if verbose {
    print_source_chain(&err);
  }
  code
}

fn report_corruption_state(stage: Stage) {
  if stage.failure_may_corrupt() {
    tracing::error!(
      "ATTENTION! The output store is CURRENTLY CORRUPTED: its schema was \
       not fully built. Delete the database file before running again."
    );
  } else {
    tracing::warn!(
      "The output store should not be corrupted by now; no data from this \
       run was kept."
    );
  }
}

fn print_source_chain(err: &dyn std::error::Error) {
  let mut cause = err.source();
  while let Some(err) = cause {
    eprintln!("caused by: {err}");
    cause = err.source();
  }
}
