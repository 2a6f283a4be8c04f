//! Command-line interface module for tidyd.
//!
//! Parses arguments, loads configuration, and runs the worker loop until
//! Ctrl-C:
//!
//! 1. Load config and apply command-line overrides
//! 2. Initialize logging
//! 3. Create the destination and category folders
//! 4. Start watching the source directories
//! 5. Tick the organizer on a fixed cadence (sooner when a drain is due)
//! 6. On shutdown, log and print the run statistics

use crate::config::Config;
use crate::load::AdaptiveBackoff;
use crate::logging;
use crate::organizer::Organizer;
use crate::output::OutputFormatter;
use crate::watcher::DirectoryWatcher;
use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, bounded, never, select};
use std::path::PathBuf;
use std::thread;
use tracing::{error, info};

/// Watches download folders and files new arrivals by type
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "tidyd", version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Destination root (overrides config)
    #[arg(long, value_name = "DIR")]
    pub dest: Option<PathBuf>,

    /// Directory to watch; repeat for several (overrides config)
    #[arg(long = "source", value_name = "DIR")]
    pub sources: Vec<PathBuf>,

    /// Move files even when their content was already seen
    #[arg(long)]
    pub no_duplicates: bool,

    /// Classify files without a known extension by their content
    #[arg(long)]
    pub sniff_content: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Args {
    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(dest) = &self.dest {
            config.destination = dest.clone();
        }
        if !self.sources.is_empty() {
            config.sources = self.sources.clone();
        }
        if self.no_duplicates {
            config.features.detect_duplicates = false;
        }
        if self.sniff_content {
            config.features.sniff_content = true;
        }
    }
}

/// Runs the daemon with the given arguments.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, the destination
/// cannot be created, or no source directory can be watched. Errors while
/// processing individual files are logged and never end the run.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use tidyd::cli::{Args, run_cli};
///
/// let args = Args::parse_from(["tidyd", "--dest", "/tmp/organized"]);
/// if let Err(e) = run_cli(args) {
///     eprintln!("Error: {e:#}");
/// }
/// ```
pub fn run_cli(args: Args) -> Result<()> {
    let mut config = Config::load(args.config.as_deref()).context("Error loading configuration")?;
    args.apply_overrides(&mut config);

    logging::init_with_config(&config.logging);

    if args.print_config {
        let rendered = toml::to_string_pretty(&config).context("Error rendering configuration")?;
        println!("{rendered}");
        return Ok(());
    }

    let table = config.category_table();
    let mut organizer = Organizer::new(&config, table).context("Error compiling filters")?;
    organizer.prepare_destination().with_context(|| {
        format!(
            "Error preparing destination {}",
            config.destination.display()
        )
    })?;

    OutputFormatter::category_table(organizer.classifier().table());

    let watcher = DirectoryWatcher::start(&config.sources, organizer.intake())
        .context("Error starting watcher")?;
    OutputFormatter::success(&format!(
        "Watching {} director{} into {}",
        watcher.watched().len(),
        if watcher.watched().len() == 1 { "y" } else { "ies" },
        config.destination.display()
    ));
    OutputFormatter::info("Press Ctrl-C to stop.");

    run_worker_loop(&mut organizer, &config);
    drop(watcher);

    let stats = organizer.stats();
    info!(stats = %stats.to_json(), "organizer stopped");
    OutputFormatter::summary_table(stats);
    Ok(())
}

/// Ticks until Ctrl-C. Wakes early when an intake reports a due drain.
fn run_worker_loop(organizer: &mut Organizer, config: &Config) {
    let wake = organizer.wake_signal();
    let mut shutdown = spawn_shutdown_listener();
    let mut backoff = AdaptiveBackoff::from_config(&config.load);
    let tick_interval = config.batching.tick_interval();

    loop {
        let report = organizer.tick();
        if !report.is_idle() {
            info!(
                moved = report.moved,
                duplicates = report.duplicates,
                skipped = report.skipped,
                failed = report.failed,
                pending = organizer.pending_len(),
                settling = organizer.settling_len(),
                "tick"
            );
        }

        let extra = backoff.extra_delay();
        if !extra.is_zero() && shutdown.recv_timeout(extra).is_ok() {
            break;
        }

        let mut listener_gone = false;
        select! {
            recv(shutdown) -> msg => match msg {
                Ok(()) => break,
                Err(_) => listener_gone = true,
            },
            recv(wake) -> _ => {},
            default(tick_interval) => {},
        }
        if listener_gone {
            // Keep running without Ctrl-C handling.
            shutdown = never();
        }
    }
}

/// Waits for Ctrl-C on a dedicated thread with a single-threaded runtime.
fn spawn_shutdown_listener() -> Receiver<()> {
    let (tx, rx) = bounded(1);

    let spawned = thread::Builder::new()
        .name("tidyd-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!(error = %e, "cannot start signal runtime");
                    return;
                }
            };
            match runtime.block_on(tokio::signal::ctrl_c()) {
                Ok(()) => {
                    info!("shutdown requested");
                    let _ = tx.send(());
                }
                Err(e) => error!(error = %e, "cannot listen for Ctrl-C"),
            }
        });

    match spawned {
        Ok(_) => rx,
        Err(e) => {
            error!(error = %e, "cannot spawn signal thread");
            never()
        }
    }
}
