//! `gixflow` daemon shell (spec §6.2, SPEC_FULL §2 component F): CLI
//! parsing, config loading, logger setup, PID-file lifecycle, and wiring
//! the cache/resolver/decoder/pipeline/persistence components together.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info};

use gixflow::config::Config;
use gixflow::context::AppContext;
use gixflow::error::{GixflowError, Result};
use gixflow::persistence::{self, Store};
use gixflow::pipeline;
use gixflow::resolver::HickoryTxtLookup;

#[derive(Parser)]
#[command(name = "gixflow", about = "NetFlow v9 / IPFIX collector with ASN enrichment")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "/opt/gixflow/gixflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon, detaching from the controlling terminal.
    Start,
    /// Stop a running daemon by PID file.
    Stop,
    /// Run the collector in the foreground (reserved for a future
    /// exaBGP-learned-prefix integration; currently identical to `start`
    /// without daemonization).
    Exabgp,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("gixflow: failed to load config: {err}");
            return ExitCode::from(2);
        }
    };

    match cli.command {
        Command::Start => run_daemonized(config),
        Command::Exabgp => run_foreground(config),
        Command::Stop => stop(&config),
    }
}

fn init_logging(config: &Config) {
    let level = if config.debug { "debug" } else { "info" };
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level),
    );
    if let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
    {
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    let _ = builder.try_init();
}

fn run_daemonized(config: Config) -> ExitCode {
    let daemonize = daemonize::Daemonize::new().pid_file(&config.pid_file);
    if let Err(err) = daemonize.start() {
        let err = GixflowError::Daemonize(err.to_string());
        eprintln!("gixflow: {err}");
        return ExitCode::from(2);
    }
    run_foreground(config)
}

fn run_foreground(config: Config) -> ExitCode {
    init_logging(&config);
    match start_collector(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("gixflow: fatal startup error: {err}");
            ExitCode::from(2)
        }
    }
}

fn start_collector(config: Config) -> Result<()> {
    let dns: Option<Arc<dyn gixflow::resolver::TxtLookup>> = config.ip2asn.then(|| {
        match HickoryTxtLookup::from_system_conf() {
            Ok(lookup) => Arc::new(lookup) as Arc<dyn gixflow::resolver::TxtLookup>,
            Err(err) => {
                error!("resolver: falling back to always-miss DNS lookup: {err}");
                Arc::new(NullLookup) as Arc<dyn gixflow::resolver::TxtLookup>
            }
        }
    });

    let ctx = AppContext::build(&config, dns)?;

    let store = Store::open(&config.db_file)?;
    persistence::hydrate(&store, &ctx)?;

    let (receiver_handle, worker_handles) =
        pipeline::spawn(ctx.clone(), config.listen_port, config.netflow_queue, config.netflow_workers);

    info!(
        "gixflow: listening on :{} with {} worker(s), ip2asn={}, forwarding={}",
        config.listen_port, config.netflow_workers, config.ip2asn, config.forwardto_enable
    );

    let persistence_ctx = ctx.clone();
    let persistence_handle =
        std::thread::spawn(move || persistence::run(store, persistence_ctx));

    match receiver_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(GixflowError::Io(err)),
        Err(_) => error!("gixflow: receiver thread panicked"),
    }

    ctx.shut_down();
    for handle in worker_handles {
        let _ = handle.join();
    }
    let _ = persistence_handle.join();

    Ok(())
}

fn stop(config: &Config) -> ExitCode {
    let pid_text = match std::fs::read_to_string(&config.pid_file) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("gixflow: cannot read pid file {:?}: {err}", config.pid_file);
            return ExitCode::from(2);
        }
    };

    let pid: i32 = match pid_text.trim().parse() {
        Ok(pid) => pid,
        Err(_) => {
            eprintln!("gixflow: pid file {:?} does not contain a valid pid", config.pid_file);
            return ExitCode::from(2);
        }
    };

    // SAFETY: `pid` is a plain integer parsed from the daemon's own pid
    // file; sending SIGTERM to it has no memory-safety implications.
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result != 0 {
        eprintln!("gixflow: failed to signal pid {pid}: {}", std::io::Error::last_os_error());
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}

/// Used only when `ip2asn` is enabled but the system resolver can't be
/// constructed (e.g. no `/etc/resolv.conf`); every lookup misses, so the
/// resolver falls back to negative-caching rather than panicking at
/// startup.
struct NullLookup;
impl gixflow::resolver::TxtLookup for NullLookup {
    fn lookup_txt(&self, _name: &str) -> Vec<String> {
        Vec::new()
    }
}
