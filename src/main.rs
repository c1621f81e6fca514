//! fswatchd entry point.
//!
//! One thread runs everything latency-sensitive: it drains the kernel event
//! descriptor, dispatches control requests arriving over a channel from the
//! connection threads, and fires the housekeeping tick. Tree walks, root
//! teardowns and repair sweeps run on the worker pool.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::Duration;

use tracing::{error, info};

use fswatchd::config::{Config, DEFAULT_CONFIG_FILE};
use fswatchd::housekeeping::Housekeeper;
use fswatchd::kernel::KernelWatcher;
use fswatchd::pump::EventPump;
use fswatchd::service::Service;
use fswatchd::{handlers, logging, server, shutdown};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long the dispatcher waits for a request before looking at the kernel
/// descriptor and the tick deadline again.
const LOOP_TIMEOUT: Duration = Duration::from_millis(100);

struct Args {
    config_file: PathBuf,
    silent: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
        silent: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => print_help(),
            "-V" | "--version" => {
                println!("fswatchd {VERSION}");
                std::process::exit(0);
            }
            "-s" | "--silent" => args.silent = true,
            "-c" | "--config" => match iter.next() {
                Some(path) => args.config_file = PathBuf::from(path),
                None => print_help(),
            },
            _ => print_help(),
        }
    }

    args
}

fn print_help() -> ! {
    println!("Usage: fswatchd [options]");
    println!();
    println!("  -c, --config <file>  Read configuration from <file>");
    println!("                       (default: {DEFAULT_CONFIG_FILE})");
    println!("  -s, --silent         Turn off printing to stderr.");
    println!("  -V, --version        Print version and exit.");
    println!();
    println!("fswatchd is a filesystem change notification daemon. It recursively");
    println!("watches directory trees, queues the events that occur within them,");
    println!("and delivers those events to clients over a JSON control socket.");
    std::process::exit(1);
}

fn main() -> ExitCode {
    let args = parse_args();

    let mut config = Config::load(&args.config_file);
    if args.silent {
        // Command line wins over whatever the config file says.
        config.silent = true;
    }
    if !config.silent {
        eprintln!("Running fswatchd v{VERSION}...");
        config.print_banner();
    }

    let log_handle = match logging::init(&config) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("WARNING: failed to open log file ({e}); logging to stderr is off");
            None
        }
    };
    info!(version = VERSION, "initializing daemon");

    let kernel = match KernelWatcher::init() {
        Ok(kernel) => kernel,
        Err(e) => {
            error!("inotify failed to init: {e}");
            eprintln!("Failed to start fswatchd: inotify init failed: {e}");
            return ExitCode::from(2);
        }
    };

    let service = match Service::new(kernel.watches(), config.clone()) {
        Ok(service) => service,
        Err(e) => {
            error!("failed to start worker pool: {e}");
            eprintln!("Failed to start fswatchd: worker pool: {e}");
            return ExitCode::from(2);
        }
    };

    shutdown::install();
    service.restore_persisted();

    let (req_tx, req_rx) = mpsc::channel();
    if let Err(e) = server::spawn(config.port, req_tx) {
        error!(port = config.port, "failed to bind control socket: {e}");
        eprintln!("Failed to start fswatchd: cannot bind port {}: {e}", config.port);
        return ExitCode::from(3);
    }

    let mut pump = EventPump::new(kernel);
    let mut housekeeper = Housekeeper::new(args.config_file, log_handle);

    info!("entering event loop");
    loop {
        pump.drain(&service);
        housekeeper.maybe_tick(&service);

        match req_rx.recv_timeout(LOOP_TIMEOUT) {
            Ok(request) => {
                let reply = handlers::dispatch(&service, &request.frame);
                // A vanished client is its connection thread's problem.
                let _ = request.reply_tx.send(reply);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                error!("control channel disconnected, shutting down");
                break;
            }
        }

        if shutdown::requested() {
            info!("interrupt received, shutting down");
            break;
        }
    }

    service.persist_now();
    info!("shutdown complete");
    ExitCode::SUCCESS
}
