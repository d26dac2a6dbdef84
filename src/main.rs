//! anki-tts main entry point
//!
//! Two modes:
//! 1. `anki-tts [--config PATH]` watches the Anki reviewer through
//!    AnkiConnect and reads each card aloud until interrupted
//! 2. `anki-tts --extract FILE [--answer]` prints the speakable text of a
//!    saved card and exits

use anki_tts::speech::Notifier;
use anki_tts::state::config::Config;
use anki_tts::state::{CardEvent, ReviewSession};
use anki_tts::watcher::Watcher;
use anki_tts::{extract, AnkiTtsError, CardSide, Result};
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::{Duration, Instant};

/// Set by SIGINT/SIGTERM
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Granularity of the interruptible sleep between polls
const SHUTDOWN_CHECK: Duration = Duration::from_millis(50);

const USAGE: &str = "Usage: anki-tts [--debug] [--config PATH]
       anki-tts --extract FILE [--answer]";

#[cfg(unix)]
extern "C" fn handle_shutdown(_: nix::libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

/// Parsed command line
#[derive(Debug, Default)]
struct Options {
    debug: bool,
    config: Option<PathBuf>,
    extract: Option<PathBuf>,
    answer: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Options> {
    let mut options = Options::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--debug" | "-d" => options.debug = true,
            "--answer" => options.answer = true,
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                options.config = Some(PathBuf::from(path));
            }
            "--extract" => {
                let path = args.next().ok_or("--extract needs a file")?;
                options.extract = Some(PathBuf::from(path));
            }
            "--version" | "-V" => {
                println!("anki-tts {}", anki_tts::VERSION);
                process::exit(0);
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                process::exit(0);
            }
            other => return Err(AnkiTtsError::Config(format!("unknown argument: {}", other))),
        }
    }

    Ok(options)
}

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", USAGE);
            process::exit(2);
        }
    };

    // Initialize logger
    if options.debug {
        // Debug mode: write to anki-tts.log file
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("anki-tts.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Warning: Failed to open anki-tts.log for debug logging: {}", e);
                eprintln!("Continuing without file logging...");
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }

        info!(
            "anki-tts version {} starting (debug mode, logging to anki-tts.log)",
            anki_tts::VERSION
        );
    } else {
        // Normal mode: only errors unless RUST_LOG says otherwise
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Error)
            .parse_default_env()
            .init();
    }

    let result = match &options.extract {
        Some(path) => print_extracted(path, options.answer),
        None => run(&options),
    };

    if let Err(e) = result {
        error!("Fatal error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// `--extract`: print what would be spoken for a saved card
fn print_extracted(path: &Path, answer: bool) -> Result<()> {
    let html = std::fs::read_to_string(path)?;
    let side = if answer {
        CardSide::Answer
    } else {
        CardSide::Question
    };

    println!("{}", extract(&html, side, None));
    Ok(())
}

fn run(options: &Options) -> Result<()> {
    let config = match &options.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Config from {:?}", config.path());

    install_signal_handlers()?;

    let mut watcher = Watcher::from_config(&config)?;
    let (notifier, notifications) = Notifier::channel();
    let session = ReviewSession::new(config, notifier);

    eprintln!(
        "anki-tts {} watching Anki at {} (Ctrl+C to quit)",
        anki_tts::VERSION,
        session.config().ankiconnect_url()
    );

    while !SHUTDOWN.load(Ordering::Relaxed) {
        if let Some(event) = watcher.poll() {
            debug!("Reviewer event: {:?}", event);
            session.handle(event);
        }

        drain_notifications(&notifications);
        sleep_unless_shutdown(watcher.poll_interval());
    }

    info!("Shutting down");
    session.handle(CardEvent::SessionEnded);
    drain_notifications(&notifications);
    Ok(())
}

/// Status messages from the speech thread, shown on the main thread
fn drain_notifications(notifications: &Receiver<String>) {
    while let Ok(message) = notifications.try_recv() {
        eprintln!("anki-tts: {}", message);
    }
}

fn sleep_unless_shutdown(duration: Duration) {
    let deadline = Instant::now() + duration;
    while !SHUTDOWN.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(SHUTDOWN_CHECK.min(deadline - now));
    }
}

#[cfg(unix)]
fn install_signal_handlers() -> Result<()> {
    use nix::sys::signal::{self, SigHandler, Signal};

    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // Safety: the handler only stores to an atomic
        unsafe {
            signal::signal(sig, SigHandler::Handler(handle_shutdown)).map_err(|e| {
                AnkiTtsError::Other(format!("Failed to set {} handler: {}", sig, e))
            })?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handlers() -> Result<()> {
    Ok(())
}
