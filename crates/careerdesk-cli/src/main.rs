//! careerdesk - command-line front end for the back-office session.
//!
//! Signs in against the API, keeps the session between runs, and shows what
//! the route guard would do with a given page.

mod cli;
mod commands;

use std::io;
use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use careerdesk_core::storage::{Keychain, StoreCipher};
use careerdesk_core::{Config, SessionStores};
use cli::{Command, USAGE};

// ============================================================================
// Constants
// ============================================================================

/// Log directory under the cache directory
const LOG_DIR: &str = "logs";

/// Daily log file prefix for long-running commands
const LOG_FILE_PREFIX: &str = "careerdesk.log";

/// Exit code for a bad command line
const USAGE_EXIT_CODE: i32 = 2;

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, filtered by RUST_LOG (default `warn`). When `log_dir`
/// is given they are also written to a daily file there; the returned guard
/// must stay alive until exit so the file writer flushes.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// Key for the durable store, or None to store plaintext
fn store_cipher(config: &Config) -> Option<StoreCipher> {
    if !config.encrypt_store {
        return None;
    }
    match Keychain::open().and_then(|keychain| keychain.store_cipher()) {
        Ok(cipher) => Some(cipher),
        Err(e) => {
            warn!(error = %e, "Keychain unavailable, session store will not be encrypted");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            std::process::exit(USAGE_EXIT_CODE);
        }
    };

    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load()?;
    let cache_dir = config.cache_dir()?;
    let log_dir = cache_dir.join(LOG_DIR);

    let _log_guard = init_tracing(command.is_long_running().then_some(log_dir.as_path()));
    info!(?command, "careerdesk starting");

    let stores = SessionStores::open(&cache_dir, store_cipher(&config));
    commands::run(command, &mut config, stores).await
}
