//! Tracing subscriber setup.
//!
//! Configuration is read before the configured subscriber can exist, so
//! [`bootstrap`] runs that step under a temporary stderr subscriber.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Run `f` with a stderr subscriber scoped to the current thread. Used while
/// the configuration that decides the real sink is still being loaded.
pub fn bootstrap<T>(f: impl FnOnce() -> T) -> T {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}

/// Route panics through the log before the default hook prints them.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "unhandled panic");
        default_hook(info);
    }));
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Never fails: an unopenable log file falls back to stderr, and a second call
/// leaves the first subscriber in place.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file = config.file.as_ref().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Some(f),
            Err(e) => {
                eprintln!(
                    "warning: cannot open log file {} ({}), logging to stderr",
                    path.display(),
                    e
                );
                None
            }
        }
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match (file, config.json) {
        (Some(f), true) => builder.json().with_ansi(false).with_writer(Mutex::new(f)).try_init(),
        (Some(f), false) => builder.with_ansi(false).with_writer(Mutex::new(f)).try_init(),
        (None, true) => builder.json().with_writer(std::io::stderr).try_init(),
        (None, false) => builder.with_writer(std::io::stderr).try_init(),
    };

    if let Err(e) = result {
        eprintln!("warning: logging already initialized: {}", e);
    }
}
