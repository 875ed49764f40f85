//! # Logging Setup
//!
//! `lib_livefeed` logs through the `log` facade and never installs a logger by
//! itself. Applications embedding it can call `setup_logging` once at startup
//! to get timestamped console output and, optionally, a log file per run.

use std::fs;
use std::path::Path;

use anyhow::Result;

/// Maps a textual level to a `log::LevelFilter`. Unknown values fall back to
/// `Info`.
pub fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.trim().to_lowercase().as_str() {
        "off" => log::LevelFilter::Off,
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" | "fatal" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    }
}

/// Installs a global fern logger.
///
/// # Arguments
/// * `log_level` - `trace`, `debug`, `info`, `warn`, `error` or `off`.
/// * `log_dir` - When set, a `livefeed_<timestamp>.log` file is written there
///   and older `.log` files in that directory are removed.
///
/// # Errors
/// Fails if the log directory cannot be prepared or a global logger is
/// already installed.
pub fn setup_logging(log_level: &str, log_dir: Option<&Path>) -> Result<()> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .chain(std::io::stdout());

    if let Some(log_dir) = log_dir {
        fs::create_dir_all(log_dir)?;
        cleanup_old_logs(log_dir)?;

        let log_file_name = format!("livefeed_{}.log", chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
        dispatch = dispatch.chain(fern::log_file(log_dir.join(log_file_name))?);
    }

    dispatch.apply()?;
    Ok(())
}

/// Removes every `.log` file in `log_dir` except the most recently modified.
fn cleanup_old_logs(log_dir: &Path) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "log"))
        .filter_map(|e| {
            let modified = e.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, e.path()))
        })
        .collect();

    // Newest first
    entries.sort_by_key(|(modified, _)| std::cmp::Reverse(*modified));

    for (_, path) in entries.iter().skip(1) {
        if let Err(e) = fs::remove_file(path) {
            eprintln!("Failed to delete old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}
