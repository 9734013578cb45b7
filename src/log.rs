//! Initialisation of the program logger.
//!
//! Messages go to the console (coloured when attached to a terminal) and, for commands which
//! write results, to two log files in the output folder: one for ordinary progress messages and
//! one for warnings and errors.
use anyhow::{Context, Result, bail};
use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use fern::{Dispatch, FormatCallback};
use log::{Level, LevelFilter, Record};
use std::env;
use std::fmt::{Arguments, Display};
use std::fs::{File, OpenOptions};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::OnceLock;

/// Set once the logger has been installed
static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// The log level used when neither the environment nor `settings.toml` gives one
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// The environment variable which overrides the log level
pub const LOG_LEVEL_ENV_VAR: &str = "GRIDPLAN_LOG_LEVEL";

/// Progress messages (info and below) are written here
const LOG_INFO_FILE_NAME: &str = "gridplan_info.log";

/// Warnings and errors are written here
const LOG_ERROR_FILE_NAME: &str = "gridplan_error.log";

/// Whether the program logger has been initialised
pub fn is_logger_initialised() -> bool {
    LOGGER_INIT.get().is_some()
}

/// Install the program logger.
///
/// The level is taken from the `GRIDPLAN_LOG_LEVEL` environment variable if set, otherwise from
/// `settings.toml`, otherwise it is `info`. Accepted levels are `off`, `error`, `warn`, `info`,
/// `debug` and `trace`.
///
/// The logger can only be installed once per process.
///
/// # Arguments
///
/// * `log_level_from_settings`: The log level given in `settings.toml`
/// * `log_file_path`: Folder in which to create log files, if any
pub fn init(log_level_from_settings: Option<&str>, log_file_path: Option<&Path>) -> Result<()> {
    let from_env = env::var(LOG_LEVEL_ENV_VAR).ok();
    let log_level = resolve_log_level(from_env.as_deref(), log_level_from_settings)?;

    let mut dispatch = console_dispatch(log_level);
    if let Some(dir) = log_file_path {
        dispatch = dispatch.chain(file_dispatch(dir, log_level)?);
    }

    dispatch.apply().context("Logger already initialised")?;
    LOGGER_INIT.get_or_init(|| ());

    Ok(())
}

/// Choose the log level, preferring the environment variable over the settings file
fn resolve_log_level(from_env: Option<&str>, from_settings: Option<&str>) -> Result<LevelFilter> {
    match from_env {
        Some(level) => parse_log_level(level)
            .with_context(|| format!("Invalid value for {LOG_LEVEL_ENV_VAR}")),
        None => parse_log_level(from_settings.unwrap_or(DEFAULT_LOG_LEVEL)),
    }
}

/// Convert a log level name (case insensitive) to a [`LevelFilter`]
pub fn parse_log_level(name: &str) -> Result<LevelFilter> {
    let level = match name.trim().to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        unknown => bail!("Unknown log level: {unknown}"),
    };

    Ok(level)
}

/// Progress messages to stdout, warnings and errors to stderr
fn console_dispatch(log_level: LevelFilter) -> Dispatch {
    let colours = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);
    let colour_stdout = std::io::stdout().is_terminal().then_some(colours);
    let colour_stderr = std::io::stderr().is_terminal().then_some(colours);

    Dispatch::new()
        .chain(
            Dispatch::new()
                .filter(|metadata| metadata.level() > Level::Warn)
                .format(move |out, message, record| {
                    write_log_maybe_coloured(out, message, record, colour_stdout.as_ref());
                })
                .level(log_level)
                .chain(std::io::stdout()),
        )
        .chain(
            Dispatch::new()
                .format(move |out, message, record| {
                    write_log_maybe_coloured(out, message, record, colour_stderr.as_ref());
                })
                .level(log_level.min(LevelFilter::Warn))
                .chain(std::io::stderr()),
        )
}

/// Write progress and problems to separate files in the output folder.
///
/// The info file records at least `info` messages whatever the console level.
fn file_dispatch(dir: &Path, log_level: LevelFilter) -> Result<Dispatch> {
    let create = |file_name: &str| -> Result<File> {
        let file_path = dir.join(file_name);
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&file_path)
            .with_context(|| format!("Failed to create log file {}", file_path.display()))
    };

    Ok(Dispatch::new()
        .format(write_log_plain)
        .chain(
            Dispatch::new()
                .filter(|metadata| metadata.level() > Level::Warn)
                .level(log_level.max(LevelFilter::Info))
                .chain(create(LOG_INFO_FILE_NAME)?),
        )
        .chain(
            Dispatch::new()
                .level(LevelFilter::Warn)
                .chain(create(LOG_ERROR_FILE_NAME)?),
        ))
}

/// Shorten targets inside this crate, e.g. `gridplan::topology` becomes `topology`
fn short_target(target: &str) -> &str {
    target.strip_prefix("gridplan::").unwrap_or(target)
}

fn write_log<T: Display>(out: FormatCallback, level: T, target: &str, message: &Arguments) {
    let timestamp = Local::now().format("%H:%M:%S");
    let target = short_target(target);

    out.finish(format_args!("[{timestamp} {level} {target}] {message}"));
}

fn write_log_plain(out: FormatCallback, message: &Arguments, record: &Record) {
    write_log(out, record.level(), record.target(), message);
}

fn write_log_maybe_coloured(
    out: FormatCallback,
    message: &Arguments,
    record: &Record,
    colours: Option<&ColoredLevelConfig>,
) {
    match colours {
        Some(colours) => write_log(out, colours.color(record.level()), record.target(), message),
        None => write_log_plain(out, message, record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("off", LevelFilter::Off)]
    #[case("WARN", LevelFilter::Warn)]
    #[case(" debug ", LevelFilter::Debug)]
    fn test_parse_log_level(#[case] name: &str, #[case] expected: LevelFilter) {
        assert_eq!(parse_log_level(name).unwrap(), expected);
    }

    #[test]
    fn test_parse_log_level_unknown() {
        assert!(parse_log_level("verbose").is_err());
    }

    #[rstest]
    #[case(None, None, LevelFilter::Info)]
    #[case(None, Some("error"), LevelFilter::Error)]
    #[case(Some("trace"), Some("error"), LevelFilter::Trace)]
    fn test_resolve_log_level(
        #[case] from_env: Option<&str>,
        #[case] from_settings: Option<&str>,
        #[case] expected: LevelFilter,
    ) {
        let level = resolve_log_level(from_env, from_settings).unwrap();
        assert_eq!(level, expected);
    }

    #[test]
    fn test_resolve_log_level_bad_env() {
        let err = resolve_log_level(Some("loud"), Some("info")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for GRIDPLAN_LOG_LEVEL");
    }

    #[test]
    fn test_short_target() {
        assert_eq!(short_target("gridplan::optimisation"), "optimisation");
        assert_eq!(short_target("highs"), "highs");
    }
}
