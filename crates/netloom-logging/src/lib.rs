//! Structured, leveled logging used by every other crate in the workspace. Nothing in
//! the core ever constructs its own sink: a [`Logger`] is built once by the embedding
//! process and threaded down through every constructor that needs one.
//!
//! Five levels are used throughout: `crit`, `error`, `info`, `debug`, `trace`.

pub use slog::{crit, debug, error, info, o, trace, Drain, Logger};

use sloggers::Config;
use std::path::Path;

/// Builds a terminal logger at the given level. This is the default for a process that
/// has not been handed an explicit logging configuration file.
pub fn init(level: &str) -> Logger {
    build_from_toml(&format!(
        r#"
type = "terminal"
level = "{}"
destination = "stderr"
"#,
        level
    ))
}

/// Loads a [`sloggers::LoggerConfig`] from a TOML file and builds the logger it
/// describes. Used by processes that want file-based, destination-configurable
/// logging instead of the terminal default.
pub fn from_file<P: AsRef<Path>>(path: P) -> Logger {
    let config: sloggers::LoggerConfig =
        serdeconv::from_toml_file(path).expect("error loading logging configuration file");
    config.build_logger().expect("error constructing logger from configuration")
}

/// A logger that discards everything written to it. Used as the default when a
/// component is constructed without an explicit parent logger, and throughout tests.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}

fn build_from_toml(toml: &str) -> Logger {
    let config: sloggers::LoggerConfig =
        serdeconv::from_toml_str(toml).expect("built-in logging configuration is malformed");
    config.build_logger().expect("error constructing logger")
}
