//! Configuration loading for the processes that embed the protocol runtime. Not used by
//! the core's hot path: only by external start-up code that builds a Protocol's
//! providers and binds its transports.
//!
//! Two ways to consume a config file:
//!
//! - [`load`] deserializes the whole document into a typed `serde::Deserialize` struct,
//!   the way most start-up code should prefer.
//! - [`Settings`] wraps a parsed `toml::Value` document for ad hoc dotted-path lookups
//!   (`"net.listen.addr"`) with a required default, for code that only needs a handful
//!   of scalars.

use serde::de::DeserializeOwned;
use std::path::Path;
use thiserror::Error;
use toml::Value;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads `path` and deserializes it into `T`.
pub fn load<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}

/// A parsed TOML document addressable by dotted path, with typed accessors that fall
/// back to a caller-supplied default rather than failing when a key is absent or the
/// wrong shape.
pub struct Settings {
    root: Value,
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Settings {
            root: toml::from_str(&raw)?,
        })
    }

    pub fn from_str(raw: &str) -> Result<Settings, ConfigError> {
        Ok(Settings {
            root: toml::from_str(raw)?,
        })
    }

    fn walk(&self, dotted_path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in dotted_path.split('.') {
            current = current.get(segment)?;
        }
        Some(current)
    }

    pub fn get_str<'a>(&'a self, dotted_path: &str, default: &'a str) -> &'a str {
        self.walk(dotted_path).and_then(Value::as_str).unwrap_or(default)
    }

    pub fn get_int(&self, dotted_path: &str, default: i64) -> i64 {
        self.walk(dotted_path).and_then(Value::as_integer).unwrap_or(default)
    }

    pub fn get_bool(&self, dotted_path: &str, default: bool) -> bool {
        self.walk(dotted_path).and_then(Value::as_bool).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Doc {
        net: Net,
    }

    #[derive(Deserialize)]
    struct Net {
        addr: String,
        max_clients: u16,
    }

    const SAMPLE: &str = r#"
[net]
addr = "127.0.0.1:28008"
max_clients = 256
tls_enabled = true
"#;

    #[test]
    fn dotted_path_lookups_with_defaults() {
        let settings = Settings::from_str(SAMPLE).unwrap();
        assert_eq!(settings.get_str("net.addr", "none"), "127.0.0.1:28008");
        assert_eq!(settings.get_int("net.max_clients", 0), 256);
        assert!(settings.get_bool("net.tls_enabled", false));
        assert_eq!(settings.get_str("net.missing", "fallback"), "fallback");
        assert_eq!(settings.get_int("missing.path", -1), -1);
    }

    #[test]
    fn typed_whole_document_load() {
        let doc: Doc = toml::from_str(SAMPLE).unwrap();
        assert_eq!(doc.net.addr, "127.0.0.1:28008");
        assert_eq!(doc.net.max_clients, 256);
    }
}
