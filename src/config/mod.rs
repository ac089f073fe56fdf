//! Configuration file reading for the server and client binaries.
//!
//! Both daemons share the same on-disk format (spec §6): whitespace
//! separated `key value` lines, `#`-prefixed comments, unknown keys
//! silently ignored, missing keys fall back to documented defaults.

use std::collections::HashMap;
use std::str::FromStr;

use crate::errors::ConfigError;

pub mod client;
pub mod duration;
pub mod server;

pub use client::ClientConfig;
pub use duration::Duration;
pub use server::ServerConfig;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parse a `key value` config file into a raw string map.
///
/// Lines starting with `#` are comments. The key is the first
/// whitespace-delimited token; the value is everything after the first
/// run of whitespace, trimmed. Blank lines and lines with no value are
/// skipped.
pub(crate) fn parse_kv_file(path: &str) -> Result<HashMap<String, String>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Open {
        path: path.to_string(),
        source,
    })?;

    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let key = match parts.next() {
            Some(k) if !k.is_empty() => k,
            _ => continue,
        };
        let value = match parts.next() {
            Some(v) => v.trim(),
            None => continue,
        };
        if value.is_empty() {
            continue;
        }
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

pub(crate) fn get_str(map: &HashMap<String, String>, key: &str, default: &str) -> String {
    map.get(key).cloned().unwrap_or_else(|| default.to_string())
}

pub(crate) fn get_bool(map: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match map.get(key) {
        Some(v) => v == "yes",
        None => default,
    }
}

pub(crate) fn get_parsed<T>(
    map: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match map.get(key) {
        Some(v) => v.parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v.clone(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.conf");
        std::fs::write(
            &path,
            "# a comment\ncontrol-port 5000\nunicast-enable yes\n\ndb-host 10.0.0.1\n",
        )
        .unwrap();

        let map = parse_kv_file(path.to_str().unwrap()).unwrap();
        assert_eq!(map.get("control-port").unwrap(), "5000");
        assert_eq!(map.get("unicast-enable").unwrap(), "yes");
        assert_eq!(map.get("db-host").unwrap(), "10.0.0.1");
        assert!(!map.contains_key("#"));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = parse_kv_file("/nonexistent/path/to/config").unwrap_err();
        assert!(matches!(err, ConfigError::Open { .. }));
    }
}
