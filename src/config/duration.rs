//! Human-readable duration parsing for config values.
//!
//! The config file format (spec §6) stores intervals as plain millisecond
//! integers (`packet-interval 1000`), but a handful of fields accept a
//! suffix for readability. Both forms parse to the same internal value.

use std::fmt;
use std::str::FromStr;

/// Duration in microseconds.
///
/// # Supported formats
/// - Plain numbers: interpreted as milliseconds (e.g. `5000` = 5 seconds)
/// - `us`/`ms`/`s`/`m`/`h`/`d` suffix, decimals allowed (e.g. `"0.1ms"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Duration(pub u64);

impl Duration {
    pub const fn from_micros(us: u64) -> Self {
        Duration(us)
    }

    pub const fn from_millis(ms: u64) -> Self {
        Duration(ms * 1000)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Duration(secs * 1_000_000)
    }

    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    pub const fn as_millis(&self) -> u64 {
        self.0 / 1000
    }

    pub const fn as_secs(&self) -> u64 {
        self.0 / 1_000_000
    }

    pub const fn as_std(&self) -> std::time::Duration {
        std::time::Duration::from_micros(self.0)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(d: Duration) -> Self {
        std::time::Duration::from_micros(d.0)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Duration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Ok(ms) = s.parse::<u64>() {
            return Ok(Duration(ms * 1000));
        }
        if let Ok(ms) = s.parse::<f64>() {
            if ms < 0.0 {
                return Err("duration cannot be negative".to_string());
            }
            return Ok(Duration((ms * 1000.0) as u64));
        }

        let s_lower = s.to_lowercase();
        let (num_str, multiplier) = if s_lower.ends_with("us") {
            (&s[..s.len() - 2], 1u64)
        } else if s_lower.ends_with("ms") {
            (&s[..s.len() - 2], 1000u64)
        } else if s_lower.ends_with('s') {
            (&s[..s.len() - 1], 1_000_000u64)
        } else if s_lower.ends_with('m') {
            (&s[..s.len() - 1], 60 * 1_000_000u64)
        } else if s_lower.ends_with('h') {
            (&s[..s.len() - 1], 60 * 60 * 1_000_000u64)
        } else if s_lower.ends_with('d') {
            (&s[..s.len() - 1], 24 * 60 * 60 * 1_000_000u64)
        } else {
            return Err(format!(
                "invalid duration '{s}': expected a number or a suffixed value (us, ms, s, m, h, d)"
            ));
        };

        let num_str = num_str.trim();
        if let Ok(num) = num_str.parse::<u64>() {
            return Ok(Duration(num * multiplier));
        }
        let num: f64 = num_str
            .parse()
            .map_err(|_| format!("invalid number in duration '{num_str}'"))?;
        if num < 0.0 {
            return Err("duration cannot be negative".to_string());
        }
        Ok(Duration((num * multiplier as f64) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_numbers_as_milliseconds() {
        assert_eq!("0".parse::<Duration>().unwrap(), Duration(0));
        assert_eq!("5000".parse::<Duration>().unwrap(), Duration(5_000_000));
    }

    #[test]
    fn parses_suffixed_values() {
        assert_eq!("100us".parse::<Duration>().unwrap(), Duration(100));
        assert_eq!("5ms".parse::<Duration>().unwrap(), Duration(5_000));
        assert_eq!("5s".parse::<Duration>().unwrap(), Duration(5_000_000));
        assert_eq!("5m".parse::<Duration>().unwrap(), Duration(300_000_000));
        assert_eq!("1h".parse::<Duration>().unwrap(), Duration(3_600_000_000));
        assert_eq!("1d".parse::<Duration>().unwrap(), Duration(86_400_000_000));
        assert_eq!("0.1ms".parse::<Duration>().unwrap(), Duration(100));
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<Duration>().is_err());
        assert!("abc".parse::<Duration>().is_err());
        assert!("-5s".parse::<Duration>().is_err());
    }

    #[test]
    fn as_std_round_trips() {
        let d = Duration::from_secs(5);
        assert_eq!(d.as_std(), std::time::Duration::from_secs(5));
    }
}
