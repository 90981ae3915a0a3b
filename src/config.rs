use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_DATABASE_URL: &str = "sqlite:jubivote.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CHECK_INTERVAL_SECONDS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// How often the tally reporter looks for newly finished polls.
    pub check_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECONDS),
        }
    }
}

impl Config {
    /// Reads the environment. Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        let interval = parse_or(&lookup, "TALLY_CHECK_INTERVAL_SECONDS", DEFAULT_CHECK_INTERVAL_SECONDS)?;

        if max_connections == 0 {
            return Err(Error::invalid("DATABASE_MAX_CONNECTIONS", "must be at least 1"));
        }
        if interval == 0 {
            return Err(Error::invalid("TALLY_CHECK_INTERVAL_SECONDS", "must be at least 1"));
        }

        Ok(Self {
            database_url,
            max_connections,
            check_interval: Duration::from_secs(interval),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::invalid(key, format!("'{}': {}", raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite:jubivote.db");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.check_interval, Duration::from_secs(60));
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("DATABASE_MAX_CONNECTIONS", "1"),
            ("TALLY_CHECK_INTERVAL_SECONDS", " 5 "),
        ])
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.check_interval, Duration::from_secs(5));
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(matches!(
            config_from(&[("DATABASE_MAX_CONNECTIONS", "many")]),
            Err(Error::Invalid { field: "DATABASE_MAX_CONNECTIONS", .. })
        ));
        assert!(config_from(&[("TALLY_CHECK_INTERVAL_SECONDS", "0")]).is_err());
    }
}
