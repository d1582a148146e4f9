use std::str::FromStr;

const DEFAULT_DATABASE_PATH: &str = "mangagram.db";
const DEFAULT_PORT: u16 = 9000;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 12 * 60 * 60;
const DEFAULT_SWEEP_CONCURRENCY: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Configuration {
    pub database_path: String,
    pub teloxide_token: String,
    pub port: u16,
    /// Public URL of the webhook. Long polling is used when unset.
    pub public_url: Option<String>,
    pub sweep_interval_secs: u64,
    pub sweep_concurrency: usize,
    pub mangadex_credentials: Option<Credentials>,
}

impl Configuration {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let teloxide_token = non_empty("TELOXIDE_TOKEN").ok_or(ConfigurationError::Missing("TELOXIDE_TOKEN"))?;

        let mangadex_credentials = match (non_empty("MANGADEX_USERNAME"), non_empty("MANGADEX_PASSWORD")) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };

        Ok(Self {
            database_path: non_empty("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
            teloxide_token,
            port: parse_or(non_empty("PORT"), "PORT", DEFAULT_PORT)?,
            public_url: non_empty("PUBLIC_URL"),
            sweep_interval_secs: parse_positive(non_empty("SWEEP_INTERVAL_SECS"), "SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)?,
            sweep_concurrency: parse_or(non_empty("SWEEP_CONCURRENCY"), "SWEEP_CONCURRENCY", DEFAULT_SWEEP_CONCURRENCY)?
                .max(1),
            mangadex_credentials,
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, name: &'static str, default: T) -> Result<T, ConfigurationError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigurationError::Invalid { name, value }),
    }
}

/// Like `parse_or`, but zero is invalid. The sweep ticker cannot run with a zero period.
fn parse_positive(value: Option<String>, name: &'static str, default: u64) -> Result<u64, ConfigurationError> {
    match parse_or(value, name, default)? {
        0 => Err(ConfigurationError::Invalid { name, value: "0".to_string() }),
        parsed => Ok(parsed),
    }
}
