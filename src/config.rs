//! Process configuration from the environment.

use std::num::NonZeroU64;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::middleware::Timeout;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            request_timeout: Timeout::DEFAULT,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Reads `PORT`, `REQUEST_TIMEOUT_SECS` and `SHUTDOWN_GRACE_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Config::from_env) with an arbitrary variable source.
    /// Unset variables take their default; set but unparseable ones are an error.
    /// A zero request timeout would fail every request, so it is rejected too.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            port: parse(&lookup, "PORT")?.unwrap_or(defaults.port),
            request_timeout: parse::<NonZeroU64>(&lookup, "REQUEST_TIMEOUT_SECS")?
                .map(|secs| Duration::from_secs(secs.get()))
                .unwrap_or(defaults.request_timeout),
            shutdown_grace: parse(&lookup, "SHUTDOWN_GRACE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_grace),
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("invalid {key}: {raw:?}")))
        .transpose()
}
