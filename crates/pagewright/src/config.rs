//! Configuration loaded from environment variables.

use std::env;

use anyhow::{Context, Result};

use crate::query::{Backend, Capabilities, CountIdiom};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Database connection URL, when the caller lets the engine connect.
    pub database_url: Option<String>,

    /// Backend the plans are rendered for (default: inferred from the URL, else postgres).
    pub backend: Backend,

    /// Override for copying the data restriction into the count subquery.
    pub copy_restriction: Option<bool>,

    /// Override for the count subquery idiom.
    pub count_idiom: Option<CountIdiom>,

    /// Per-page statement timeout in seconds (default: 10).
    pub statement_timeout_secs: u64,

    /// Largest page size served; larger limits are capped.
    pub max_limit: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            backend: Backend::Postgres,
            copy_restriction: None,
            count_idiom: None,
            statement_timeout_secs: 10,
            max_limit: None,
        }
    }
}

impl Config {
    /// Load configuration from `.env` and environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let backend = match lookup("PAGEWRIGHT_BACKEND") {
            Some(name) => name
                .parse::<Backend>()
                .map_err(anyhow::Error::msg)
                .context("PAGEWRIGHT_BACKEND must be postgres, mysql or sqlite")?,
            None => database_url
                .as_deref()
                .and_then(Backend::from_database_url)
                .unwrap_or(Backend::Postgres),
        };

        let copy_restriction = lookup("PAGEWRIGHT_COPY_RESTRICTION")
            .map(|v| parse_bool(&v))
            .transpose()
            .context("PAGEWRIGHT_COPY_RESTRICTION must be true or false")?;

        let count_idiom = lookup("PAGEWRIGHT_COUNT_IDIOM")
            .map(|v| v.parse::<CountIdiom>().map_err(anyhow::Error::msg))
            .transpose()
            .context("PAGEWRIGHT_COUNT_IDIOM must be in or exists")?;

        let statement_timeout_secs = lookup("PAGEWRIGHT_STATEMENT_TIMEOUT_SECS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .context("PAGEWRIGHT_STATEMENT_TIMEOUT_SECS must be a valid u64")?;

        let max_limit = lookup("PAGEWRIGHT_MAX_LIMIT")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("PAGEWRIGHT_MAX_LIMIT must be a valid u64")?;
        if max_limit == Some(0) {
            anyhow::bail!("PAGEWRIGHT_MAX_LIMIT must be at least 1");
        }

        Ok(Self {
            database_url,
            backend,
            copy_restriction,
            count_idiom,
            statement_timeout_secs,
            max_limit,
        })
    }

    /// Backend defaults with the configured overrides applied.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities_for(self.backend)
    }

    /// Defaults of `backend` with the configured overrides applied.
    pub fn capabilities_for(&self, backend: Backend) -> Capabilities {
        let defaults = backend.capabilities();
        Capabilities {
            supports_copy_restriction: self
                .copy_restriction
                .unwrap_or(defaults.supports_copy_restriction),
            preferred_count_idiom: self.count_idiom.unwrap_or(defaults.preferred_count_idiom),
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("'{other}' is not a boolean"),
    }
}
