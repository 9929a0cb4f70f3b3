use std::{path::Path, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{ExtractorConfig, PaletteError, PatternMode, PatternOptions, Result};

pub const ENV_POLL_INTERVAL: &str = "POLL_INTERVAL_SECONDS";
pub const ENV_PATTERN_MODE: &str = "PATTERN_MODE";
pub const ENV_PATTERN_LENGTH: &str = "PATTERN_LENGTH";
pub const ENV_PATTERN_STEP: &str = "PATTERN_STEP";
pub const ENV_FETCH_TIMEOUT: &str = "FETCH_TIMEOUT_SECONDS";

/// Longest accepted poll interval: one day.
pub const MAX_POLL_INTERVAL_SECS: u64 = 86_400;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub poll: PollConfig,
    pub pattern: PatternOptions,
    pub extractor: ExtractorConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|err| PaletteError::Config(format!("{}: {err}", path.display())))
    }

    /// Overlays values found through `lookup`. Unset keys leave the current
    /// value alone; set but unparsable keys are an error.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_var::<u64, _>(&lookup, ENV_POLL_INTERVAL)? {
            self.poll.interval_secs = value;
        }
        if let Some(value) = parse_var::<u64, _>(&lookup, ENV_FETCH_TIMEOUT)? {
            self.poll.fetch_timeout_secs = value;
        }
        if let Some(mode) = parse_var::<PatternMode, _>(&lookup, ENV_PATTERN_MODE)? {
            self.pattern.mode = mode;
        }
        if let Some(length) = parse_var::<usize, _>(&lookup, ENV_PATTERN_LENGTH)? {
            self.pattern.length = length;
        }
        if let Some(step) = parse_var::<usize, _>(&lookup, ENV_PATTERN_STEP)? {
            self.pattern.step = step;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.poll.validate()?;
        self.pattern.validate()?;
        self.extractor.validate()
    }
}

/// Polling cadence and per-tick limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    /// Stop after this many ticks; `None` polls until stopped.
    pub max_ticks: Option<u64>,
    pub fetch_timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            max_ticks: None,
            fetch_timeout_secs: 15,
        }
    }
}

impl PollConfig {
    /// Time between the starts of two consecutive polls.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Upper bound for a single artwork download.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_POLL_INTERVAL_SECS).contains(&self.interval_secs) {
            return Err(PaletteError::Config(format!(
                "poll interval must be between 1 and {MAX_POLL_INTERVAL_SECS} seconds, got {}",
                self.interval_secs
            )));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(PaletteError::Config(
                "fetch timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    raw.parse::<T>()
        .map(Some)
        .map_err(|err| PaletteError::Config(format!("{key}={raw}: {err}")))
}
