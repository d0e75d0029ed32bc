//! Application-level configuration loading: turn timing, retry policy and the word list.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SKETCH_GUESS_CONFIG_PATH";

const DEFAULT_SELECTION_TIMEOUT_SECS: u64 = 20;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 50;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5;
const DEFAULT_MAX_PLAYERS: usize = 10;

/// Bounded retry applied to optimistic room transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled after every conflict.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    word_selection_timeout: Duration,
    retry: RetryPolicy,
    sweep_interval: Option<Duration>,
    max_players: usize,
    words: Vec<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        words = config.words.len(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document, filling absent fields with defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// How long a drawer may take to pick a word.
    pub fn word_selection_timeout(&self) -> Duration {
        self.word_selection_timeout
    }

    /// Bounds of the optimistic transaction retries.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Period of the background selection sweeper; `None` disables it.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval
    }

    /// Seats per room.
    pub fn max_players(&self) -> usize {
        self.max_players
    }

    /// Words offered to drawers.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Replace the selection timeout, mainly for tests exercising the deadline.
    pub fn with_word_selection_timeout(mut self, timeout: Duration) -> Self {
        self.word_selection_timeout = timeout;
        self
    }

    /// Replace the word list.
    pub fn with_words(mut self, words: Vec<String>) -> Self {
        self.words = words;
        self
    }

    /// Replace the room capacity.
    pub fn with_max_players(mut self, max_players: usize) -> Self {
        self.max_players = max_players;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    word_selection_timeout_secs: Option<u64>,
    #[serde(default)]
    transaction_max_attempts: Option<u32>,
    #[serde(default)]
    transaction_backoff_ms: Option<u64>,
    #[serde(default)]
    sweep_interval_secs: Option<u64>,
    #[serde(default)]
    max_players: Option<usize>,
    #[serde(default)]
    words: Option<Vec<String>>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let words = value
            .words
            .map(|words| {
                words
                    .into_iter()
                    .map(|word| word.trim().to_owned())
                    .filter(|word| !word.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|words| words.len() >= 2)
            .unwrap_or_else(default_words);

        let sweep_secs = value
            .sweep_interval_secs
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

        Self {
            word_selection_timeout: Duration::from_secs(
                value
                    .word_selection_timeout_secs
                    .unwrap_or(DEFAULT_SELECTION_TIMEOUT_SECS),
            ),
            retry: RetryPolicy {
                max_attempts: value
                    .transaction_max_attempts
                    .unwrap_or(DEFAULT_MAX_ATTEMPTS)
                    .max(1),
                initial_backoff: Duration::from_millis(
                    value.transaction_backoff_ms.unwrap_or(DEFAULT_BACKOFF_MS),
                ),
            },
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            max_players: value.max_players.unwrap_or(DEFAULT_MAX_PLAYERS).max(2),
            words,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in word list shipped with the binary.
fn default_words() -> Vec<String> {
    [
        "arca", "cruz", "pomba", "baleia", "coroa", "estrela", "pão", "peixe", "ovelha", "pastor",
        "templo", "harpa", "leão", "serpente", "maçã", "escada", "torre", "barco", "rede",
        "camelo", "jumento", "espada", "trombeta", "lâmpada", "pedra", "arco-íris", "montanha",
        "rio", "poço", "tenda",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}
