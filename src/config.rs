//! Application-level configuration loading, including the board word list.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};

use crate::state::game::{BOARD_SIZE, DEFAULT_CAPACITY, TeamColor, is_valid_word};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MINDLINK_CONFIG_PATH";
/// Storage I/O allowed inside a lifecycle transition.
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

/// How the team acting first is chosen for a new board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartingTeam {
    /// Red always starts.
    Red,
    /// Blue always starts.
    Blue,
    /// Drawn per match.
    Random,
}

impl StartingTeam {
    /// Resolve to a concrete team.
    pub fn pick<R: Rng + ?Sized>(self, rng: &mut R) -> TeamColor {
        match self {
            StartingTeam::Red => TeamColor::Red,
            StartingTeam::Blue => TeamColor::Blue,
            StartingTeam::Random => {
                if rng.random_bool(0.5) {
                    TeamColor::Red
                } else {
                    TeamColor::Blue
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    words: Vec<String>,
    match_capacity: usize,
    starting_team: StartingTeam,
    transition_timeout: Option<Duration>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        words = app_config.words.len(),
                        capacity = app_config.match_capacity,
                        "loaded configuration"
                    );
                    app_config
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

    /// Word list boards are drawn from.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Roster size of new matches.
    pub fn match_capacity(&self) -> usize {
        self.match_capacity
    }

    /// Starting team policy of new boards.
    pub fn starting_team(&self) -> StartingTeam {
        self.starting_team
    }

    /// Bound on storage I/O inside lifecycle transitions; `None` disables it.
    pub fn transition_timeout(&self) -> Option<Duration> {
        self.transition_timeout
    }

    /// Override the roster size.
    pub fn with_match_capacity(mut self, capacity: usize) -> Self {
        self.match_capacity = capacity.max(1);
        self
    }

    /// Override the starting team policy.
    pub fn with_starting_team(mut self, starting_team: StartingTeam) -> Self {
        self.starting_team = starting_team;
        self
    }

    /// Override the transition timeout.
    pub fn with_transition_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.transition_timeout = timeout;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            words: default_words(),
            match_capacity: DEFAULT_CAPACITY,
            starting_team: StartingTeam::Red,
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    words: Option<Vec<String>>,
    #[serde(default)]
    match_capacity: Option<usize>,
    #[serde(default)]
    starting_team: Option<StartingTeam>,
    #[serde(default)]
    transition_timeout_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();

        let words = match value.words {
            Some(words) => {
                let usable = words.iter().filter(|word| is_valid_word(word.trim())).count();
                if usable >= BOARD_SIZE {
                    words
                } else {
                    warn!(
                        usable,
                        required = BOARD_SIZE,
                        "configured word list too short; using built-in words"
                    );
                    defaults.words
                }
            }
            None => defaults.words,
        };

        Self {
            words,
            match_capacity: value
                .match_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.match_capacity),
            starting_team: value.starting_team.unwrap_or(defaults.starting_team),
            transition_timeout: match value.transition_timeout_ms {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => defaults.transition_timeout,
            },
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
        "apple", "anchor", "bank", "bark", "battery", "bell", "board", "bottle", "bridge",
        "button", "castle", "cell", "chair", "check", "circle", "cloud", "comet", "crane",
        "crown", "diamond", "dragon", "engine", "fan", "field", "fire", "forest", "ghost",
        "glass", "hammer", "horse", "ice", "jet", "key", "king", "knife", "lamp", "lemon",
        "light", "lock", "magnet", "mercury", "mine", "moon", "needle", "net", "night",
        "novel", "ocean", "orange", "palm", "pilot", "pipe", "plate", "port", "queen",
        "river", "rocket", "ruler", "satellite", "scale", "shadow", "ship", "spring",
        "square", "star", "table", "tower", "train", "wave", "whale",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}
