//! Server configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) yields a
//! working development server on `127.0.0.1:30041`.

use std::path::Path;
use std::time::Duration;

use chrono::TimeDelta;
use noughts_match::UserId;
use noughts_session::{Identity, TokenTable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on every period and window, one day.
pub const MAX_PERIOD_SECS: u64 = 86_400;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A seeded identity for the built-in token table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub token: String,
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. "0.0.0.0:30041").
    pub bind_addr: String,
    /// Per-step read deadline during the ping/pong/ack/ready handshake.
    pub handshake_timeout_secs: u64,
    /// Rolling read deadline on a game channel once it is ready.
    pub keepalive_timeout_secs: u64,
    /// Transport ping period on game channels.
    pub ping_interval_secs: u64,
    /// Absolute lifetime of a lobby channel, counted from connect time.
    pub lobby_window_secs: u64,
    pub lobby_idle_timeout_secs: u64,
    pub lobby_ping_interval_secs: u64,
    /// How long a rematch request stays pending.
    pub rematch_window_secs: u64,
    /// How long a challenge stays `waiting` before it is purged.
    pub challenge_window_secs: u64,
    /// How recent a heartbeat must be to count a user as online.
    pub presence_window_secs: u64,
    /// Period of the background expiry sweep.
    pub sweep_interval_secs: u64,
    /// Time allowed for a client to send its HTTP request line.
    pub upgrade_timeout_secs: u64,
    /// Stored on every new game. Not enforced by the server.
    pub default_session_timeout_mins: u32,
    /// Seeds the built-in token table.
    pub users: Vec<UserEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:30041".to_string(),
            handshake_timeout_secs: 5,
            keepalive_timeout_secs: 60,
            ping_interval_secs: 30,
            lobby_window_secs: 30,
            lobby_idle_timeout_secs: 35,
            lobby_ping_interval_secs: 10,
            rematch_window_secs: 80,
            challenge_window_secs: 30,
            presence_window_secs: 300,
            sweep_interval_secs: 15,
            upgrade_timeout_secs: 5,
            default_session_timeout_mins: 60,
            users: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("handshake_timeout_secs", self.handshake_timeout_secs),
            ("keepalive_timeout_secs", self.keepalive_timeout_secs),
            ("ping_interval_secs", self.ping_interval_secs),
            ("lobby_window_secs", self.lobby_window_secs),
            ("lobby_idle_timeout_secs", self.lobby_idle_timeout_secs),
            ("lobby_ping_interval_secs", self.lobby_ping_interval_secs),
            ("rematch_window_secs", self.rematch_window_secs),
            ("challenge_window_secs", self.challenge_window_secs),
            ("presence_window_secs", self.presence_window_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("upgrade_timeout_secs", self.upgrade_timeout_secs),
        ];
        for (name, secs) in periods {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
            if secs > MAX_PERIOD_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be at most {MAX_PERIOD_SECS}"
                )));
            }
        }
        if self.bind_addr.is_empty() {
            return Err(ConfigError::Invalid("bind_addr is empty".into()));
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.keepalive_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn lobby_window(&self) -> Duration {
        Duration::from_secs(self.lobby_window_secs)
    }

    pub fn lobby_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.lobby_idle_timeout_secs)
    }

    pub fn lobby_ping_interval(&self) -> Duration {
        Duration::from_secs(self.lobby_ping_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn upgrade_timeout(&self) -> Duration {
        Duration::from_secs(self.upgrade_timeout_secs)
    }

    pub fn rematch_window(&self) -> TimeDelta {
        seconds(self.rematch_window_secs)
    }

    pub fn challenge_window(&self) -> TimeDelta {
        seconds(self.challenge_window_secs)
    }

    pub fn presence_window(&self) -> TimeDelta {
        seconds(self.presence_window_secs)
    }

    /// The `[[users]]` entries as a token table.
    pub fn token_table(&self) -> TokenTable {
        self.users
            .iter()
            .map(|user| {
                let identity = Identity {
                    id: user.id,
                    name: user.name.clone(),
                    is_admin: user.is_admin,
                };
                (user.token.clone(), identity)
            })
            .collect()
    }
}

/// Wall-clock span for comparing against stored timestamps. Saturates.
fn seconds(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}
