use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Timing and sizing knobs used by every room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSettings {
    /// Per-subscriber send timeout
    pub broadcast_timeout: Duration,
    /// Mailbox capacity of each real-time subscriber
    pub subscriber_buffer: usize,
    /// Gap between the "not enough players" warning and the lobby redirect
    pub abort_redirect_delay: Duration,
    /// How long a player may have no open stream before being treated as gone
    pub disconnect_grace: Duration,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            broadcast_timeout: Duration::from_millis(1000),
            subscriber_buffer: 10,
            abort_redirect_delay: Duration::from_millis(3000),
            disconnect_grace: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Directory holding places.json and challenges.json
    pub data_dir: Option<PathBuf>,
    pub room: RoomSettings,
}

impl ServerConfig {
    /// Loads configuration from the environment (and `.env`, if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds configuration from any variable source; unset or blank values
    /// fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let defaults = RoomSettings::default();

        let bind_addr = parse_or(get("SUS_BIND_ADDR"), "SUS_BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;
        let data_dir = get("SUS_DATA_DIR").map(PathBuf::from);

        let room = RoomSettings {
            broadcast_timeout: millis_or(
                get("SUS_BROADCAST_TIMEOUT_MS"),
                "SUS_BROADCAST_TIMEOUT_MS",
                defaults.broadcast_timeout,
            )?,
            subscriber_buffer: parse_or(
                get("SUS_SUBSCRIBER_BUFFER"),
                "SUS_SUBSCRIBER_BUFFER",
                defaults.subscriber_buffer,
            )?,
            abort_redirect_delay: millis_or(
                get("SUS_ABORT_REDIRECT_DELAY_MS"),
                "SUS_ABORT_REDIRECT_DELAY_MS",
                defaults.abort_redirect_delay,
            )?,
            disconnect_grace: millis_or(
                get("SUS_DISCONNECT_GRACE_MS"),
                "SUS_DISCONNECT_GRACE_MS",
                defaults.disconnect_grace,
            )?,
        };

        // tokio mailboxes panic on a zero capacity
        if room.subscriber_buffer == 0 {
            return Err(ConfigError::Invalid {
                name: "SUS_SUBSCRIBER_BUFFER",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            data_dir,
            room,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            data_dir: None,
            room: RoomSettings::default(),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match value {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn millis_or(value: Option<String>, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let millis = parse_or(value, name, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}
