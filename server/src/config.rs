use crate::error::ConfigError;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding `index.html` and the assets served under `/static`
    pub static_dir: PathBuf,
    /// Outbound payloads buffered per session before new ones are dropped
    pub session_queue_capacity: usize,
    pub command_queue_capacity: usize,
    /// Largest inbound WebSocket message accepted, in bytes
    pub max_message_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            static_dir: PathBuf::from("public"),
            session_queue_capacity: 256,
            command_queue_capacity: 1024,
            max_message_bytes: 64 * 1024,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `HOST`, `PORT`, `STATIC_DIR`,
    /// `SESSION_QUEUE_CAPACITY`, `COMMAND_QUEUE_CAPACITY` and `MAX_MESSAGE_BYTES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            static_dir: lookup("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            session_queue_capacity: parse_var(
                &lookup,
                "SESSION_QUEUE_CAPACITY",
                defaults.session_queue_capacity,
            )?,
            command_queue_capacity: parse_var(
                &lookup,
                "COMMAND_QUEUE_CAPACITY",
                defaults.command_queue_capacity,
            )?,
            max_message_bytes: parse_var(&lookup, "MAX_MESSAGE_BYTES", defaults.max_message_bytes)?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if self.session_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "session_queue_capacity must be > 0".to_string(),
            ));
        }
        if self.command_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "command_queue_capacity must be > 0".to_string(),
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_message_bytes must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::InvalidEnv {
                var,
                value,
                reason: e.to_string(),
            })
        }
    }
}
