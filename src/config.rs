//! Gateway configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`).

use std::net::SocketAddr;

use crate::runtime::CoreSettings;

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `127.0.0.1:3000`).
    pub listen_addr: SocketAddr,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// Capacity of the request queue feeding the connection core.
    pub core_queue_capacity: usize,

    /// Start with every connection unplugged.
    pub start_unplugged: bool,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()?;

        Ok(Self {
            listen_addr,
            event_bus_capacity: parse_env("EVENT_BUS_CAPACITY", 1_000),
            core_queue_capacity: parse_env("CORE_QUEUE_CAPACITY", 1_024),
            start_unplugged: parse_env_bool("START_UNPLUGGED", false),
        })
    }

    /// Settings handed to [`crate::runtime::spawn_core`].
    #[must_use]
    pub const fn core_settings(&self) -> CoreSettings {
        CoreSettings {
            queue_capacity: self.core_queue_capacity,
            start_unplugged: self.start_unplugged,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    parse_bool(std::env::var(key).ok().as_deref()).unwrap_or(default)
}

fn parse_bool(raw: Option<&str>) -> Option<bool> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("true" | "1") => Some(true),
        Some("false" | "0") => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn bool_values_are_case_insensitive() {
        assert_eq!(parse_bool(Some("TRUE")), Some(true));
        assert_eq!(parse_bool(Some("True")), Some(true));
        assert_eq!(parse_bool(Some("0")), Some(false));
        assert_eq!(parse_bool(Some("False")), Some(false));
    }

    #[test]
    fn unknown_bool_values_fall_back() {
        assert_eq!(parse_bool(Some("yes")), None);
        assert_eq!(parse_bool(None), None);
        assert!(parse_env_bool("PLUG_GATEWAY_TEST_UNSET_FLAG", true));
    }

    #[test]
    fn missing_numbers_use_default() {
        let value: usize = parse_env("PLUG_GATEWAY_TEST_UNSET_NUMBER", 42);
        assert_eq!(value, 42);
    }

    #[test]
    fn core_settings_mirror_config() {
        let config = GatewayConfig {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            event_bus_capacity: 8,
            core_queue_capacity: 16,
            start_unplugged: true,
        };
        let settings = config.core_settings();
        assert_eq!(settings.queue_capacity, 16);
        assert!(settings.start_unplugged);
    }
}
