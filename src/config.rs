//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Missing or unparsable values fall back
//! to the defaults listed on each field.

use std::time::Duration;

/// Endpoint used when `REALTIME_ENDPOINT` is not set.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/ws";

/// Lobby countdown used when a match-start event carries no timestamp.
pub const DEFAULT_COUNTDOWN_SECS: u32 = 5;

/// Top-level client configuration.
///
/// Loaded once at startup via [`ClientConfig::from_env`] and handed to the
/// composition root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Endpoint the transport connects to. Default `http://localhost:8080/ws`.
    pub endpoint: String,

    /// Fallback lobby countdown in seconds. Default 5.
    pub countdown_fallback_secs: u32,

    /// Countdown tick period. Default 1 s.
    pub countdown_tick: Duration,

    /// How long a dice-roll presentation stays up. Default 5.5 s.
    pub dice_roll_duration: Duration,

    /// Bound of each consumer's inbound queue. Default 256.
    pub handler_queue_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            countdown_fallback_secs: DEFAULT_COUNTDOWN_SECS,
            countdown_tick: Duration::from_millis(1000),
            dice_roll_duration: Duration::from_millis(5500),
            handler_queue_capacity: 256,
        }
    }
}

/// Raised when a configuration value is present but unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration: {key} {reason}")]
pub struct ConfigError {
    /// Offending environment key.
    pub key: &'static str,
    /// What is wrong with it.
    pub reason: &'static str,
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `REALTIME_ENDPOINT` is set but blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the endpoint is present but blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let endpoint = match lookup("REALTIME_ENDPOINT") {
            Some(v) if v.trim().is_empty() => {
                return Err(ConfigError {
                    key: "REALTIME_ENDPOINT",
                    reason: "must not be blank",
                });
            }
            Some(v) => v,
            None => defaults.endpoint,
        };

        let countdown_fallback_secs = parse_positive(
            &lookup,
            "LOBBY_COUNTDOWN_SECS",
            defaults.countdown_fallback_secs,
        );
        let countdown_tick = Duration::from_millis(parse_positive(
            &lookup,
            "COUNTDOWN_TICK_MILLIS",
            1000,
        ));
        let dice_roll_duration =
            Duration::from_millis(parse_positive(&lookup, "DICE_ROLL_MILLIS", 5500));
        let handler_queue_capacity = parse_positive(
            &lookup,
            "HANDLER_QUEUE_CAPACITY",
            defaults.handler_queue_capacity,
        );

        Ok(Self {
            endpoint,
            countdown_fallback_secs,
            countdown_tick,
            dice_roll_duration,
            handler_queue_capacity,
        })
    }
}

/// Parses `key` as a non-zero `T`, returning `default` on missing, invalid
/// or zero values.
fn parse_positive<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialEq + Default,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .filter(|v: &T| *v != T::default())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = ClientConfig::from_lookup(|_| None);
        assert_eq!(config, Ok(ClientConfig::default()));
    }

    #[test]
    fn values_override_defaults() {
        let config = tokio_test::assert_ok!(ClientConfig::from_lookup(lookup_from(&[
            ("REALTIME_ENDPOINT", "ws://game.local/ws"),
            ("LOBBY_COUNTDOWN_SECS", "3"),
            ("COUNTDOWN_TICK_MILLIS", "250"),
            ("HANDLER_QUEUE_CAPACITY", "8"),
        ])));
        assert_eq!(config.endpoint, "ws://game.local/ws");
        assert_eq!(config.countdown_fallback_secs, 3);
        assert_eq!(config.countdown_tick, Duration::from_millis(250));
        assert_eq!(config.handler_queue_capacity, 8);
    }

    #[test]
    fn invalid_and_zero_values_fall_back() {
        let config = tokio_test::assert_ok!(ClientConfig::from_lookup(lookup_from(&[
            ("LOBBY_COUNTDOWN_SECS", "soon"),
            ("HANDLER_QUEUE_CAPACITY", "0"),
        ])));
        assert_eq!(config.countdown_fallback_secs, DEFAULT_COUNTDOWN_SECS);
        assert_eq!(config.handler_queue_capacity, 256);
    }

    #[test]
    fn blank_endpoint_is_rejected() {
        let result = ClientConfig::from_lookup(lookup_from(&[("REALTIME_ENDPOINT", " ")]));
        tokio_test::assert_err!(result);
    }
}
