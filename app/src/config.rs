//! Startup configuration, read once from a JSON file.
//!
//! ```json
//! {
//!     "listen": "0.0.0.0:3070",
//!     "door_pin": 20,
//!     "relay_pin": 17,
//!     "open_alert_threshold_secs": 900,
//!     "notification_cooldown_secs": 900,
//!     "poll_interval_secs": 60,
//!     "webhook_url": "https://alerts.example.com/garage",
//!     "users": { "user": "password" }
//! }
//! ```

use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;
use std::{fmt, fs, io};

use json::JsonValue;

use crate::monitor::AlertPolicy;
use crate::relay::{PULSE_ON, PULSE_SETTLE};

pub const DEFAULT_PATH: &str = "/etc/garage-door-controller.json";

const DEFAULT_LISTEN: &str = "0.0.0.0:3070";
const DEFAULT_DOOR_PIN: u8 = 20; // header pin 38
const DEFAULT_RELAY_PIN: u8 = 17; // header pin 11
const FIFTEEN_MINUTES: u64 = 15 * 60;
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_ALERT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(json::Error),
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "unable to read config: {}", err),
            ConfigError::Parse(err) => write!(f, "config is not valid JSON: {}", err),
            ConfigError::Missing(key) => write!(f, "config is missing '{}'", key),
            ConfigError::Invalid(key, why) => write!(f, "config value '{}' is invalid: {}", key, why),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<json::Error> for ConfigError {
    fn from(err: json::Error) -> Self {
        ConfigError::Parse(err)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub listen: String,
    pub door_pin: u8,
    pub relay_pin: u8,
    pub relay_active_low: bool,
    pub open_alert_threshold: Duration,
    pub notification_cooldown: Duration,
    pub poll_interval: Duration,
    pub pulse_on: Duration,
    pub pulse_settle: Duration,
    pub alert_timeout: Duration,
    pub webhook_url: String,
    pub users: HashMap<String, String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path)?;
        Config::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let root = json::parse(text)?;
        if !root.is_object() {
            return Err(ConfigError::Invalid("<root>", "expected an object".into()));
        }

        let webhook_url = match root["webhook_url"].as_str() {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => url.to_string(),
            Some(url) => return Err(ConfigError::Invalid("webhook_url", format!("not an http(s) URL: {}", url))),
            None => return Err(ConfigError::Missing("webhook_url")),
        };

        let poll_interval = secs(&root, "poll_interval_secs", 60)?;
        if poll_interval == Duration::from_secs(0) {
            return Err(ConfigError::Invalid("poll_interval_secs", "must be positive".into()));
        }
        if poll_interval > MAX_POLL_INTERVAL {
            return Err(ConfigError::Invalid(
                "poll_interval_secs",
                format!("must be at most {}", MAX_POLL_INTERVAL.as_secs()),
            ));
        }

        let alert_timeout = secs(&root, "alert_timeout_secs", 10)?;
        if alert_timeout == Duration::from_secs(0) || alert_timeout > MAX_ALERT_TIMEOUT {
            return Err(ConfigError::Invalid(
                "alert_timeout_secs",
                format!("must be between 1 and {}", MAX_ALERT_TIMEOUT.as_secs()),
            ));
        }

        Ok(Config {
            listen: string(&root, "listen")?.unwrap_or(DEFAULT_LISTEN).to_string(),
            door_pin: pin(&root, "door_pin", DEFAULT_DOOR_PIN)?,
            relay_pin: pin(&root, "relay_pin", DEFAULT_RELAY_PIN)?,
            relay_active_low: flag(&root, "relay_active_low")?.unwrap_or(false),
            open_alert_threshold: secs(&root, "open_alert_threshold_secs", FIFTEEN_MINUTES)?,
            notification_cooldown: secs(&root, "notification_cooldown_secs", FIFTEEN_MINUTES)?,
            poll_interval,
            pulse_on: millis(&root, "pulse_on_millis", PULSE_ON)?,
            pulse_settle: millis(&root, "pulse_settle_millis", PULSE_SETTLE)?,
            alert_timeout,
            webhook_url,
            users: users(&root["users"])?,
        })
    }

    pub fn alert_policy(&self) -> AlertPolicy {
        AlertPolicy {
            open_alert_threshold: self.open_alert_threshold,
            notification_cooldown: self.notification_cooldown,
        }
    }
}

fn number(root: &JsonValue, key: &'static str) -> Result<Option<u64>, ConfigError> {
    let value = &root[key];
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_u64()
        .map(Some)
        .ok_or_else(|| ConfigError::Invalid(key, format!("expected a whole number, got {}", value)))
}

fn string<'a>(root: &'a JsonValue, key: &'static str) -> Result<Option<&'a str>, ConfigError> {
    let value = &root[key];
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_str()
        .map(Some)
        .ok_or_else(|| ConfigError::Invalid(key, format!("expected a string, got {}", value)))
}

// A mistyped flag must not fall back to the default: for relay_active_low that
// would invert the idle level of the relay.
fn flag(root: &JsonValue, key: &'static str) -> Result<Option<bool>, ConfigError> {
    let value = &root[key];
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_bool()
        .map(Some)
        .ok_or_else(|| ConfigError::Invalid(key, format!("expected true or false, got {}", value)))
}

fn secs(root: &JsonValue, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(number(root, key)?.unwrap_or(default)))
}

fn millis(root: &JsonValue, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(number(root, key)?.map(Duration::from_millis).unwrap_or(default))
}

fn pin(root: &JsonValue, key: &'static str, default: u8) -> Result<u8, ConfigError> {
    match number(root, key)? {
        None => Ok(default),
        Some(n) if n <= 27 => Ok(n as u8),
        Some(n) => Err(ConfigError::Invalid(key, format!("no BCM GPIO {}", n))),
    }
}

fn users(value: &JsonValue) -> Result<HashMap<String, String>, ConfigError> {
    if value.is_null() {
        return Err(ConfigError::Missing("users"));
    }
    if !value.is_object() {
        return Err(ConfigError::Invalid("users", "expected an object".into()));
    }
    value
        .entries()
        .map(|(name, password)| match password.as_str() {
            Some(password) => Ok((name.to_string(), password.to_string())),
            None => Err(ConfigError::Invalid("users", format!("password for {} is not a string", name))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "webhook_url": "https://hooks.example.com/garage",
        "users": { "user": "password" }
    }"#;

    #[test]
    fn defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.listen, "0.0.0.0:3070");
        assert_eq!(config.door_pin, 20);
        assert_eq!(config.relay_pin, 17);
        assert!(!config.relay_active_low);
        assert_eq!(config.open_alert_threshold, Duration::from_secs(900));
        assert_eq!(config.notification_cooldown, Duration::from_secs(900));
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.pulse_on, Duration::from_millis(500));
        assert_eq!(config.pulse_settle, Duration::from_millis(100));
        assert_eq!(config.alert_timeout, Duration::from_secs(10));
        assert_eq!(config.users.get("user").map(String::as_str), Some("password"));
    }

    #[test]
    fn overrides() {
        let config = Config::parse(
            r#"{
                "listen": "127.0.0.1:8080",
                "door_pin": 5,
                "relay_active_low": true,
                "open_alert_threshold_secs": 300,
                "notification_cooldown_secs": 600,
                "poll_interval_secs": 5,
                "pulse_on_millis": 250,
                "webhook_url": "http://10.0.0.2/hook",
                "users": { "a": "1", "b": "2" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.listen, "127.0.0.1:8080");
        assert_eq!(config.door_pin, 5);
        assert!(config.relay_active_low);
        assert_eq!(
            config.alert_policy(),
            AlertPolicy {
                open_alert_threshold: Duration::from_secs(300),
                notification_cooldown: Duration::from_secs(600),
            }
        );
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.pulse_on, Duration::from_millis(250));
        assert_eq!(config.users.len(), 2);
    }

    #[test]
    fn webhook_is_required() {
        match Config::parse(r#"{ "users": {} }"#) {
            Err(ConfigError::Missing("webhook_url")) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_values() {
        let zero_poll = r#"{ "webhook_url": "http://x/", "users": {}, "poll_interval_secs": 0 }"#;
        assert!(matches!(
            Config::parse(zero_poll),
            Err(ConfigError::Invalid("poll_interval_secs", _))
        ));
        let negative = r#"{ "webhook_url": "http://x/", "users": {}, "door_pin": -1 }"#;
        assert!(matches!(Config::parse(negative), Err(ConfigError::Invalid("door_pin", _))));
        let no_scheme = r#"{ "webhook_url": "x/", "users": {} }"#;
        assert!(matches!(Config::parse(no_scheme), Err(ConfigError::Invalid("webhook_url", _))));
        let huge_poll =
            r#"{ "webhook_url": "http://x/", "users": {}, "poll_interval_secs": 18446744073709551615 }"#;
        assert!(matches!(
            Config::parse(huge_poll),
            Err(ConfigError::Invalid("poll_interval_secs", _))
        ));
        let huge_timeout = r#"{ "webhook_url": "http://x/", "users": {}, "alert_timeout_secs": 86400 }"#;
        assert!(matches!(
            Config::parse(huge_timeout),
            Err(ConfigError::Invalid("alert_timeout_secs", _))
        ));
        let quoted_flag = r#"{ "webhook_url": "http://x/", "users": {}, "relay_active_low": "true" }"#;
        assert!(matches!(
            Config::parse(quoted_flag),
            Err(ConfigError::Invalid("relay_active_low", _))
        ));
        let numeric_listen = r#"{ "webhook_url": "http://x/", "users": {}, "listen": 3070 }"#;
        assert!(matches!(Config::parse(numeric_listen), Err(ConfigError::Invalid("listen", _))));
        assert!(matches!(Config::parse("[]"), Err(ConfigError::Invalid("<root>", _))));
        assert!(matches!(Config::parse("{"), Err(ConfigError::Parse(_))));
    }
}
