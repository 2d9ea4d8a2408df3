use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;

// ─── Defaults ────────────────────────────────────────────────────

/// 5 s is the OpenFlow default statistics polling period.
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_CSV_FILE_BASE_NAME: &str = "port_stats";
pub const DEFAULT_BROKER_URL: &str = "redis://127.0.0.1:6379/";
pub const DEFAULT_BROKER_TOPIC: &str = "link_stats";
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 2_000;

// ─── Property keys ───────────────────────────────────────────────

pub const KEY_POLLING_INTERVAL: &str = "pollingInterval";
pub const KEY_CSV_FILE_BASE_NAME: &str = "csvFileBaseName";
pub const KEY_SINK: &str = "sink";
pub const KEY_BROKER_URL: &str = "brokerUrl";
pub const KEY_BROKER_TOPIC: &str = "brokerTopic";
pub const KEY_PUBLISH_TIMEOUT: &str = "publishTimeoutMs";

/// Raw property dictionary, string-valued like a component configuration
/// service hands it over.
pub type Properties = HashMap<String, String>;

// ─── Types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    File,
    Broker,
}

impl FromStr for SinkKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "csv" => Ok(Self::File),
            "broker" | "redis" => Ok(Self::Broker),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Broker => f.write_str("broker"),
        }
    }
}

/// Fully resolved configuration of the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentConfig {
    pub polling_interval_ms: u64,
    pub csv_file_base_name: PathBuf,
    pub sink: SinkKind,
    pub broker_url: String,
    pub broker_topic: String,
    pub publish_timeout_ms: u64,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
            csv_file_base_name: PathBuf::from(DEFAULT_CSV_FILE_BASE_NAME),
            sink: SinkKind::File,
            broker_url: DEFAULT_BROKER_URL.into(),
            broker_topic: DEFAULT_BROKER_TOPIC.into(),
            publish_timeout_ms: DEFAULT_PUBLISH_TIMEOUT_MS,
        }
    }
}

impl ComponentConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    /// True when switching from `self` to `other` needs a different sink.
    pub fn sink_target_differs(&self, other: &Self) -> bool {
        if self.sink != other.sink {
            return true;
        }
        match self.sink {
            SinkKind::File => self.csv_file_base_name != other.csv_file_base_name,
            SinkKind::Broker => {
                self.broker_url != other.broker_url
                    || self.broker_topic != other.broker_topic
                    || self.publish_timeout_ms != other.publish_timeout_ms
            }
        }
    }

    /// Apply `props` on top of `current`.
    ///
    /// A missing key keeps the current value, an empty value resets the
    /// property to its documented default, and a malformed value keeps the
    /// last known good one. Every rejected value is reported back.
    pub fn resolve(props: &Properties, current: &Self) -> (Self, Vec<ConfigError>) {
        let defaults = Self::default();
        let mut errors = Vec::new();

        let polling_interval_ms = resolve_millis(
            props,
            KEY_POLLING_INTERVAL,
            current.polling_interval_ms,
            defaults.polling_interval_ms,
            &mut errors,
        );
        let publish_timeout_ms = resolve_millis(
            props,
            KEY_PUBLISH_TIMEOUT,
            current.publish_timeout_ms,
            defaults.publish_timeout_ms,
            &mut errors,
        );

        let csv_file_base_name = match lookup(props, KEY_CSV_FILE_BASE_NAME) {
            Lookup::Missing => current.csv_file_base_name.clone(),
            Lookup::Empty => defaults.csv_file_base_name,
            Lookup::Value(v) => PathBuf::from(v),
        };

        let sink = match lookup(props, KEY_SINK) {
            Lookup::Missing => current.sink,
            Lookup::Empty => defaults.sink,
            Lookup::Value(v) => v.parse().unwrap_or_else(|()| {
                errors.push(ConfigError::Invalid {
                    key: KEY_SINK,
                    value: v.to_owned(),
                    reason: "expected `file` or `broker`",
                });
                current.sink
            }),
        };

        let broker_url = resolve_string(props, KEY_BROKER_URL, &current.broker_url, DEFAULT_BROKER_URL);
        let broker_topic =
            resolve_string(props, KEY_BROKER_TOPIC, &current.broker_topic, DEFAULT_BROKER_TOPIC);

        let cfg = Self {
            polling_interval_ms,
            csv_file_base_name,
            sink,
            broker_url,
            broker_topic,
            publish_timeout_ms,
        };
        (cfg, errors)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

enum Lookup<'a> {
    Missing,
    Empty,
    Value(&'a str),
}

fn lookup<'a>(props: &'a Properties, key: &str) -> Lookup<'a> {
    match props.get(key).map(|v| v.trim()) {
        None => Lookup::Missing,
        Some("") => Lookup::Empty,
        Some(v) => Lookup::Value(v),
    }
}

fn resolve_millis(
    props: &Properties,
    key: &'static str,
    current: u64,
    default: u64,
    errors: &mut Vec<ConfigError>,
) -> u64 {
    match lookup(props, key) {
        Lookup::Missing => current,
        Lookup::Empty => default,
        Lookup::Value(v) => match v.parse::<u64>() {
            Ok(0) => {
                errors.push(ConfigError::Invalid {
                    key,
                    value: v.to_owned(),
                    reason: "must be greater than zero",
                });
                current
            }
            Ok(ms) => ms,
            Err(_) => {
                errors.push(ConfigError::Invalid {
                    key,
                    value: v.to_owned(),
                    reason: "not an integer number of milliseconds",
                });
                current
            }
        },
    }
}

fn resolve_string(props: &Properties, key: &str, current: &str, default: &str) -> String {
    match lookup(props, key) {
        Lookup::Missing => current.to_owned(),
        Lookup::Empty => default.to_owned(),
        Lookup::Value(v) => v.to_owned(),
    }
}

/// Flatten a JSON object into string properties (`{"pollingInterval": 1000}`
/// and `{"pollingInterval": "1000"}` are equivalent).
pub fn properties_from_json(map: serde_json::Map<String, serde_json::Value>) -> Properties {
    map.into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, v)
        })
        .collect()
}
