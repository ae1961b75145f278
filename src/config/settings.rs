use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_TOPIC_CREATE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_SUBSCRIPTION_CREATE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_SUBSCRIPTION_DELETE_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(3);

pub const DEFAULT_PROJECT_ID: &str = "default-project-id";
pub const DEFAULT_EMULATOR_ADDRESS: &str = "127.0.0.1:8538";

/// Top-level configuration settings for the application.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub pubsub: PubSubSettings,
    pub logging: LoggingSettings,
}

/// Everything a connection needs: where to connect and how long each
/// remote call may take. Immutable once handed to `Connection::connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubSettings {
    pub project_id: String,
    pub emulator: EmulatorSettings,
    /// Service account key file. Unused in emulator mode.
    pub credentials_file: Option<String>,
    pub timeouts: TimeoutSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorSettings {
    pub enabled: bool,
    pub address: String,
}

/// Per-operation deadlines for remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutSettings {
    pub connect: Duration,
    pub topic_create: Duration,
    pub subscription_create: Duration,
    pub subscription_delete: Duration,
    pub publish: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Settings as read from files or the environment. Missing values can be filled using defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub pubsub: Option<PartialPubSubSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialPubSubSettings {
    pub project_id: Option<String>,
    pub emulator: Option<PartialEmulatorSettings>,
    pub credentials_file: Option<String>,
    pub timeouts: Option<PartialTimeoutSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialEmulatorSettings {
    pub enabled: Option<bool>,
    pub address: Option<String>,
}

/// Timeouts in milliseconds. A missing value or `0` keeps the default.
#[derive(Debug, Default, Deserialize)]
pub struct PartialTimeoutSettings {
    pub connect_ms: Option<u64>,
    pub topic_create_ms: Option<u64>,
    pub subscription_create_ms: Option<u64>,
    pub subscription_delete_ms: Option<u64>,
    pub publish_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for PubSubSettings {
    fn default() -> Self {
        Self {
            project_id: DEFAULT_PROJECT_ID.to_string(),
            emulator: EmulatorSettings {
                enabled: false,
                address: DEFAULT_EMULATOR_ADDRESS.to_string(),
            },
            credentials_file: None,
            timeouts: TimeoutSettings::default(),
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            topic_create: DEFAULT_TOPIC_CREATE_TIMEOUT,
            subscription_create: DEFAULT_SUBSCRIPTION_CREATE_TIMEOUT,
            subscription_delete: DEFAULT_SUBSCRIPTION_DELETE_TIMEOUT,
            publish: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TimeoutSettings {
    /// Builds timeouts from millisecond overrides, keeping the default for
    /// every value that is missing or zero.
    pub fn from_partial(partial: Option<&PartialTimeoutSettings>) -> Self {
        let default = Self::default();
        let Some(partial) = partial else {
            return default;
        };

        Self {
            connect: millis_or(partial.connect_ms, default.connect),
            topic_create: millis_or(partial.topic_create_ms, default.topic_create),
            subscription_create: millis_or(
                partial.subscription_create_ms,
                default.subscription_create,
            ),
            subscription_delete: millis_or(
                partial.subscription_delete_ms,
                default.subscription_delete,
            ),
            publish: millis_or(partial.publish_ms, default.publish),
        }
    }
}

fn millis_or(value: Option<u64>, default: Duration) -> Duration {
    match value {
        Some(ms) if ms > 0 => Duration::from_millis(ms),
        _ => default,
    }
}
