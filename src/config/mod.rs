//! The `config` module loads connection and logging settings.
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! `config/default` file (any format the `config` crate understands), then
//! `TOPICLINK_`-prefixed environment variables with `__` between nested keys,
//! e.g. `TOPICLINK_PUBSUB__TIMEOUTS__PUBLISH_MS=500`. A `.env` file is loaded
//! into the environment first when present.

mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};
use tracing::warn;

pub use settings::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_EMULATOR_ADDRESS, DEFAULT_PROJECT_ID,
    DEFAULT_PUBLISH_TIMEOUT, DEFAULT_SUBSCRIPTION_CREATE_TIMEOUT,
    DEFAULT_SUBSCRIPTION_DELETE_TIMEOUT, DEFAULT_TOPIC_CREATE_TIMEOUT, EmulatorSettings,
    LoggingSettings, PubSubSettings, Settings, TimeoutSettings,
};

const DEFAULT_CONFIG_FILE: &str = "config/default";

/// Loads the configuration from the default file and environment variables
/// and merges it over the defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();
    load_config_from(DEFAULT_CONFIG_FILE)
}

/// Same as [`load_config`] with an explicit config file (extension optional).
/// The file may be absent.
pub fn load_config_from(file: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix("TOPICLINK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(merge(partial))
}

fn merge(partial: PartialSettings) -> Settings {
    let default = Settings::default();
    let pubsub = partial.pubsub.as_ref();

    let emulator_enabled = pubsub
        .and_then(|p| p.emulator.as_ref())
        .and_then(|e| e.enabled)
        .unwrap_or(default.pubsub.emulator.enabled);

    let emulator_address = pubsub
        .and_then(|p| p.emulator.as_ref())
        .and_then(|e| e.address.clone())
        .filter(|a| !a.is_empty())
        .unwrap_or(default.pubsub.emulator.address);

    let credentials_file = if emulator_enabled {
        None
    } else {
        pubsub
            .and_then(|p| p.credentials_file.clone())
            .filter(|f| !f.is_empty())
            .or_else(|| non_empty_env("GOOGLE_APPLICATION_CREDENTIALS"))
    };

    Settings {
        pubsub: PubSubSettings {
            project_id: resolve_project_id(pubsub.and_then(|p| p.project_id.clone())),
            emulator: EmulatorSettings {
                enabled: emulator_enabled,
                address: emulator_address,
            },
            credentials_file,
            timeouts: TimeoutSettings::from_partial(pubsub.and_then(|p| p.timeouts.as_ref())),
        },
        logging: LoggingSettings {
            level: partial
                .logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    }
}

fn resolve_project_id(configured: Option<String>) -> String {
    if let Some(project_id) = configured.filter(|p| !p.is_empty()) {
        return project_id;
    }

    non_empty_env("GOOGLE_PROJECT_ID").unwrap_or_else(|| {
        warn!("empty pubsub.project_id, using default");
        DEFAULT_PROJECT_ID.to_string()
    })
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
