use once_cell::sync::Lazy;

/// API version sent to the key provider when none is configured.
pub const DEFAULT_API_VERSION: &str = "2020-03-02";

/// Seconds before expiry at which a key is considered stale.
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 30;

/// Capacity of the request channel feeding the manager worker.
pub const DEFAULT_COMMAND_BUFFER: usize = 32;

/// key: key-manager-config
/// Knobs for an [`EphemeralKeyManager`](crate::EphemeralKeyManager).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyManagerConfig {
    pub api_version: String,
    pub refresh_buffer_secs: i64,
    pub should_prefetch: bool,
    pub command_buffer: usize,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            refresh_buffer_secs: DEFAULT_REFRESH_BUFFER_SECS,
            should_prefetch: true,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

impl KeyManagerConfig {
    /// Reads overrides from the environment, loading a `.env` file first when present.
    ///
    /// - `EPHEMERAL_KEY_API_VERSION`
    /// - `EPHEMERAL_KEY_REFRESH_BUFFER_SECS` (non-negative integer)
    /// - `EPHEMERAL_KEY_PREFETCH` (`1`/`true`/`yes` or `0`/`false`/`no`)
    /// - `EPHEMERAL_KEY_COMMAND_BUFFER` (positive integer)
    ///
    /// Unset or invalid values keep their defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let api_version =
            read_optional_env("EPHEMERAL_KEY_API_VERSION").unwrap_or(defaults.api_version);
        let refresh_buffer_secs = read_optional_env("EPHEMERAL_KEY_REFRESH_BUFFER_SECS")
            .and_then(|value| value.parse::<i64>().ok())
            .filter(|value| *value >= 0)
            .unwrap_or(defaults.refresh_buffer_secs);
        let should_prefetch = read_optional_env("EPHEMERAL_KEY_PREFETCH")
            .and_then(|value| parse_flag(&value))
            .unwrap_or(defaults.should_prefetch);
        let command_buffer = read_optional_env("EPHEMERAL_KEY_COMMAND_BUFFER")
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(defaults.command_buffer);

        Self {
            api_version,
            refresh_buffer_secs,
            should_prefetch,
            command_buffer,
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_refresh_buffer_secs(mut self, refresh_buffer_secs: i64) -> Self {
        self.refresh_buffer_secs = refresh_buffer_secs;
        self
    }

    pub fn with_prefetch(mut self, should_prefetch: bool) -> Self {
        self.should_prefetch = should_prefetch;
        self
    }

    pub fn with_command_buffer(mut self, command_buffer: usize) -> Self {
        self.command_buffer = command_buffer.max(1);
        self
    }
}

/// Process-wide configuration resolved from the environment on first use.
pub static KEY_MANAGER_CONFIG: Lazy<KeyManagerConfig> = Lazy::new(KeyManagerConfig::from_env);

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
