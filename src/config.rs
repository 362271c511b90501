//! # Configuration Management
//!
//! Startup configuration for a beacon node.
//!
//! The core consumes, but does not own, its configuration: node identity and
//! key come from provisioning, protocol timing and table capacities from a
//! TOML file or the environment.
//!
//! ## Sources
//! - TOML via `from_file()` / `from_toml()`; missing tables and fields take defaults
//! - Environment via `from_env()` (`V2X_BEACON_*`)
//! - `Default`, optionally tweaked with `default_with_overrides()`
//!
//! ## Bounds
//! - Every per-sender table has a hard capacity; validation refuses zero
//! - Freshness windows shorter than the beacon period would reject every peer
//! - The key is held as hex here and converted into a zeroizing `AuthKey`

use crate::core::message::SenderId;
use crate::error::{ProtocolError, Result};
use crate::utils::crypto::{AuthKey, MAX_KEY_SIZE, MIN_KEY_SIZE};
use crate::utils::rate_limiter::RateLimiterSettings;
use crate::utils::replay_guard::ReplayGuardSettings;
use crate::utils::time::duration_to_ms;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default interval between own beacons (10 Hz)
pub const BEACON_PERIOD: Duration = Duration::from_millis(100);

/// Default maximum distance between sender timestamp and local clock
pub const FRESHNESS_WINDOW: Duration = Duration::from_millis(5_000);

/// Default messages admitted per sender per rate window
pub const MAX_PER_SECOND: u32 = 50;

/// Default UDP port for the broadcast mesh
pub const DEFAULT_PORT: u16 = 47_474;

/// Everything a node needs at startup.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BeaconConfig {
    /// Node identity and key
    #[serde(default)]
    pub node: NodeConfig,

    /// Protocol timing and replay behaviour
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Capacity bounds
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Broadcast socket addresses
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BeaconConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProtocolError::ConfigError(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Invalid beacon config: {e}")))
    }

    /// Defaults overlaid with any `V2X_BEACON_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("V2X_BEACON_NODE_ID") {
            config.node.id = id;
        }

        if let Ok(key) = std::env::var("V2X_BEACON_KEY") {
            config.node.key = Some(key);
        }

        if let Ok(path) = std::env::var("V2X_BEACON_NONCE_FILE") {
            config.node.nonce_file = Some(path);
        }

        if let Some(ms) = env_u64("V2X_BEACON_PERIOD_MS")? {
            config.protocol.beacon_period = Duration::from_millis(ms);
        }

        if let Some(ms) = env_u64("V2X_BEACON_FRESHNESS_MS")? {
            config.protocol.freshness_window = Duration::from_millis(ms);
        }

        if let Some(max) = env_u64("V2X_BEACON_MAX_PER_SECOND")? {
            config.protocol.max_per_second = u32::try_from(max).map_err(|_| {
                ProtocolError::ConfigError("V2X_BEACON_MAX_PER_SECOND out of range".into())
            })?;
        }

        if let Ok(addr) = std::env::var("V2X_BEACON_BIND_ADDRESS") {
            config.transport.bind_address = addr;
        }

        if let Ok(addr) = std::env::var("V2X_BEACON_BROADCAST_ADDRESS") {
            config.transport.broadcast_address = addr;
        }

        Ok(config)
    }

    /// Defaults with `mutator` applied; mostly for tests.
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// The default configuration rendered as TOML.
    pub fn example_config() -> String {
        match toml::to_string_pretty(&Self::default()) {
            Ok(rendered) => rendered,
            Err(e) => format!("# example config unavailable: {e}\n"),
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let rendered = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Cannot render beacon config: {e}")))?;
        let path = path.as_ref();
        std::fs::write(path, rendered).map_err(|e| {
            ProtocolError::ConfigError(format!("Cannot write {}: {e}", path.display()))
        })
    }

    /// Every problem found, one message each. Empty means usable.
    ///
    /// The node key is checked separately by [`NodeConfig::auth_key`] since
    /// provisioning may supply it after the file is loaded.
    pub fn validate(&self) -> Vec<String> {
        [
            self.node.validate(),
            self.protocol.validate(),
            self.limits.validate(),
            self.transport.validate(),
            self.logging.validate(),
        ]
        .concat()
    }

    /// [`validate`](Self::validate) folded into a single `ConfigError`.
    pub fn validate_strict(&self) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            return Ok(());
        }
        Err(ProtocolError::ConfigError(format!(
            "{} problem(s) in beacon config:\n  - {}",
            problems.len(),
            problems.join("\n  - ")
        )))
    }

    /// Replay guard settings derived from this configuration
    pub fn replay_settings(&self) -> ReplayGuardSettings {
        ReplayGuardSettings {
            window_size: self.protocol.nonce_window,
            freshness_ms: duration_to_ms(self.protocol.freshness_window),
            strict_order: self.protocol.strict_nonce_order,
            max_senders: self.limits.max_replay_senders,
        }
    }

    /// Rate limiter settings derived from this configuration
    pub fn rate_settings(&self) -> RateLimiterSettings {
        RateLimiterSettings {
            max_per_window: self.protocol.max_per_second,
            window_ms: duration_to_ms(self.protocol.rate_window),
            max_senders: self.limits.max_rate_senders,
        }
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ProtocolError::ConfigError(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Node identity
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This node's sender id (1-16 printable ASCII characters)
    pub id: String,

    /// Hex-encoded shared key; usually injected by provisioning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// File holding the next outgoing nonce across restarts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce_file: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: String::from("V001"),
            key: None,
            nonce_file: None,
        }
    }
}

impl NodeConfig {
    /// Validate node configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Err(e) = SenderId::new(&self.id) {
            errors.push(format!("Invalid node id '{}': {e}", self.id));
        }

        if let Some(ref key) = self.key {
            let hex_len = key.trim().len();
            if hex_len < MIN_KEY_SIZE * 2 || hex_len > MAX_KEY_SIZE * 2 {
                errors.push(format!(
                    "Node key must be {}-{} hex characters (got {hex_len})",
                    MIN_KEY_SIZE * 2,
                    MAX_KEY_SIZE * 2
                ));
            } else if hex::decode(key.trim()).is_err() {
                errors.push("Node key is not valid hex".to_string());
            }
        }

        errors
    }

    /// Parsed sender id
    pub fn sender_id(&self) -> Result<SenderId> {
        SenderId::new(&self.id)
    }

    /// Parsed key
    ///
    /// # Errors
    /// Returns `ConfigError` if no key was provisioned, `InvalidKey` if it is malformed.
    pub fn auth_key(&self) -> Result<AuthKey> {
        let hex_key = self
            .key
            .as_deref()
            .ok_or_else(|| ProtocolError::ConfigError("No node key provisioned".into()))?;
        AuthKey::from_hex(hex_key)
    }
}

/// Protocol timing and replay behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Interval between own beacons
    #[serde(with = "duration_serde")]
    pub beacon_period: Duration,

    /// Maximum distance between a sender's timestamp and the local clock
    #[serde(with = "duration_serde")]
    pub freshness_window: Duration,

    /// Length of the rate limiting window
    #[serde(with = "duration_serde")]
    pub rate_window: Duration,

    /// Messages admitted per sender per rate window
    pub max_per_second: u32,

    /// Nonces remembered per sender
    pub nonce_window: usize,

    /// Reject nonces that are not above the highest accepted from that sender
    pub strict_nonce_order: bool,

    /// Neighbors not heard from for this long are evicted
    #[serde(with = "duration_serde")]
    pub neighbor_staleness: Duration,

    /// Interval between metrics log lines
    #[serde(with = "duration_serde")]
    pub metrics_interval: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            beacon_period: BEACON_PERIOD,
            freshness_window: FRESHNESS_WINDOW,
            rate_window: Duration::from_secs(1),
            max_per_second: MAX_PER_SECOND,
            nonce_window: 20,
            strict_nonce_order: true,
            neighbor_staleness: Duration::from_secs(5),
            metrics_interval: Duration::from_secs(5),
        }
    }
}

impl ProtocolConfig {
    /// Validate protocol configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.beacon_period.as_millis() < 10 {
            errors.push("Beacon period too short (minimum: 10ms)".to_string());
        } else if self.beacon_period.as_secs() > 60 {
            errors.push("Beacon period too long (maximum: 60s)".to_string());
        }

        if self.freshness_window.is_zero() {
            errors.push("Freshness window must be greater than 0".to_string());
        } else if self.freshness_window <= self.beacon_period {
            errors.push("Freshness window must be longer than the beacon period".to_string());
        } else if self.freshness_window.as_secs() > 3600 {
            errors.push("Freshness window too long (maximum: 1 hour)".to_string());
        }

        if self.rate_window.as_millis() < 100 {
            errors.push("Rate window too short (minimum: 100ms)".to_string());
        }

        if self.max_per_second == 0 {
            errors.push("Max messages per window must be greater than 0".to_string());
        }

        if self.nonce_window == 0 {
            errors.push("Nonce window must be greater than 0".to_string());
        } else if self.nonce_window > 4096 {
            errors.push(format!(
                "Nonce window too large: {} (maximum: 4096)",
                self.nonce_window
            ));
        }

        if self.neighbor_staleness <= self.beacon_period {
            errors.push("Neighbor staleness must be longer than the beacon period".to_string());
        }

        if self.metrics_interval.as_millis() < 100 {
            errors.push("Metrics interval too short (minimum: 100ms)".to_string());
        }

        errors
    }
}

/// Capacity bounds for per-sender state
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Neighbor table capacity
    pub max_neighbors: usize,

    /// Senders tracked by the rate limiter
    pub max_rate_senders: usize,

    /// Senders with a live replay window
    pub max_replay_senders: usize,

    /// Inbound datagram queue between the receive callback and the engine
    pub inbound_queue: usize,

    /// Security events retained for inspection
    pub event_log_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_neighbors: 20,
            max_rate_senders: 10,
            max_replay_senders: 32,
            inbound_queue: 64,
            event_log_capacity: 64,
        }
    }
}

impl LimitsConfig {
    /// Validate capacity configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("Max neighbors", self.max_neighbors),
            ("Max rate senders", self.max_rate_senders),
            ("Max replay senders", self.max_replay_senders),
            ("Inbound queue", self.inbound_queue),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be greater than 0"));
            } else if value > 65_536 {
                errors.push(format!("{name} too large: {value} (maximum: 65536)"));
            }
        }

        if self.max_replay_senders > 0 && self.max_replay_senders < self.max_rate_senders {
            errors.push(
                "Max replay senders should be at least max rate senders".to_string(),
            );
        }

        errors
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Local UDP bind address
    pub bind_address: String,

    /// Broadcast destination
    pub broadcast_address: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{DEFAULT_PORT}"),
            broadcast_address: format!("255.255.255.255:{DEFAULT_PORT}"),
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (name, addr) in [
            ("bind", &self.bind_address),
            ("broadcast", &self.broadcast_address),
        ] {
            if addr.is_empty() {
                errors.push(format!("Transport {name} address cannot be empty"));
            } else if addr.parse::<std::net::SocketAddr>().is_err() {
                errors.push(format!(
                    "Invalid {name} address format: '{addr}' (expected format: '0.0.0.0:47474')"
                ));
            }
        }

        errors
    }
}

/// Where and how the node writes its tracing output.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Tag attached to the startup log line
    pub app_name: String,

    /// Fallback filter when `RUST_LOG` is unset
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    pub log_to_console: bool,

    pub log_to_file: bool,

    /// Required when `log_to_file` is set
    pub log_file_path: Option<String>,

    /// One JSON object per event instead of human-readable lines
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("v2x-beacon"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match self.app_name.len() {
            0 => errors.push("Logging app_name cannot be empty".to_string()),
            n if n > 64 => errors.push(format!("Logging app_name is {n} characters, limit is 64")),
            _ => {}
        }

        match (self.log_to_file, self.log_file_path.as_deref()) {
            (true, None) => {
                errors.push("log_file_path must be specified when log_to_file is set".to_string())
            }
            (true, Some(path)) => {
                let dir = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty());
                if let Some(dir) = dir.filter(|d| !d.exists()) {
                    errors.push(format!("Log directory {} does not exist", dir.display()));
                }
            }
            (false, _) => {}
        }

        if !self.log_to_console && !self.log_to_file {
            errors.push("At least one logging output must be enabled".to_string());
        }

        errors
    }
}

/// Durations are written as whole milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Levels are written lowercase ("info", "debug", ...).
mod log_level_serde {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&level.as_str().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Level, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse()
            .map_err(|_| D::Error::custom(format!("unknown log level '{raw}'")))
    }
}
