// Forumgate
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Configuration management for the gateway
//!
//! Values are resolved in order: defaults, TOML file, `FORUMGATE_*`
//! environment variables, then explicit command-line overrides.

use crate::access::grants::{Category, GrantSet, Grantee};
use crate::error::GatewayResult;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Directory holding persisted state and the delivery outbox
    pub data_dir: PathBuf,
    pub access: AccessConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

/// Access resolution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Grants applied when no ancestor carries a custom record.
    /// Categories missing from a config file keep their built-in default.
    #[serde(deserialize_with = "merge_root_defaults")]
    pub root_defaults: BTreeMap<Category, GrantSet>,

    /// How long a writer waits for a subtree lock
    pub lock_timeout_ms: u64,

    /// Memoise resolutions between writes
    pub resolution_cache: bool,
}

/// Notification dispatch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Delivery attempts per digest before it is dropped
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,

    /// Upper bound for a single delivery call
    pub delivery_timeout_ms: u64,

    /// Digests delivered in parallel
    pub max_concurrency: usize,

    /// Period of the dispatch tick
    pub interval_secs: u64,

    /// Payload key naming the forum an event refers to
    pub access_field: String,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub ansi: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("forumgate"),
            access: AccessConfig::default(),
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn builtin_root_defaults() -> BTreeMap<Category, GrantSet> {
    let mut root_defaults = BTreeMap::new();
    root_defaults.insert(Category::View, [Grantee::role("anonymous"), Grantee::role("authenticated")].into_iter().collect());
    root_defaults.insert(Category::Members, [Grantee::role("authenticated")].into_iter().collect());
    root_defaults.insert(Category::Moderators, GrantSet::new());
    root_defaults
}

fn merge_root_defaults<'de, D>(deserializer: D) -> Result<BTreeMap<Category, GrantSet>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<Category, GrantSet>::deserialize(deserializer)?;
    let mut root_defaults = builtin_root_defaults();
    root_defaults.extend(overrides);
    Ok(root_defaults)
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            root_defaults: builtin_root_defaults(),
            lock_timeout_ms: 500,
            resolution_cache: true,
        }
    }
}

impl AccessConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn root_default(&self, category: Category) -> GrantSet {
        self.root_defaults.get(&category).cloned().unwrap_or_default()
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
            delivery_timeout_ms: 2_000,
            max_concurrency: 8,
            interval_secs: 60,
            access_field: "forum_id".to_string(),
        }
    }
}

impl DispatchConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

impl GatewayConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `FORUMGATE_*` environment variables on top of `self`
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(data_dir) = env::var("FORUMGATE_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(level) = env::var("FORUMGATE_LOG_LEVEL") {
            self.logging.level = level;
        }

        self.access.lock_timeout_ms = env_parse("FORUMGATE_LOCK_TIMEOUT_MS", self.access.lock_timeout_ms);
        self.access.resolution_cache = env_parse("FORUMGATE_RESOLUTION_CACHE", self.access.resolution_cache);

        self.dispatch.max_attempts = env_parse("FORUMGATE_DISPATCH_MAX_ATTEMPTS", self.dispatch.max_attempts);
        self.dispatch.initial_backoff_ms = env_parse("FORUMGATE_DISPATCH_INITIAL_BACKOFF_MS", self.dispatch.initial_backoff_ms);
        self.dispatch.max_backoff_ms = env_parse("FORUMGATE_DISPATCH_MAX_BACKOFF_MS", self.dispatch.max_backoff_ms);
        self.dispatch.delivery_timeout_ms = env_parse("FORUMGATE_DELIVERY_TIMEOUT_MS", self.dispatch.delivery_timeout_ms);
        self.dispatch.max_concurrency = env_parse("FORUMGATE_DISPATCH_CONCURRENCY", self.dispatch.max_concurrency);
        self.dispatch.interval_secs = env_parse("FORUMGATE_DISPATCH_INTERVAL_SECS", self.dispatch.interval_secs);
        self
    }

    /// Resolve the effective configuration. CLI arguments win over the environment.
    pub fn resolve_config(cli_config: Option<PathBuf>, cli_data_dir: Option<PathBuf>) -> GatewayResult<Self> {
        let config = if let Some(config_path) = cli_config {
            Self::load_from_file(config_path)?
        } else if let Ok(env_config) = env::var("FORUMGATE_CONFIG") {
            Self::load_from_file(env_config)?
        } else {
            Self::default()
        };

        let mut config = config.with_env_overrides();
        if let Some(data_dir) = cli_data_dir {
            config.data_dir = data_dir;
        }
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key).ok().and_then(|value| value.parse().ok()).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.dispatch.max_attempts, 4);
        assert_eq!(config.dispatch.access_field, "forum_id");
        assert!(config.access.root_default(Category::View).contains(&Grantee::role("anonymous")));
        assert!(config.access.root_default(Category::Moderators).is_empty());
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
data_dir = "/tmp/forumgate-test"

[access]
lock_timeout_ms = 50

[access.root_defaults]
view = ["role:member"]

[dispatch]
max_attempts = 2
"#
        )
        .unwrap();

        let config = GatewayConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/forumgate-test"));
        assert_eq!(config.access.lock_timeout(), Duration::from_millis(50));
        assert_eq!(config.access.root_default(Category::View), [Grantee::role("member")].into_iter().collect());
        // Categories the file leaves out keep their defaults
        assert_eq!(config.access.root_default(Category::Members), [Grantee::role("authenticated")].into_iter().collect());
        assert!(config.access.root_default(Category::Moderators).is_empty());
        assert_eq!(config.dispatch.max_attempts, 2);
        assert_eq!(config.dispatch.max_backoff_ms, 5_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_cli_data_dir_wins() {
        let config = GatewayConfig::resolve_config(None, Some(PathBuf::from("/srv/forumgate"))).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/forumgate"));
    }

    #[test]
    fn test_root_default_can_be_emptied_explicitly() {
        let config: GatewayConfig = toml::from_str(
            r#"
[access.root_defaults]
members = []
moderators = ["role:admin"]
"#,
        )
        .unwrap();

        assert!(config.access.root_default(Category::Members).is_empty());
        assert_eq!(config.access.root_default(Category::Moderators), [Grantee::role("admin")].into_iter().collect());
        assert_eq!(config.access.root_default(Category::View), AccessConfig::default().root_default(Category::View));
    }
}
