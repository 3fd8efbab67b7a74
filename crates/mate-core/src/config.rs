//! Configuration types for mate
//!
//! One [`MateConfig`] is built at startup and handed to the reconciler,
//! the controller and the provider factories. Nothing reads configuration
//! from global state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main mate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MateConfig {
    /// Zone provider configuration
    pub provider: ProviderConfig,

    /// Endpoint source configuration
    pub source: EndpointSourceConfig,

    /// Record group id written into every ownership marker
    pub group_id: String,

    /// TTL of every record mate creates (in seconds)
    #[serde(default = "default_record_ttl")]
    pub record_ttl: u32,

    /// Stop after the initial full sync instead of watching the source
    #[serde(default)]
    pub sync_only: bool,

    /// Optional controller settings
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl MateConfig {
    /// Create a new configuration with defaults
    pub fn new(provider: ProviderConfig, group_id: impl Into<String>) -> Self {
        Self {
            provider,
            source: EndpointSourceConfig::default(),
            group_id: group_id.into(),
            record_ttl: default_record_ttl(),
            sync_only: false,
            controller: ControllerConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.group_id.trim().is_empty() {
            return Err(crate::Error::config("Record group id cannot be empty"));
        }
        if self.record_ttl == 0 {
            return Err(crate::Error::config("Record TTL must be > 0"));
        }

        self.provider.validate()?;
        self.source.validate()?;
        self.controller.validate()?;

        Ok(())
    }
}

/// Zone provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Google Cloud DNS managed zone
    Google {
        /// Project that owns the managed zone
        project: String,
        /// Managed zone name
        zone: String,
        /// OAuth2 bearer token with the `ndev.clouddns.readwrite` scope
        access_token: String,
        /// API base URL override (tests, private endpoints)
        #[serde(default)]
        base_url: Option<String>,
    },

    /// In-memory zone (dry runs and tests)
    Memory {
        /// Zone name
        zone: String,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Zone name
        zone: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.zone().trim().is_empty() {
            return Err(crate::Error::config("Zone cannot be empty"));
        }
        match self {
            ProviderConfig::Google {
                project,
                access_token,
                ..
            } => {
                if project.trim().is_empty() {
                    return Err(crate::Error::config("Google project cannot be empty"));
                }
                if access_token.is_empty() {
                    return Err(crate::Error::config("Google access token cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Memory { .. } => Ok(()),
            ProviderConfig::Custom { factory, config, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// The zone this provider manages
    pub fn zone(&self) -> &str {
        match self {
            ProviderConfig::Google { zone, .. }
            | ProviderConfig::Memory { zone }
            | ProviderConfig::Custom { zone, .. } => zone,
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Google { .. } => "google",
            ProviderConfig::Memory { .. } => "memory",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Endpoint source configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointSourceConfig {
    /// Poll a JSON endpoint list over HTTP
    Http {
        /// URL returning `[{"name": ..., "address": ...}]`
        url: String,
        /// Poll interval in seconds
        interval_secs: u64,
    },

    /// In-process channel (embedding and tests)
    #[default]
    Channel,

    /// Custom source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl EndpointSourceConfig {
    /// Validate the endpoint source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            EndpointSourceConfig::Http { url, interval_secs } => {
                if url.is_empty() {
                    return Err(crate::Error::config("HTTP source URL cannot be empty"));
                }
                if *interval_secs == 0 {
                    return Err(crate::Error::config("HTTP source interval must be > 0"));
                }
                Ok(())
            }
            EndpointSourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom source factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom source config cannot be null"));
                }
                Ok(())
            }
            EndpointSourceConfig::Channel => Ok(()),
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            EndpointSourceConfig::Http { .. } => "http",
            EndpointSourceConfig::Channel => "channel",
            EndpointSourceConfig::Custom { factory, .. } => factory,
        }
    }
}

/// How an incremental update treats the current zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessPolicy {
    /// Write the endpoint without reading the zone; the next full sync
    /// repairs whatever this misses
    #[default]
    Trusting,
    /// Read the zone first and skip names owned by someone else
    Guarded,
}

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Interval between periodic full syncs while watching (disabled if unset)
    #[serde(default)]
    pub resync_interval_secs: Option<u64>,

    /// Terminate the watch loop when an incremental update fails
    #[serde(default)]
    pub stop_on_process_error: bool,

    /// Upper bound for a single provider call (in seconds)
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Capacity of the controller event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Incremental update policy
    #[serde(default)]
    pub process_policy: ProcessPolicy,
}

impl ControllerConfig {
    /// Validate the controller configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.resync_interval_secs == Some(0) {
            return Err(crate::Error::config("Resync interval must be > 0"));
        }
        if self.provider_timeout_secs == 0 {
            return Err(crate::Error::config("Provider timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Provider call timeout
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Periodic resync interval
    pub fn resync_interval(&self) -> Option<Duration> {
        self.resync_interval_secs.map(Duration::from_secs)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: None,
            stop_on_process_error: false,
            provider_timeout_secs: default_provider_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            process_policy: ProcessPolicy::default(),
        }
    }
}

fn default_record_ttl() -> u32 {
    300
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> ProviderConfig {
        ProviderConfig::Memory {
            zone: "example-com".to_string(),
        }
    }

    #[test]
    fn defaults_follow_documented_values() {
        let config = MateConfig::new(memory(), "g1");
        assert_eq!(config.record_ttl, 300);
        assert!(!config.sync_only);
        assert_eq!(config.controller.provider_timeout_secs, 30);
        assert_eq!(config.controller.process_policy, ProcessPolicy::Trusting);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_group_id_is_a_config_error() {
        let config = MateConfig::new(memory(), " ");
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn google_requires_project_zone_and_token() {
        let google = |project: &str, zone: &str, token: &str| ProviderConfig::Google {
            project: project.to_string(),
            zone: zone.to_string(),
            access_token: token.to_string(),
            base_url: None,
        };

        assert!(google("proj", "zone", "token").validate().is_ok());
        assert!(google("", "zone", "token").validate().is_err());
        assert!(google("proj", "", "token").validate().is_err());
        assert!(google("proj", "zone", "").validate().is_err());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let json = serde_json::json!({
            "provider": { "type": "memory", "zone": "example-com" },
            "source": { "type": "http", "url": "http://registry/endpoints", "interval_secs": 30 },
            "group_id": "g1"
        });
        let config: MateConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.record_ttl, 300);
        assert_eq!(config.source.type_name(), "http");
        assert_eq!(config.provider.type_name(), "memory");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_resync_interval_is_rejected() {
        let mut config = MateConfig::new(memory(), "g1");
        config.controller.resync_interval_secs = Some(0);
        assert!(config.validate().is_err());
    }
}
