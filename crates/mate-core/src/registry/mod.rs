//! Plugin-based provider registry
//!
//! Zone providers and endpoint sources register a factory under their type
//! name; configuration picks one by that name.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mate_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::with_builtins();
//! mate_provider_google::register(&registry);
//! mate_source_http::register(&registry);
//!
//! let provider = registry.create_provider(&config.provider)?;
//! let source = registry.create_endpoint_source(&config.source)?;
//! ```

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard};

use crate::config::{EndpointSourceConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::memory::MemoryProviderFactory;
use crate::traits::{EndpointSource, EndpointSourceFactory, ZoneProvider, ZoneProviderFactory};

/// Registry of zone provider and endpoint source factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered zone provider factories
    providers: RwLock<HashMap<String, Box<dyn ZoneProviderFactory>>>,

    /// Registered endpoint source factories
    sources: RwLock<HashMap<String, Box<dyn EndpointSourceFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the in-memory provider registered
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_provider("memory", Box::new(MemoryProviderFactory));
        registry
    }

    /// Register a zone provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "google", "memory")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn ZoneProviderFactory>) {
        let name = name.into();
        match self.providers.write() {
            Ok(mut providers) => {
                providers.insert(name, factory);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(name, factory);
            }
        }
    }

    /// Register an endpoint source factory
    ///
    /// # Parameters
    ///
    /// - `name`: Source type name (e.g., "http")
    /// - `factory`: Factory object for creating source instances
    pub fn register_endpoint_source(
        &self,
        name: impl Into<String>,
        factory: Box<dyn EndpointSourceFactory>,
    ) {
        let name = name.into();
        match self.sources.write() {
            Ok(mut sources) => {
                sources.insert(name, factory);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(name, factory);
            }
        }
    }

    /// Create a zone provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn ZoneProvider>)`: Created provider instance
    /// - `Err(Error)`: If provider type is not registered or creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn ZoneProvider>> {
        config.validate()?;

        let provider_type = config.type_name();
        let providers = read(&self.providers)?;

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Create an endpoint source from configuration
    ///
    /// Channel sources are wired in-process with
    /// [`ChannelEndpointSource::new`](crate::memory::ChannelEndpointSource::new)
    /// and cannot be built from configuration.
    pub fn create_endpoint_source(
        &self,
        config: &EndpointSourceConfig,
    ) -> Result<Box<dyn EndpointSource>> {
        config.validate()?;

        if let EndpointSourceConfig::Channel = config {
            return Err(Error::config(
                "Channel endpoint sources must be created in-process",
            ));
        }

        let source_type = config.type_name();
        let sources = read(&self.sources)?;

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown endpoint source type: {}", source_type)))?;

        factory.create(config)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        read(&self.providers)
            .map(|providers| providers.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// List all registered endpoint source types
    pub fn list_endpoint_sources(&self) -> Vec<String> {
        read(&self.sources)
            .map(|sources| sources.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        read(&self.providers)
            .map(|providers| providers.contains_key(name))
            .unwrap_or(false)
    }

    /// Check if an endpoint source type is registered
    pub fn has_endpoint_source(&self, name: &str) -> bool {
        read(&self.sources)
            .map(|sources| sources.contains_key(name))
            .unwrap_or(false)
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| Error::Other("Provider registry lock poisoned".to_string()))
}
