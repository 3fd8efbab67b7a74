// # Zone Provider Trait
//
// Defines the interface between the reconciler and a DNS backend.
//
// ## Implementations
//
// - Google Cloud DNS: `mate-provider-google` crate
// - In-memory: `mate_core::memory::MemoryZoneProvider`
//
// ## Usage
//
// ```rust,ignore
// use mate_core::{Change, ZoneProvider};
//
// let snapshot = provider.list_current_records().await?;
// provider.apply_change(&Change::new()).await?; // no-op, no backend call
// ```

use async_trait::async_trait;

use crate::record::{Change, ZoneSnapshot};

/// Trait for DNS zone backends
///
/// Providers translate the reconciler's abstract operations into backend
/// API calls. They never decide what to change and never retry; the
/// reconciler owns ownership checks, and the controller owns scheduling.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait ZoneProvider: Send + Sync {
    /// Read the current state of the zone
    ///
    /// Every name the backend serves must appear in the snapshot, including
    /// names without a TXT record, so the reconciler can tell "exists but
    /// unmanaged" from "does not exist".
    ///
    /// # Returns
    ///
    /// - `Ok(ZoneSnapshot)`: The zone contents
    /// - `Err(Error::ProviderQuery)`: Transport or authentication failure
    async fn list_current_records(&self) -> Result<ZoneSnapshot, crate::Error>;

    /// Submit a change as one batch
    ///
    /// An empty change must succeed without contacting the backend.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The change was accepted
    /// - `Err(Error::ProviderConflict)`: A record in the change already exists
    /// - `Err(Error::ProviderWrite)`: Any other write failure
    async fn apply_change(&self, change: &Change) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing zone providers from configuration
pub trait ZoneProviderFactory: Send + Sync {
    /// Create a ZoneProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn ZoneProvider>, crate::Error>;
}
