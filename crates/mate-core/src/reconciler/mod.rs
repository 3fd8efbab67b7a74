//! Reconciliation engine
//!
//! The Reconciler is responsible for:
//! - Reading the zone through a [`ZoneProvider`]
//! - Deciding ownership of every name via the [`OwnershipMarker`]
//! - Computing the minimal change for a full sync ([`plan::plan_sync`])
//! - Applying full syncs and incremental updates, one at a time
//!
//! ## Event Flow
//!
//! ```text
//! sync(desired)                      process(endpoint)
//!   │                                  │
//!   ├─ lock writer                     ├─ lock writer
//!   ├─ list_current_records()          ├─ (guarded only) list_current_records()
//!   ├─ plan_sync()                     ├─ build A/AAAA + TXT pair
//!   └─ apply_change()                  └─ apply_change()
//! ```
//!
//! An "already exists" conflict from the provider is logged and treated as
//! success: it usually means another writer won a race or the snapshot was
//! stale. Nothing was written in that case, which [`Applied::conflict`]
//! reports so the caller can schedule a full sync.

pub mod plan;

use std::net::IpAddr;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{MateConfig, ProcessPolicy};
use crate::error::{Error, Result};
use crate::ownership::{Ownership, OwnershipMarker};
use crate::record::{Change, Endpoint, RecordSet, ZoneSnapshot};
use crate::traits::ZoneProvider;

/// What one reconciliation pass did to the zone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Records written; empty when nothing reached the zone
    pub change: Change,

    /// The provider rejected the change as "already exists" and nothing
    /// was written
    pub conflict: bool,
}

impl Applied {
    /// Whether the zone was left unchanged
    pub fn is_empty(&self) -> bool {
        self.change.is_empty()
    }
}

/// Core reconciler
///
/// Holds no state between calls besides its configuration; every cycle
/// starts from a fresh zone snapshot.
///
/// ## Threading
///
/// The reconciler can be shared behind an `Arc`. All provider-mutating
/// operations take an internal writer lock, so a periodic sync never
/// interleaves with an incremental update.
pub struct Reconciler {
    /// Zone backend
    provider: Box<dyn ZoneProvider>,

    /// Zone identifier (for logging)
    zone: String,

    /// Ownership marker of our record group
    marker: OwnershipMarker,

    /// TTL of every record we write
    ttl: u32,

    /// Upper bound for a single provider call
    timeout: Duration,

    /// Incremental update policy
    process_policy: ProcessPolicy,

    /// Single-writer lock around every zone mutation
    writer: Mutex<()>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// Fails with [`Error::Config`] if the configuration is incomplete.
    pub fn new(provider: Box<dyn ZoneProvider>, config: &MateConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            provider,
            zone: config.provider.zone().to_string(),
            marker: OwnershipMarker::new(config.group_id.clone()),
            ttl: config.record_ttl,
            timeout: config.controller.provider_timeout(),
            process_policy: config.controller.process_policy,
            writer: Mutex::new(()),
        })
    }

    /// Our ownership marker
    pub fn marker(&self) -> &OwnershipMarker {
        &self.marker
    }

    /// Zone identifier
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Compute a full sync without applying it
    pub fn plan_sync(&self, desired: &[Endpoint], current: &ZoneSnapshot) -> Change {
        plan::plan_sync(desired, current, &self.marker, self.ttl)
    }

    /// Converge the zone to exactly the desired endpoints
    ///
    /// # Returns
    ///
    /// - `Ok(Applied)`: The change that was applied (possibly empty)
    /// - `Err(Error)`: A query or write failure from the provider
    pub async fn sync(&self, desired: &[Endpoint]) -> Result<Applied> {
        let _writer = self.writer.lock().await;

        let current = self.current_records().await?;
        self.log_owned(&current);

        let change = self.plan_sync(desired, &current);
        info!(
            "Sync of {} planned: {} addition(s), {} deletion(s)",
            self.zone,
            change.additions.len(),
            change.deletions.len()
        );

        self.apply(change).await
    }

    /// Publish a single endpoint without a full sync
    ///
    /// With [`ProcessPolicy::Trusting`] the zone is not read and nothing is
    /// deleted; a conflicting record surfaces as a provider conflict, which
    /// is downgraded to a warning and reported through [`Applied::conflict`].
    /// With [`ProcessPolicy::Guarded`] the zone is read first, names owned by
    /// someone else are skipped and the address joins our own record set at
    /// the name.
    pub async fn process(&self, endpoint: &Endpoint) -> Result<Applied> {
        endpoint.validate()?;
        let _writer = self.writer.lock().await;

        let change = match self.process_policy {
            ProcessPolicy::Trusting => self.trusting_change(endpoint),
            ProcessPolicy::Guarded => {
                let current = self.current_records().await?;
                self.guarded_change(endpoint, &current)
            }
        };

        debug!("Processing {}: {:?}", endpoint, change);
        self.apply(change).await
    }

    /// Read the zone, bounded by the provider timeout
    pub async fn current_records(&self) -> Result<ZoneSnapshot> {
        match tokio::time::timeout(self.timeout, self.provider.list_current_records()).await {
            Ok(result) => result,
            Err(_) => Err(Error::query(
                self.provider.provider_name(),
                format!("listing {} timed out after {:?}", self.zone, self.timeout),
            )),
        }
    }

    fn trusting_change(&self, endpoint: &Endpoint) -> Change {
        Change {
            additions: plan::managed_records(
                &endpoint.fqdn(),
                &[endpoint.address],
                &self.marker,
                self.ttl,
            ),
            deletions: Vec::new(),
        }
    }

    fn guarded_change(&self, endpoint: &Endpoint, current: &ZoneSnapshot) -> Change {
        let name = endpoint.fqdn();
        let entry = current.get(&name);

        match self.marker.classify(entry) {
            Ownership::Available => self.trusting_change(endpoint),
            Ownership::Owned => {
                let mut change = Change::new();
                let Some(entry) = entry else {
                    return change;
                };
                let record_type = endpoint.record_type();
                let existing = entry
                    .addresses
                    .iter()
                    .find(|rs| rs.record_type == record_type);

                let mut addresses: Vec<IpAddr> = existing
                    .map(|rs| rs.values.iter().filter_map(|v| v.parse().ok()).collect())
                    .unwrap_or_default();
                let up_to_date = addresses.contains(&endpoint.address)
                    && existing.is_some_and(|rs| rs.ttl == self.ttl)
                    && entry.marker.as_ref().is_some_and(|m| m.ttl == self.ttl);
                if up_to_date {
                    return change;
                }
                addresses.push(endpoint.address);

                change.deletions.extend(existing.cloned());
                change.deletions.extend(entry.marker.iter().cloned());
                change.additions = vec![
                    RecordSet::address(name.clone(), record_type, addresses, self.ttl),
                    self.marker.record(name, self.ttl),
                ];
                change
            }
            ownership => {
                info!("Not processing {}: name is not ours ({:?})", endpoint, ownership);
                Change::new()
            }
        }
    }

    /// Apply a change, treating "already exists" as success
    async fn apply(&self, change: Change) -> Result<Applied> {
        if change.is_empty() {
            info!("Didn't submit change for {} (no changes)", self.zone);
            return Ok(Applied::default());
        }

        let provider = self.provider.provider_name();
        let result = match tokio::time::timeout(self.timeout, self.provider.apply_change(&change))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::write(
                provider,
                format!("change for {} timed out after {:?}", self.zone, self.timeout),
            )),
        };

        match result {
            Ok(()) => {
                debug!("Change for {} applied", self.zone);
                Ok(Applied {
                    change,
                    conflict: false,
                })
            }
            Err(e) if e.is_conflict() => {
                warn!("Cannot update some DNS records in {} (already exist): {}", self.zone, e);
                Ok(Applied {
                    change: Change::new(),
                    conflict: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn log_owned(&self, current: &ZoneSnapshot) {
        debug!("Current records owned by {}:", self.marker.group_id());
        for (name, entry) in current.iter() {
            if self.marker.classify(Some(entry)) == Ownership::Owned {
                for record in &entry.addresses {
                    debug!("  {} {} {:?}", name, record.record_type, record.values);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::memory::MemoryZoneProvider;

    fn config(group_id: &str) -> MateConfig {
        MateConfig::new(
            ProviderConfig::Memory {
                zone: "example-com".to_string(),
            },
            group_id,
        )
    }

    #[tokio::test]
    async fn rejects_incomplete_configuration() {
        let result = Reconciler::new(Box::new(MemoryZoneProvider::new()), &config(""));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn trusting_process_writes_a_pair_without_reading() {
        let provider = MemoryZoneProvider::new();
        let reconciler = Reconciler::new(Box::new(provider.clone()), &config("g1")).unwrap();

        let applied = reconciler
            .process(&Endpoint::parse("a.example.com", "1.2.3.4").unwrap())
            .await
            .unwrap();

        assert!(!applied.conflict);
        assert_eq!(applied.change.additions.len(), 2);
        assert!(applied.change.deletions.is_empty());
        assert_eq!(provider.list_call_count(), 0);
        assert_eq!(provider.apply_call_count(), 1);
    }

    #[tokio::test]
    async fn unnamed_endpoint_is_invalid_input() {
        let provider = MemoryZoneProvider::new();
        let reconciler = Reconciler::new(Box::new(provider.clone()), &config("g1")).unwrap();

        let result = reconciler
            .process(&Endpoint::new("", "1.2.3.4".parse().unwrap()))
            .await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(provider.apply_call_count(), 0);
    }

    #[tokio::test]
    async fn rejected_process_reports_nothing_written() {
        let provider = MemoryZoneProvider::new();
        let reconciler = Reconciler::new(Box::new(provider.clone()), &config("g1")).unwrap();
        reconciler
            .process(&Endpoint::parse("a.example.com", "1.2.3.4").unwrap())
            .await
            .unwrap();

        let applied = reconciler
            .process(&Endpoint::parse("a.example.com", "5.6.7.8").unwrap())
            .await
            .unwrap();

        assert!(applied.conflict);
        assert!(applied.is_empty());
        assert_eq!(provider.apply_call_count(), 2);
    }
}
