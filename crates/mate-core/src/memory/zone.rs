// # Memory Zone Provider
//
// In-memory implementation of ZoneProvider.
//
// ## Semantics
//
// Changes follow the rules of cloud DNS change batches:
// - Every deletion must match an existing record set exactly
// - Every addition must not collide with a record set left after deletions
// - A change is validated as a whole before anything is mutated
//
// A colliding addition is reported as a conflict, the same way a cloud
// backend reports "already exists".
//
// ## When to Use
//
// - Testing environments
// - Dry runs of a full sync against a seeded zone

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::config::ProviderConfig;
use crate::record::{Change, RecordSet, RecordType, ZoneSnapshot, absolute_name};
use crate::traits::{ZoneProvider, ZoneProviderFactory};
use crate::Error;

const PROVIDER_NAME: &str = "memory";

/// Failure to inject into the next provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `list_current_records` fails with a query error
    Query,
    /// `apply_change` fails with a write error
    Write,
    /// `apply_change` fails with a conflict
    Conflict,
    /// Every call blocks forever
    Hang,
}

type RecordKey = (String, RecordType);

#[derive(Debug, Default)]
struct Inner {
    records: RwLock<BTreeMap<RecordKey, RecordSet>>,
    applied: Mutex<Vec<Change>>,
    fault: Mutex<Option<Fault>>,
    list_calls: AtomicUsize,
    apply_calls: AtomicUsize,
}

/// In-memory zone provider implementation
///
/// Clones share the same zone, so a test can keep a handle while the
/// reconciler owns another.
///
/// # Example
///
/// ```rust,no_run
/// use mate_core::{Change, MemoryZoneProvider, OwnershipMarker, ZoneProvider};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let zone = MemoryZoneProvider::new();
///     zone.insert(OwnershipMarker::new("g1").record("a.example.com.", 300)).await;
///
///     let snapshot = zone.list_current_records().await?;
///     assert!(snapshot.contains("a.example.com"));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryZoneProvider {
    inner: Arc<Inner>,
}

impl MemoryZoneProvider {
    /// Create a new empty zone
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record set, replacing any set with the same name and type
    pub async fn insert(&self, record: RecordSet) {
        let mut guard = self.inner.records.write().await;
        guard.insert(key(&record), record);
    }

    /// Remove a record set by name and type
    pub async fn remove(&self, name: &str, record_type: RecordType) -> Option<RecordSet> {
        let mut guard = self.inner.records.write().await;
        guard.remove(&(absolute_name(name), record_type))
    }

    /// All record sets, sorted by name and type
    pub async fn records(&self) -> Vec<RecordSet> {
        self.inner.records.read().await.values().cloned().collect()
    }

    /// Every change accepted so far, in order
    pub async fn applied_changes(&self) -> Vec<Change> {
        self.inner.applied.lock().await.clone()
    }

    /// Make subsequent calls fail until cleared with `None`
    pub async fn set_fault(&self, fault: Option<Fault>) {
        *self.inner.fault.lock().await = fault;
    }

    /// Number of `list_current_records` calls
    pub fn list_call_count(&self) -> usize {
        self.inner.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `apply_change` calls that reached the zone
    pub fn apply_call_count(&self) -> usize {
        self.inner.apply_calls.load(Ordering::SeqCst)
    }

    async fn fault(&self) -> Option<Fault> {
        let fault = *self.inner.fault.lock().await;
        if fault == Some(Fault::Hang) {
            std::future::pending::<()>().await;
        }
        fault
    }
}

fn key(record: &RecordSet) -> RecordKey {
    (absolute_name(&record.name), record.record_type.clone())
}

#[async_trait]
impl ZoneProvider for MemoryZoneProvider {
    async fn list_current_records(&self) -> Result<ZoneSnapshot, Error> {
        self.inner.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fault().await == Some(Fault::Query) {
            return Err(Error::query(PROVIDER_NAME, "injected query failure"));
        }

        let guard = self.inner.records.read().await;
        Ok(guard.values().cloned().collect())
    }

    async fn apply_change(&self, change: &Change) -> Result<(), Error> {
        if change.is_empty() {
            return Ok(());
        }
        self.inner.apply_calls.fetch_add(1, Ordering::SeqCst);

        match self.fault().await {
            Some(Fault::Write) => {
                return Err(Error::write(PROVIDER_NAME, "injected write failure"));
            }
            Some(Fault::Conflict) => {
                return Err(Error::conflict(PROVIDER_NAME, "injected conflict"));
            }
            _ => {}
        }

        let mut guard = self.inner.records.write().await;
        let mut next = guard.clone();

        for deletion in &change.deletions {
            match next.get(&key(deletion)) {
                Some(existing) if existing == deletion => {
                    next.remove(&key(deletion));
                }
                Some(existing) => {
                    return Err(Error::write(
                        PROVIDER_NAME,
                        format!("deletion of {} does not match {}", deletion, existing),
                    ));
                }
                None => {
                    return Err(Error::write(
                        PROVIDER_NAME,
                        format!("deletion of {} does not match any record", deletion),
                    ));
                }
            }
        }

        for addition in &change.additions {
            if next.contains_key(&key(addition)) {
                return Err(Error::conflict(
                    PROVIDER_NAME,
                    format!("{} {} already exists", addition.name, addition.record_type),
                ));
            }
            next.insert(key(addition), addition.clone());
        }

        *guard = next;
        self.inner.applied.lock().await.push(change.clone());
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating memory zone providers
pub struct MemoryProviderFactory;

impl ZoneProviderFactory for MemoryProviderFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn ZoneProvider>, Error> {
        match config {
            ProviderConfig::Memory { .. } => Ok(Box::new(MemoryZoneProvider::new())),
            _ => Err(Error::config("Invalid config for memory provider")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ownership::OwnershipMarker;

    fn a(name: &str, value: &str) -> RecordSet {
        RecordSet::new(name, RecordType::A, vec![value.to_string()], 300)
    }

    #[tokio::test]
    async fn empty_change_makes_no_call() {
        let zone = MemoryZoneProvider::new();
        zone.apply_change(&Change::new()).await.unwrap();
        assert_eq!(zone.apply_call_count(), 0);
        assert!(zone.applied_changes().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_addition_is_a_conflict() {
        let zone = MemoryZoneProvider::new();
        zone.insert(a("a.example.com.", "1.2.3.4")).await;

        let change = Change {
            additions: vec![a("a.example.com.", "5.6.7.8")],
            deletions: Vec::new(),
        };
        let err = zone.apply_change(&change).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(zone.records().await, vec![a("a.example.com.", "1.2.3.4")]);
    }

    #[tokio::test]
    async fn mismatched_deletion_rejects_the_whole_change() {
        let zone = MemoryZoneProvider::new();
        zone.insert(a("a.example.com.", "1.2.3.4")).await;

        let change = Change {
            additions: vec![a("b.example.com.", "5.6.7.8")],
            deletions: vec![a("a.example.com.", "9.9.9.9")],
        };
        let err = zone.apply_change(&change).await.unwrap_err();
        assert!(matches!(err, Error::ProviderWrite { .. }));
        assert_eq!(zone.records().await.len(), 1);
    }

    #[tokio::test]
    async fn replace_in_one_change() {
        let zone = MemoryZoneProvider::new();
        zone.insert(a("a.example.com.", "1.2.3.4")).await;

        let change = Change {
            additions: vec![a("a.example.com.", "5.6.7.8")],
            deletions: vec![a("a.example.com.", "1.2.3.4")],
        };
        zone.apply_change(&change).await.unwrap();
        assert_eq!(zone.records().await, vec![a("a.example.com.", "5.6.7.8")]);
        assert_eq!(zone.applied_changes().await, vec![change]);
    }

    #[tokio::test]
    async fn snapshot_groups_records_by_name() {
        let zone = MemoryZoneProvider::new();
        let marker = OwnershipMarker::new("g1");
        zone.insert(a("a.example.com.", "1.2.3.4")).await;
        zone.insert(marker.record("a.example.com.", 300)).await;
        zone.insert(a("b.example.com.", "5.6.7.8")).await;

        let snapshot = zone.list_current_records().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(marker.is_owned(snapshot.get("a.example.com").unwrap().marker.as_ref()));
        assert!(snapshot.get("b.example.com").unwrap().marker.is_none());
    }

    #[tokio::test]
    async fn injected_faults_surface_as_errors() {
        let zone = MemoryZoneProvider::new();
        zone.set_fault(Some(Fault::Query)).await;
        assert!(matches!(
            zone.list_current_records().await,
            Err(Error::ProviderQuery { .. })
        ));

        zone.set_fault(None).await;
        assert!(zone.list_current_records().await.is_ok());
    }

    #[test]
    fn factory_rejects_foreign_config() {
        let config = ProviderConfig::Google {
            project: "p".into(),
            zone: "z".into(),
            access_token: "t".into(),
            base_url: None,
        };
        assert!(MemoryProviderFactory.create(&config).is_err());
    }
}
