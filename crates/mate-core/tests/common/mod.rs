//! Test doubles and common utilities for contract tests
//!
//! The in-memory zone from mate-core covers the provider side; this module
//! adds endpoint sources with call counters and a few builders.

#![allow(dead_code)]

use mate_core::traits::EndpointStream;
use mate_core::{
    ControllerEvent, Endpoint, EndpointSource, Error, MateConfig, MemoryZoneProvider,
    OwnershipMarker, ProviderConfig, RecordSet, RecordType, Reconciler, Result,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Minimal valid configuration for one record group
pub fn minimal_config(group_id: &str) -> MateConfig {
    MateConfig::new(
        ProviderConfig::Memory {
            zone: "example-com".to_string(),
        },
        group_id,
    )
}

/// Parse an endpoint
pub fn ep(name: &str, address: &str) -> Endpoint {
    Endpoint::parse(name, address).expect("valid endpoint")
}

/// An A record set with TTL 300
pub fn a_record(name: &str, values: &[&str]) -> RecordSet {
    RecordSet::new(
        name,
        RecordType::A,
        values.iter().map(|v| v.to_string()).collect(),
        300,
    )
}

/// Seed a name owned by `group_id`
pub async fn seed_owned(zone: &MemoryZoneProvider, group_id: &str, name: &str, address: &str) {
    zone.insert(a_record(name, &[address])).await;
    zone.insert(OwnershipMarker::new(group_id).record(name, 300))
        .await;
}

/// Build a reconciler over a clone of `zone`
pub fn reconciler(zone: &MemoryZoneProvider, config: &MateConfig) -> Arc<Reconciler> {
    Arc::new(Reconciler::new(Box::new(zone.clone()), config).expect("valid config"))
}

/// Names owned by `group_id` in the zone
pub async fn owned_names(zone: &MemoryZoneProvider, group_id: &str) -> Vec<String> {
    let marker = OwnershipMarker::new(group_id);
    zone.records()
        .await
        .into_iter()
        .filter(|record| marker.is_owned(Some(record)))
        .map(|record| record.name)
        .collect()
}

/// Receive controller events until one matches, or fail after two seconds
pub async fn wait_for_event(
    events: &mut mpsc::Receiver<ControllerEvent>,
    matches: impl Fn(&ControllerEvent) -> bool,
) -> ControllerEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Some(event) if matches(&event) => return event,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("event arrives in time")
}

/// An endpoint source whose registry cannot be read
pub struct FailingEndpointSource {
    endpoints_call_count: Arc<AtomicUsize>,
}

impl FailingEndpointSource {
    pub fn new() -> Self {
        Self {
            endpoints_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn endpoints_call_count(&self) -> usize {
        self.endpoints_call_count.load(Ordering::SeqCst)
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            endpoints_call_count: Arc::clone(&other.endpoints_call_count),
        }
    }
}

#[async_trait::async_trait]
impl EndpointSource for FailingEndpointSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>> {
        self.endpoints_call_count.fetch_add(1, Ordering::SeqCst);
        Err(Error::endpoint_source("registry unreachable"))
    }

    fn watch(&self) -> EndpointStream {
        Box::pin(tokio_stream::empty())
    }
}

/// Wraps an endpoint source and counts calls
pub struct CountingEndpointSource<S> {
    inner: S,
    endpoints_call_count: Arc<AtomicUsize>,
    watch_call_count: Arc<AtomicUsize>,
}

/// Shared counters of a [`CountingEndpointSource`]
#[derive(Clone)]
pub struct SourceCounters {
    endpoints_call_count: Arc<AtomicUsize>,
    watch_call_count: Arc<AtomicUsize>,
}

impl SourceCounters {
    pub fn endpoints_call_count(&self) -> usize {
        self.endpoints_call_count.load(Ordering::SeqCst)
    }

    pub fn watch_call_count(&self) -> usize {
        self.watch_call_count.load(Ordering::SeqCst)
    }
}

impl<S> CountingEndpointSource<S> {
    pub fn new(inner: S) -> (Self, SourceCounters) {
        let counters = SourceCounters {
            endpoints_call_count: Arc::new(AtomicUsize::new(0)),
            watch_call_count: Arc::new(AtomicUsize::new(0)),
        };
        let source = Self {
            inner,
            endpoints_call_count: Arc::clone(&counters.endpoints_call_count),
            watch_call_count: Arc::clone(&counters.watch_call_count),
        };
        (source, counters)
    }
}

#[async_trait::async_trait]
impl<S: EndpointSource> EndpointSource for CountingEndpointSource<S> {
    async fn endpoints(&self) -> Result<Vec<Endpoint>> {
        self.endpoints_call_count.fetch_add(1, Ordering::SeqCst);
        self.inner.endpoints().await
    }

    fn watch(&self) -> EndpointStream {
        self.watch_call_count.fetch_add(1, Ordering::SeqCst);
        self.inner.watch()
    }
}
