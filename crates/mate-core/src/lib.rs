// # mate-core
//
// Core library for keeping a DNS zone in sync with a registry of endpoints.
//
// ## Architecture Overview
//
// - **EndpointSource**: Trait for fetching and watching the desired endpoints
// - **ZoneProvider**: Trait for reading a zone and applying batched changes
// - **OwnershipMarker**: TXT-record protocol deciding which names we manage
// - **Reconciler**: Computes diffs against the zone and applies them
// - **Controller**: Runs the initial full sync, then watches the source
// - **ProviderRegistry**: Plugin-based registry for providers and sources
//
// ## Design Principles
//
// 1. **Provider-agnostic**: The reconciler never sees backend-specific types
// 2. **State lives in DNS**: Ownership is recomputed from the zone every cycle
// 3. **Single writer**: All zone-mutating operations are serialized
// 4. **Library-First**: The daemon is a thin layer over this crate

pub mod config;
pub mod controller;
pub mod error;
pub mod memory;
pub mod ownership;
pub mod reconciler;
pub mod record;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use config::{ControllerConfig, EndpointSourceConfig, MateConfig, ProcessPolicy, ProviderConfig};
pub use controller::{Controller, ControllerEvent, ControllerHandle, ControllerState};
pub use error::{Error, Result};
pub use memory::{ChannelEndpointSource, EndpointSender, MemoryZoneProvider};
pub use ownership::{Ownership, OwnershipMarker};
pub use reconciler::{Applied, Reconciler};
pub use record::{Change, Endpoint, RecordSet, RecordType, ZoneEntry, ZoneSnapshot};
pub use registry::ProviderRegistry;
pub use traits::{EndpointEvent, EndpointSource, ZoneProvider};
