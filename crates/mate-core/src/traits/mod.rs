//! Core traits for mate
//!
//! This module defines the two collaborator interfaces the core depends on.
//!
//! - [`ZoneProvider`]: Read a zone and apply batched changes
//! - [`EndpointSource`]: Fetch and watch the desired endpoints

pub mod endpoint_source;
pub mod zone_provider;

pub use endpoint_source::{EndpointEvent, EndpointSource, EndpointSourceFactory, EndpointStream};
pub use zone_provider::{ZoneProvider, ZoneProviderFactory};
