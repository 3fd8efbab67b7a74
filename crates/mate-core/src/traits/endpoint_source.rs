// # Endpoint Source Trait
//
// Defines the interface to the registry that discovers endpoints.
//
// ## Implementations
//
// - HTTP polling: `mate-source-http` crate
// - In-process channel: `mate_core::memory::ChannelEndpointSource`
//
// ## Usage
//
// ```rust,ignore
// use mate_core::EndpointSource;
// use tokio_stream::StreamExt;
//
// let desired = source.endpoints().await?;
//
// let mut events = source.watch();
// while let Some(event) = events.next().await {
//     println!("endpoint changed: {:?}", event);
// }
// ```

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::record::Endpoint;

/// An incremental change reported by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// An endpoint appeared or its address changed
    Upserted(Endpoint),
    /// An endpoint disappeared
    Removed(Endpoint),
}

impl EndpointEvent {
    /// The endpoint this event is about
    pub fn endpoint(&self) -> &Endpoint {
        match self {
            EndpointEvent::Upserted(endpoint) | EndpointEvent::Removed(endpoint) => endpoint,
        }
    }
}

/// Stream of endpoint events
pub type EndpointStream = Pin<Box<dyn Stream<Item = EndpointEvent> + Send + 'static>>;

/// Trait for endpoint registries
///
/// # Trust Level: Semi-Trusted
///
/// Sources observe the registry; they never touch the zone and never decide
/// when to reconcile.
#[async_trait]
pub trait EndpointSource: Send + Sync {
    /// Fetch the complete current endpoint set
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Endpoint>)`: Every endpoint this instance should publish
    /// - `Err(Error::EndpointSource)`: The registry could not be read
    async fn endpoints(&self) -> Result<Vec<Endpoint>, crate::Error>;

    /// Subscribe to incremental endpoint changes
    ///
    /// The stream ends when the registry closes the feed. Dropping the
    /// stream unsubscribes.
    fn watch(&self) -> EndpointStream;
}

/// Helper trait for constructing endpoint sources from configuration
pub trait EndpointSourceFactory: Send + Sync {
    /// Create an EndpointSource instance from configuration
    fn create(
        &self,
        config: &crate::config::EndpointSourceConfig,
    ) -> Result<Box<dyn EndpointSource>, crate::Error>;
}
