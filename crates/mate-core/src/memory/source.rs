// # Channel Endpoint Source
//
// An endpoint registry driven from inside the process. The embedding
// application (or a test) holds an EndpointSender and pushes changes; the
// controller sees them through `watch()`.
//
// The feed ends once every EndpointSender is dropped.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;

use crate::record::Endpoint;
use crate::traits::{EndpointEvent, EndpointSource, EndpointStream};
use crate::Error;

type Registry = Arc<RwLock<Vec<Endpoint>>>;

/// In-process endpoint source
pub struct ChannelEndpointSource {
    endpoints: Registry,
    feed: Mutex<Option<mpsc::UnboundedReceiver<EndpointEvent>>>,
}

/// Write side of a [`ChannelEndpointSource`]
#[derive(Clone)]
pub struct EndpointSender {
    endpoints: Registry,
    tx: mpsc::UnboundedSender<EndpointEvent>,
}

impl ChannelEndpointSource {
    /// Create a source holding `initial` and the sender that drives it
    pub fn new(initial: Vec<Endpoint>) -> (Self, EndpointSender) {
        let endpoints = Arc::new(RwLock::new(initial));
        let (tx, rx) = mpsc::unbounded_channel();

        let source = Self {
            endpoints: Arc::clone(&endpoints),
            feed: Mutex::new(Some(rx)),
        };
        (source, EndpointSender { endpoints, tx })
    }
}

#[async_trait]
impl EndpointSource for ChannelEndpointSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, Error> {
        Ok(self.endpoints.read().await.clone())
    }

    fn watch(&self) -> EndpointStream {
        let rx = self.feed.lock().ok().and_then(|mut feed| feed.take());
        match rx {
            Some(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            None => {
                warn!("Channel endpoint source is already being watched");
                Box::pin(tokio_stream::empty())
            }
        }
    }
}

impl EndpointSender {
    /// Publish an endpoint, replacing any endpoint with the same name
    ///
    /// Emits `Upserted` for the new endpoint, then `Removed` for every
    /// endpoint it replaced.
    pub async fn upsert(&self, endpoint: Endpoint) -> Result<(), Error> {
        let replaced: Vec<Endpoint> = {
            let mut endpoints = self.endpoints.write().await;
            let name = endpoint.fqdn();
            let (replaced, kept): (Vec<Endpoint>, Vec<Endpoint>) =
                endpoints.drain(..).partition(|e| e.fqdn() == name);
            *endpoints = kept;
            endpoints.push(endpoint.clone());
            replaced
        };

        let address = endpoint.address;
        self.send(EndpointEvent::Upserted(endpoint))?;
        for old in replaced.into_iter().filter(|e| e.address != address) {
            self.send(EndpointEvent::Removed(old))?;
        }
        Ok(())
    }

    /// Publish an additional address for a name, keeping the ones it has
    pub async fn add(&self, endpoint: Endpoint) -> Result<(), Error> {
        {
            let mut endpoints = self.endpoints.write().await;
            if !endpoints.contains(&endpoint) {
                endpoints.push(endpoint.clone());
            }
        }
        self.send(EndpointEvent::Upserted(endpoint))
    }

    /// Withdraw an endpoint
    pub async fn remove(&self, endpoint: Endpoint) -> Result<(), Error> {
        {
            let mut endpoints = self.endpoints.write().await;
            let name = endpoint.fqdn();
            endpoints.retain(|e| !(e.fqdn() == name && e.address == endpoint.address));
        }
        self.send(EndpointEvent::Removed(endpoint))
    }

    /// Replace the whole registry without emitting events
    ///
    /// The next full sync picks the new set up.
    pub async fn set_endpoints(&self, endpoints: Vec<Endpoint>) {
        *self.endpoints.write().await = endpoints;
    }

    /// Whether the source side is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, event: EndpointEvent) -> Result<(), Error> {
        self.tx
            .send(event)
            .map_err(|_| Error::endpoint_source("Endpoint feed is closed"))
    }
}
