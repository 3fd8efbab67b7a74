// # HTTP Endpoint Source
//
// Reads the desired endpoints from a registry that serves them as JSON:
//
// ```json
// [{"name": "a.example.com", "address": "1.2.3.4"}]
// ```
//
// ## Architecture
//
// - `endpoints()` fetches the list once and remembers it
// - `watch()` polls the same URL at a fixed interval and emits the
//   difference to the previous poll: `Upserted` for new endpoints first,
//   then `Removed` for vanished ones
// - A failed poll is logged and skipped; the feed keeps running until the
//   stream is dropped

use mate_core::ProviderRegistry;
use mate_core::config::EndpointSourceConfig;
use mate_core::traits::{EndpointEvent, EndpointSource, EndpointSourceFactory, EndpointStream};
use mate_core::{Endpoint, Error, Result};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Default polling interval
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Per-request HTTP timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

type EndpointSet = BTreeSet<Endpoint>;

/// HTTP-polling endpoint source
pub struct HttpEndpointSource {
    /// URL serving the endpoint list
    url: String,

    /// Polling interval
    poll_interval: Duration,

    /// Last list fetched by `endpoints()`, the baseline for `watch()`
    last_seen: Arc<Mutex<Option<EndpointSet>>>,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpEndpointSource {
    /// Create a new HTTP endpoint source with the default interval
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_interval(url, Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS))
    }

    /// Create with custom polling interval
    pub fn with_interval(url: impl Into<String>, poll_interval: Duration) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(Error::config("HTTP source URL cannot be empty"));
        }
        if poll_interval.is_zero() {
            return Err(Error::config("HTTP source interval must be > 0"));
        }

        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url,
            poll_interval,
            last_seen: Arc::new(Mutex::new(None)),
            client,
        })
    }
}

/// Fetch and validate the endpoint list
async fn fetch(client: &reqwest::Client, url: &str) -> Result<EndpointSet> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::endpoint_source(format!("Request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(Error::endpoint_source(format!(
            "HTTP error: {}",
            response.status()
        )));
    }

    let endpoints: Vec<Endpoint> = response
        .json()
        .await
        .map_err(|e| Error::endpoint_source(format!("Invalid endpoint list: {}", e)))?;

    for endpoint in &endpoints {
        endpoint
            .validate()
            .map_err(|e| Error::endpoint_source(e.to_string()))?;
    }

    Ok(endpoints.into_iter().collect())
}

/// Events turning `previous` into `current`
fn diff(previous: &EndpointSet, current: &EndpointSet) -> Vec<EndpointEvent> {
    let upserted = current
        .difference(previous)
        .cloned()
        .map(EndpointEvent::Upserted);
    let removed = previous
        .difference(current)
        .cloned()
        .map(EndpointEvent::Removed);
    upserted.chain(removed).collect()
}

#[async_trait::async_trait]
impl EndpointSource for HttpEndpointSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>> {
        let endpoints = fetch(&self.client, &self.url).await?;
        tracing::debug!("Fetched {} endpoint(s) from {}", endpoints.len(), self.url);

        let list = endpoints.iter().cloned().collect();
        *self.last_seen.lock().await = Some(endpoints);
        Ok(list)
    }

    fn watch(&self) -> EndpointStream {
        let (tx, rx) = mpsc::unbounded_channel();

        let url = self.url.clone();
        let poll_interval = self.poll_interval;
        let last_seen = Arc::clone(&self.last_seen);
        let client = self.client.clone();

        tokio::spawn(async move {
            tracing::info!(
                "Starting HTTP endpoint polling (url={}, interval={:?})",
                url,
                poll_interval
            );

            let mut previous = last_seen.lock().await.clone();

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }

                let current = match fetch(&client, &url).await {
                    Ok(current) => current,
                    Err(e) => {
                        tracing::warn!("Endpoint poll failed: {}", e);
                        continue;
                    }
                };

                if let Some(previous) = &previous {
                    for event in diff(previous, &current) {
                        tracing::debug!("Endpoint change: {:?}", event);
                        if tx.send(event).is_err() {
                            tracing::debug!("Receiver dropped, stopping poll");
                            return;
                        }
                    }
                }

                *last_seen.lock().await = Some(current.clone());
                previous = Some(current);
            }

            tracing::debug!("Endpoint feed dropped, stopping poll");
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }
}

/// Factory for creating HTTP endpoint sources
pub struct HttpSourceFactory;

impl EndpointSourceFactory for HttpSourceFactory {
    fn create(&self, config: &EndpointSourceConfig) -> Result<Box<dyn EndpointSource>> {
        match config {
            EndpointSourceConfig::Http { url, interval_secs } => Ok(Box::new(
                HttpEndpointSource::with_interval(url.clone(), Duration::from_secs(*interval_secs))?,
            )),
            _ => Err(Error::config("Invalid config for HTTP endpoint source")),
        }
    }
}

/// Register the HTTP endpoint source with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_endpoint_source("http", Box::new(HttpSourceFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(name: &str, address: &str) -> Endpoint {
        Endpoint::parse(name, address).unwrap()
    }

    #[test]
    fn test_factory_creation() {
        let config = EndpointSourceConfig::Http {
            url: "http://registry.local/endpoints".to_string(),
            interval_secs: 30,
        };
        assert!(HttpSourceFactory.create(&config).is_ok());
    }

    #[test]
    fn test_factory_rejects_zero_interval() {
        let config = EndpointSourceConfig::Http {
            url: "http://registry.local/endpoints".to_string(),
            interval_secs: 0,
        };
        assert!(HttpSourceFactory.create(&config).is_err());
    }

    #[test]
    fn test_diff_orders_upserts_before_removals() {
        let previous: EndpointSet = [ep("a.example.com", "1.2.3.4"), ep("b.example.com", "1.2.3.4")]
            .into_iter()
            .collect();
        let current: EndpointSet = [ep("a.example.com", "5.6.7.8"), ep("b.example.com", "1.2.3.4")]
            .into_iter()
            .collect();

        assert_eq!(
            diff(&previous, &current),
            vec![
                EndpointEvent::Upserted(ep("a.example.com", "5.6.7.8")),
                EndpointEvent::Removed(ep("a.example.com", "1.2.3.4")),
            ]
        );
    }

    #[test]
    fn test_diff_of_equal_sets_is_empty() {
        let set: EndpointSet = [ep("a.example.com", "1.2.3.4")].into_iter().collect();
        assert!(diff(&set, &set).is_empty());
    }
}
