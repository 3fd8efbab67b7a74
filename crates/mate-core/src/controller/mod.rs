//! Controller: startup sync followed by the watch loop
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──start()──► SyncingFull ──ok──► Watching ──stop / feed closed──► Terminated
//!                        │                  │
//!                        │ error            │ process error
//!                        ▼                  │ (stop_on_process_error)
//!                   Terminated ◄────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. `EndpointSource::endpoints()` feeds one full sync
//! 2. In sync-only mode the controller terminates here
//! 3. Otherwise a single task consumes `EndpointSource::watch()`:
//!    - `Upserted` → `Reconciler::process()`, followed by a full resync
//!      when the write collided with records already in the zone
//!    - `Removed` → full resync against `endpoints()`
//!    - periodic tick (if configured) → full resync
//! 4. Stop is only observed between operations, so a write is never cut
//!    in half

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::MateConfig;
use crate::error::{Error, Result};
use crate::reconciler::{Applied, Reconciler};
use crate::record::Endpoint;
use crate::traits::{EndpointEvent, EndpointSource, EndpointStream};

/// Lifecycle state of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Created, not started
    Idle,
    /// Running the startup sync
    SyncingFull,
    /// Consuming the endpoint feed
    Watching,
    /// Finished, successfully or not
    Terminated,
}

/// Events emitted by the Controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Controller started
    Started { zone: String },

    /// A full sync was applied
    SyncCompleted { additions: usize, deletions: usize },

    /// A full sync failed
    SyncFailed { error: String },

    /// An incremental update was handled; the counts are the records that
    /// reached the zone
    EndpointProcessed {
        endpoint: Endpoint,
        additions: usize,
        deletions: usize,
    },

    /// An incremental update failed
    ProcessFailed { endpoint: Endpoint, error: String },

    /// Controller stopped
    Stopped { reason: String },
}

/// Drives one reconciler from one endpoint source
pub struct Controller {
    /// Registry of desired endpoints
    source: Box<dyn EndpointSource>,

    /// Shared reconciler
    reconciler: Arc<Reconciler>,

    /// Stop after the startup sync
    sync_only: bool,

    /// Periodic full resync while watching
    resync_interval: Option<Duration>,

    /// Terminate the watch loop on the first failed update
    stop_on_process_error: bool,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ControllerEvent>,

    /// Current lifecycle state
    state: watch::Sender<ControllerState>,
}

impl Controller {
    /// Create a new controller
    ///
    /// # Returns
    ///
    /// A tuple of (controller, event_receiver) where event_receiver yields
    /// controller events
    pub fn new(
        source: Box<dyn EndpointSource>,
        reconciler: Arc<Reconciler>,
        config: &MateConfig,
    ) -> Result<(Self, mpsc::Receiver<ControllerEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.controller.event_channel_capacity);
        let (state, _) = watch::channel(ControllerState::Idle);

        let controller = Self {
            source,
            reconciler,
            sync_only: config.sync_only,
            resync_interval: config.controller.resync_interval(),
            stop_on_process_error: config.controller.stop_on_process_error,
            event_tx: tx,
            state,
        };

        Ok((controller, rx))
    }

    /// Current lifecycle state
    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Run the startup sync, then start watching
    ///
    /// # Returns
    ///
    /// - `Ok(ControllerHandle)`: The sync succeeded; in sync-only mode the
    ///   handle is already terminated
    /// - `Err(Error)`: The sync failed and the controller is terminated
    pub async fn start(self) -> Result<ControllerHandle> {
        self.emit_event(ControllerEvent::Started {
            zone: self.reconciler.zone().to_string(),
        });
        self.state.send_replace(ControllerState::SyncingFull);

        if let Err(e) = self.full_sync().await {
            error!("Initial sync of {} failed: {}", self.reconciler.zone(), e);
            self.terminate(format!("Initial sync failed: {}", e));
            return Err(e);
        }

        let state = self.state.subscribe();

        if self.sync_only {
            info!("Sync-only mode, not watching for endpoint changes");
            self.terminate("Sync only".to_string());
            return Ok(ControllerHandle {
                stop: None,
                task: None,
                state,
            });
        }

        let events = self.source.watch();
        let (stop_tx, stop_rx) = oneshot::channel();
        self.state.send_replace(ControllerState::Watching);
        info!("Watching for endpoint changes");

        let task = tokio::spawn(self.watch_loop(events, stop_rx));

        Ok(ControllerHandle {
            stop: Some(stop_tx),
            task: Some(task),
            state,
        })
    }

    async fn watch_loop(
        self,
        mut events: EndpointStream,
        mut stop_rx: oneshot::Receiver<()>,
    ) -> Result<()> {
        let mut resync = self.resync_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let reason = loop {
            tokio::select! {
                _ = &mut stop_rx => break "Stop requested",

                event = events.next() => {
                    let Some(event) = event else {
                        break "Endpoint feed closed";
                    };
                    if let Err(e) = self.handle_event(event).await {
                        if self.stop_on_process_error {
                            self.terminate(format!("Update failed: {}", e));
                            return Err(e);
                        }
                    }
                }

                _ = next_tick(&mut resync) => {
                    debug!("Periodic resync");
                    if let Err(e) = self.full_sync().await {
                        error!("Periodic resync failed: {}", e);
                        if self.stop_on_process_error {
                            self.terminate(format!("Resync failed: {}", e));
                            return Err(e);
                        }
                    }
                }
            }
        };

        info!("Controller stopping: {}", reason);
        self.terminate(reason.to_string());
        Ok(())
    }

    async fn handle_event(&self, event: EndpointEvent) -> Result<()> {
        match event {
            EndpointEvent::Upserted(endpoint) => {
                debug!("Endpoint upserted: {}", endpoint);
                match self.reconciler.process(&endpoint).await {
                    Ok(applied) => {
                        self.emit_event(ControllerEvent::EndpointProcessed {
                            endpoint: endpoint.clone(),
                            additions: applied.change.additions.len(),
                            deletions: applied.change.deletions.len(),
                        });
                        if applied.conflict {
                            info!("Update of {} collided with existing records, resyncing", endpoint);
                            if let Err(e) = self.full_sync().await {
                                error!("Resync after updating {} failed: {}", endpoint, e);
                                return Err(e);
                            }
                        }
                        Ok(())
                    }
                    Err(e) => {
                        error!("Failed to process {}: {}", endpoint, e);
                        self.emit_event(ControllerEvent::ProcessFailed {
                            endpoint,
                            error: e.to_string(),
                        });
                        Err(e)
                    }
                }
            }
            EndpointEvent::Removed(endpoint) => {
                info!("Endpoint removed: {}, resyncing", endpoint);
                if let Err(e) = self.full_sync().await {
                    error!("Resync after removing {} failed: {}", endpoint, e);
                    return Err(e);
                }
                Ok(())
            }
        }
    }

    async fn full_sync(&self) -> Result<Applied> {
        let result = match self.source.endpoints().await {
            Ok(desired) => self.reconciler.sync(&desired).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(applied) => self.emit_event(ControllerEvent::SyncCompleted {
                additions: applied.change.additions.len(),
                deletions: applied.change.deletions.len(),
            }),
            Err(e) => self.emit_event(ControllerEvent::SyncFailed {
                error: e.to_string(),
            }),
        }
        result
    }

    fn terminate(&self, reason: String) {
        self.state.send_replace(ControllerState::Terminated);
        self.emit_event(ControllerEvent::Stopped { reason });
    }

    fn emit_event(&self, event: ControllerEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Handle to a started controller
///
/// Dropping the handle stops the watch loop after its current operation.
pub struct ControllerHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<()>>>,
    state: watch::Receiver<ControllerState>,
}

impl ControllerHandle {
    /// Current lifecycle state
    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Ask the watch loop to stop
    ///
    /// The operation in flight, if any, completes first.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    /// Wait for the watch loop to exit
    ///
    /// Returns the error that terminated the loop, if any.
    pub async fn join(mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        match task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Other(format!("Controller task failed: {}", e))),
        }
    }

    /// Wait until the controller reaches `target`
    pub async fn wait_for(&mut self, target: ControllerState) -> Result<()> {
        self.state
            .wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| Error::Other("Controller is gone".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::memory::{ChannelEndpointSource, MemoryZoneProvider};

    fn config() -> MateConfig {
        MateConfig::new(
            ProviderConfig::Memory {
                zone: "example-com".to_string(),
            },
            "g1",
        )
    }

    #[tokio::test]
    async fn starts_idle() {
        let zone = MemoryZoneProvider::new();
        let reconciler = Arc::new(Reconciler::new(Box::new(zone), &config()).unwrap());
        let (source, _sender) = ChannelEndpointSource::new(Vec::new());

        let (controller, _events) =
            Controller::new(Box::new(source), reconciler, &config()).unwrap();
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn sync_only_handle_is_already_terminated() {
        let mut cfg = config();
        cfg.sync_only = true;

        let zone = MemoryZoneProvider::new();
        let reconciler = Arc::new(Reconciler::new(Box::new(zone.clone()), &cfg).unwrap());
        let (source, _sender) =
            ChannelEndpointSource::new(vec![Endpoint::parse("a.example.com", "1.2.3.4").unwrap()]);

        let (controller, mut events) =
            Controller::new(Box::new(source), reconciler, &cfg).unwrap();
        let handle = controller.start().await.unwrap();

        assert_eq!(handle.state(), ControllerState::Terminated);
        handle.join().await.unwrap();
        assert_eq!(zone.records().await.len(), 2);

        assert!(matches!(events.recv().await, Some(ControllerEvent::Started { .. })));
        assert_eq!(
            events.recv().await,
            Some(ControllerEvent::SyncCompleted {
                additions: 2,
                deletions: 0
            })
        );
        assert!(matches!(events.recv().await, Some(ControllerEvent::Stopped { .. })));
    }
}
