//! ==============================================================================
//! broadcast.rs - periodic push of the latest readings
//! ==============================================================================
//!
//! purpose:
//!     once per interval, read the shared view settings, query the store and
//!     publish an `updateSensorData` event to every connected client.
//!
//! lifecycle:
//!     the loop is started lazily by the first websocket connection and then
//!     runs for the life of the process. a single-start flag makes repeated
//!     `ensure_started` calls no-ops.
//!
//! ```text
//!     ┌──────────────┐   tick    ┌─────────┐  SensorUpdate  ┌──────────────┐
//!     │ ViewSettings ├──────────►│  store  ├───────────────►│ broadcast::  │──► ws clients
//!     │ (RwLock)     │           │ (query) │                │ Sender       │
//!     └──────────────┘           └─────────┘                └──────────────┘
//! ```
//!
//! relationships:
//!     - used by: ws.rs (ensure_started, subscribe)
//!     - used by: server.rs (inline tick after delete)
//!
//! ==============================================================================

use crate::clock::{self, Clock};
use crate::domain::{SensorUpdate, ServerEvent, SharedView, ViewSettings};
use crate::store::{ReadingQuery, Store, StoreError};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("stored date `{date}` of reading {id} is malformed: {source}")]
    Date {
        id: i64,
        date: String,
        source: chrono::ParseError,
    },
}

#[derive(Clone, Debug)]
pub struct BroadcastSettings {
    pub interval: Duration,
    pub batch_size: u32,
    pub log_payloads: bool,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            batch_size: 10,
            log_payloads: false,
        }
    }
}

/// Clone-able handle to the push side of the dashboard.
#[derive(Clone)]
pub struct Broadcaster {
    store: Store,
    view: SharedView,
    clock: Clock,
    settings: BroadcastSettings,
    sender: broadcast::Sender<ServerEvent>,
    started: Arc<AtomicBool>,
}

impl Broadcaster {
    pub fn new(
        store: Store,
        view: SharedView,
        clock: Clock,
        settings: BroadcastSettings,
        capacity: usize,
    ) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            store,
            view,
            clock,
            settings,
            sender,
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Spawn the loop unless it already runs. Returns the handle only to the
    /// caller that actually started it.
    pub fn ensure_started(&self) -> Option<JoinHandle<()>> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        tracing::info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            batch_size = self.settings.batch_size,
            "broadcast loop starting"
        );
        let this = self.clone();
        Some(tokio::spawn(async move { this.run().await }))
    }

    async fn run(self) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "broadcast tick failed");
            }
        }
    }

    /// One pass: snapshot under the current settings and publish it.
    /// Returns the number of clients the event reached.
    pub async fn tick(&self) -> Result<usize, TickError> {
        let update = self.snapshot().await?;
        if self.settings.log_payloads {
            if update.is_empty() {
                tracing::info!("updateSensorData: no rows match the current view");
            } else {
                tracing::info!(rows = update.len(), ids = ?update.ids, "updateSensorData");
            }
        }
        // no subscribers is not an error
        Ok(self
            .sender
            .send(ServerEvent::UpdateSensorData(update))
            .unwrap_or(0))
    }

    /// The rows a tick would publish right now.
    pub async fn snapshot(&self) -> Result<SensorUpdate, TickError> {
        let settings = *self.view.read().await;
        let query = self.query_for(&settings);
        let readings = self.store.call(move |store| store.query(&query)).await?;

        let mut update = SensorUpdate::default();
        for reading in readings {
            let iso = clock::display_to_iso(&reading.date).map_err(|source| TickError::Date {
                id: reading.id,
                date: reading.date.clone(),
                source,
            })?;
            update.ids.push(reading.id);
            update.values.push(reading.value);
            update.dates.push(iso);
        }
        Ok(update)
    }

    fn query_for(&self, settings: &ViewSettings) -> ReadingQuery {
        ReadingQuery {
            order: settings.sort,
            since_ms: settings
                .filter
                .start
                .map(|at| self.clock.local_to_epoch_ms(at)),
            until_ms: settings
                .filter
                .end
                .map(|at| self.clock.local_to_epoch_ms(at)),
            limit: self.settings.batch_size,
        }
    }
}
