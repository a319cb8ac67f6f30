//! Wires the store, the stream connector and the REST fallback together.

use std::sync::Arc;
use tokio::sync::watch;

use crate::config::Config;
use crate::error::FetchError;
use crate::fallback::PollingFallback;
use crate::rest::RestClient;
use crate::store::SnapshotStore;
use crate::stream::StreamConnector;

/// The ingestion engine: two background loops feeding one store.
pub struct Engine {
    store: Arc<SnapshotStore>,
    connector: StreamConnector,
    fallback: PollingFallback<RestClient>,
}

impl Engine {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let store = Arc::new(SnapshotStore::new());

        let connector = StreamConnector::new(config.stream_settings(), store.clone());

        let rest = RestClient::new(
            &config.rest_base_url,
            &config.station_id,
            &config.token,
            config.request_timeout(),
        )?;
        let fallback = PollingFallback::new(
            rest,
            store.clone(),
            config.fallback_threshold(),
            config.poll_interval(),
        );

        Ok(Self {
            store,
            connector,
            fallback,
        })
    }

    /// Shared handle for readers.
    pub fn store(&self) -> Arc<SnapshotStore> {
        self.store.clone()
    }

    /// Run both loops until shutdown is signalled and both have returned.
    pub async fn run(self, shutdown: watch::Receiver<()>) {
        let stream_task = tokio::spawn(self.connector.run(shutdown.clone()));
        let fallback_task = tokio::spawn(self.fallback.run(shutdown));

        let (stream_result, fallback_result) = tokio::join!(stream_task, fallback_task);
        if let Err(e) = stream_result {
            log::error!("WebSocket task failed: {}", e);
        }
        if let Err(e) = fallback_result {
            log::error!("REST fallback task failed: {}", e);
        }
    }
}
