//! Application state management

use chrono::{DateTime, Utc};
use fusiond_core::{
    Acknowledgement, DeviceStore, FrameValidator, IngestError, Ingestor, SensorFusionFrame,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::Config;

/// Event broadcast to live feed subscribers
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A frame was accepted into the store
    FrameAccepted {
        device_id: String,
        sequence_id: u64,
        timestamp: u64,
    },
    /// Device dropped by the idle sweep
    DeviceEvicted(String),
    /// Device removed by an operator
    DeviceRemoved(String),
}

/// Shared application state
pub struct AppState {
    /// Validation + sequencing + store pipeline
    pub ingestor: Ingestor,
    /// Device state store (shared with the ingestor)
    pub store: Arc<DeviceStore>,
    /// Configuration
    pub config: Config,
    /// Event broadcast for WebSocket clients
    pub events: broadcast::Sender<TelemetryEvent>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config) -> Arc<Self> {
        let store = Arc::new(DeviceStore::new(config.ingest.history_window));
        let validator = FrameValidator::new(config.ingest.validator_config());
        let ingestor = Ingestor::new(validator, store.clone());
        let (events, _) = broadcast::channel(256);

        Arc::new(Self {
            ingestor,
            store,
            config,
            events,
            started_at: Utc::now(),
        })
    }

    /// Run one frame through the pipeline and notify subscribers on success
    pub async fn ingest(
        &self,
        frame: SensorFusionFrame,
    ) -> (Acknowledgement, Option<IngestError>) {
        let timestamp = frame.timestamp;
        let (ack, err) = self.ingestor.acknowledge(frame, Utc::now()).await;
        if ack.is_accepted() {
            let _ = self.events.send(TelemetryEvent::FrameAccepted {
                device_id: ack.device_id.clone(),
                sequence_id: ack.sequence_id.as_unsigned().unwrap_or_default(),
                timestamp,
            });
        }
        (ack, err)
    }

    /// Evict devices idle for longer than the configured TTL
    pub async fn evict_idle(&self, now: DateTime<Utc>) -> Vec<String> {
        let evicted = self
            .store
            .evict_idle(now, self.config.ingest.idle_ttl())
            .await;
        for id in &evicted {
            let _ = self.events.send(TelemetryEvent::DeviceEvicted(id.clone()));
        }
        evicted
    }

    /// Remove a device by id, returns true if it was tracked
    pub async fn remove_device(&self, id: &str) -> bool {
        let removed = self.store.remove(id).await;
        if removed {
            let _ = self.events.send(TelemetryEvent::DeviceRemoved(id.to_string()));
        }
        removed
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.events.subscribe()
    }

    /// Periodic idle eviction, independent of ingestion traffic
    pub async fn run_eviction(self: Arc<Self>) {
        let period = Duration::from_millis(self.config.daemon.eviction_interval_ms);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.config.daemon.eviction_interval_ms,
            ttl_ms = self.config.ingest.idle_ttl_ms,
            "Idle eviction scheduler started"
        );

        loop {
            ticker.tick().await;
            let evicted = self.evict_idle(Utc::now()).await;
            if !evicted.is_empty() {
                debug!(count = evicted.len(), "Evicted idle devices");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusiond_core::{DeviceStatus, Pose};

    fn frame(device: &str, seq: i64) -> SensorFusionFrame {
        SensorFusionFrame {
            device_id: device.to_string(),
            timestamp: Utc::now().timestamp_millis() as u64,
            sequence_id: seq.into(),
            pose: Pose::default(),
            objects: Vec::new(),
            voxels: Vec::new(),
            status: DeviceStatus::default(),
        }
    }

    #[tokio::test]
    async fn test_accepted_frame_is_broadcast() {
        let state = AppState::new(Config::default());
        let mut rx = state.subscribe();

        let (ack, _) = state.ingest(frame("FL-01", 3)).await;
        assert!(ack.is_accepted());

        match rx.recv().await.unwrap() {
            TelemetryEvent::FrameAccepted {
                device_id,
                sequence_id,
                ..
            } => {
                assert_eq!(device_id, "FL-01");
                assert_eq!(sequence_id, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_frame_is_not_broadcast() {
        let state = AppState::new(Config::default());
        let mut rx = state.subscribe();

        state.ingest(frame("FL-01", 3)).await;
        let (ack, err) = state.ingest(frame("FL-01", 3)).await;
        assert!(!ack.is_accepted());
        assert!(err.is_some());

        assert!(rx.recv().await.is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_evict_idle_uses_configured_ttl() {
        let state = AppState::new(Config::default());
        let mut rx = state.subscribe();
        state.ingest(frame("FL-01", 0)).await;
        let _ = rx.recv().await;

        // Within the default 60s TTL nothing goes
        assert!(state.evict_idle(Utc::now()).await.is_empty());

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(state.evict_idle(later).await, vec!["FL-01".to_string()]);
        assert!(matches!(
            rx.recv().await.unwrap(),
            TelemetryEvent::DeviceEvicted(id) if id == "FL-01"
        ));
    }

    #[tokio::test]
    async fn test_remove_device() {
        let state = AppState::new(Config::default());
        state.ingest(frame("FL-01", 0)).await;
        assert!(state.remove_device("FL-01").await);
        assert!(!state.remove_device("FL-01").await);
    }
}
