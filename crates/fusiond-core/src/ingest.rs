//! Ingestion pipeline: validate, sequence, store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::IngestError;
use crate::frame::{SensorFusionFrame, SequenceId};
use crate::store::{AppliedFrame, DeviceStore};
use crate::validator::FrameValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Accepted,
    Rejected,
}

/// Reply sent to the producer for every parseable frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub status: AckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub device_id: String,
    /// Echoed exactly as received
    pub sequence_id: SequenceId,
}

impl Acknowledgement {
    pub fn accepted(device_id: impl Into<String>, sequence_id: impl Into<SequenceId>) -> Self {
        Self {
            status: AckStatus::Accepted,
            reason: None,
            device_id: device_id.into(),
            sequence_id: sequence_id.into(),
        }
    }

    pub fn rejected(
        device_id: impl Into<String>,
        sequence_id: impl Into<SequenceId>,
        error: &IngestError,
    ) -> Self {
        Self {
            status: AckStatus::Rejected,
            reason: Some(error.reason().to_string()),
            device_id: device_id.into(),
            sequence_id: sequence_id.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == AckStatus::Accepted
    }
}

/// Runs the validator, then the per-device sequencer and store
#[derive(Clone)]
pub struct Ingestor {
    validator: FrameValidator,
    store: Arc<DeviceStore>,
}

impl Ingestor {
    pub fn new(validator: FrameValidator, store: Arc<DeviceStore>) -> Self {
        Self { validator, store }
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.store
    }

    /// Process one frame received at `now`
    pub async fn ingest(
        &self,
        frame: SensorFusionFrame,
        now: DateTime<Utc>,
    ) -> Result<AppliedFrame, IngestError> {
        let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let sequence_id = self.validator.validate(&frame, now_ms)?;
        let applied = self.store.apply(frame, sequence_id, now).await?;
        debug!(
            device = %applied.device_id,
            sequence_id,
            history = applied.history_len,
            "Frame accepted"
        );
        Ok(applied)
    }

    /// Process one frame and build the producer's acknowledgement
    pub async fn acknowledge(
        &self,
        frame: SensorFusionFrame,
        now: DateTime<Utc>,
    ) -> (Acknowledgement, Option<IngestError>) {
        let device_id = frame.device_id.clone();
        let sequence_id = frame.sequence_id;
        match self.ingest(frame, now).await {
            Ok(_) => (Acknowledgement::accepted(device_id, sequence_id), None),
            Err(e) => {
                debug!(device = %device_id, %sequence_id, reason = e.reason(), "Frame rejected");
                (Acknowledgement::rejected(device_id, sequence_id, &e), Some(e))
            }
        }
    }
}
