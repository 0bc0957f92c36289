//! Fusiond Core - Telemetry frame model, validation, sequencing and state
//!
//! This crate provides the ingestion core for streamed sensor fusion frames:
//! - Frame types (pose, detected objects, occupancy voxels, device status)
//! - Frame validator with stable rule identifiers
//! - Per-device sequence gate (dedup, strict ordering, gap tracking)
//! - Bounded per-device history store with idle eviction

pub mod error;
pub mod frame;
pub mod ingest;
pub mod sequencer;
pub mod store;
pub mod validator;

pub use error::{IngestError, SequenceError, ValidationError, ValidationRule};
pub use frame::{
    BoundingBox, DetectedObject, DeviceStatus, Dimensions, OccupancyVoxel, Pose, Quaternion,
    SensorFusionFrame, SequenceId, Vector3, Velocity,
};
pub use ingest::{AckStatus, Acknowledgement, Ingestor};
pub use sequencer::{SequenceGate, SequenceStats};
pub use store::{AppliedFrame, DeviceRecord, DeviceStore, DEFAULT_HISTORY_WINDOW};
pub use validator::{
    FrameValidator, ValidatorConfig, DEFAULT_SKEW_TOLERANCE_MS, ORIENTATION_EPSILON,
};
