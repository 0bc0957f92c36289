//! Error types for frame ingestion

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a validation rule. The string form is returned to producers
/// as the rejection reason so they can branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    DeviceIdEmpty,
    TimestampSkew,
    SequenceIdNegative,
    ConfidenceOutOfRange,
    OccupancyOutOfRange,
    NegativeDimension,
    DegenerateOrientation,
    NegativeStatus,
}

impl ValidationRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceIdEmpty => "device_id_empty",
            Self::TimestampSkew => "timestamp_skew",
            Self::SequenceIdNegative => "sequence_id_negative",
            Self::ConfidenceOutOfRange => "confidence_out_of_range",
            Self::OccupancyOutOfRange => "occupancy_out_of_range",
            Self::NegativeDimension => "negative_dimension",
            Self::DegenerateOrientation => "degenerate_orientation",
            Self::NegativeStatus => "negative_status",
        }
    }
}

impl std::fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frame broke a validation rule
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{rule}: {detail}")]
pub struct ValidationError {
    pub rule: ValidationRule,
    pub detail: String,
}

impl ValidationError {
    pub fn new(rule: ValidationRule, detail: impl Into<String>) -> Self {
        Self {
            rule,
            detail: detail.into(),
        }
    }
}

/// A frame was refused by the per-device ordering gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("duplicate sequence id {received}")]
    Duplicate { received: u64 },
    #[error("sequence id {received} is behind last accepted {last}")]
    OutOfOrder { received: u64, last: u64 },
}

impl SequenceError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate { .. } => "duplicate",
            Self::OutOfOrder { .. } => "out_of_order",
        }
    }
}

/// Any routine reason a frame was not applied
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("sequence rejected: {0}")]
    Sequence(#[from] SequenceError),
}

impl IngestError {
    /// Machine-readable reason string
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.rule.as_str(),
            Self::Sequence(e) => e.as_str(),
        }
    }
}
