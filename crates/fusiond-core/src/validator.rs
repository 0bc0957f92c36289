//! Structural and semantic checks on incoming frames
//!
//! Rules run in a fixed order and stop at the first failure, so a producer
//! always gets the same rule id for the same bad frame.

use crate::error::{ValidationError, ValidationRule};
use crate::frame::SensorFusionFrame;

/// Default allowed distance between producer and server clocks
pub const DEFAULT_SKEW_TOLERANCE_MS: u64 = 30_000;

/// Allowed deviation from unit norm after normalization
pub const ORIENTATION_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Maximum |server now - frame timestamp| in milliseconds
    pub skew_tolerance_ms: u64,
    pub orientation_epsilon: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            skew_tolerance_ms: DEFAULT_SKEW_TOLERANCE_MS,
            orientation_epsilon: ORIENTATION_EPSILON,
        }
    }
}

/// Pure frame validator
#[derive(Debug, Clone, Default)]
pub struct FrameValidator {
    config: ValidatorConfig,
}

impl FrameValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Check `frame` against the server clock `now_ms`.
    ///
    /// On success returns the frame's sequence id as an unsigned value.
    pub fn validate(
        &self,
        frame: &SensorFusionFrame,
        now_ms: u64,
    ) -> Result<u64, ValidationError> {
        if frame.device_id.trim().is_empty() {
            return Err(ValidationError::new(
                ValidationRule::DeviceIdEmpty,
                "deviceId is empty",
            ));
        }

        let skew = now_ms.abs_diff(frame.timestamp);
        if skew > self.config.skew_tolerance_ms {
            let direction = if frame.timestamp > now_ms {
                "ahead of"
            } else {
                "behind"
            };
            return Err(ValidationError::new(
                ValidationRule::TimestampSkew,
                format!(
                    "timestamp is {}ms {} server clock (tolerance {}ms)",
                    skew, direction, self.config.skew_tolerance_ms
                ),
            ));
        }

        let sequence_id = frame.sequence_id.as_unsigned().ok_or_else(|| {
            ValidationError::new(
                ValidationRule::SequenceIdNegative,
                format!("sequenceId {} is negative", frame.sequence_id),
            )
        })?;

        if let Some(obj) = frame
            .objects
            .iter()
            .find(|o| !is_probability(o.confidence))
        {
            return Err(ValidationError::new(
                ValidationRule::ConfidenceOutOfRange,
                format!("object '{}' confidence {} not in [0,1]", obj.id, obj.confidence),
            ));
        }

        if let Some(voxel) = frame
            .voxels
            .iter()
            .find(|v| !is_probability(v.occupancy_probability))
        {
            return Err(ValidationError::new(
                ValidationRule::OccupancyOutOfRange,
                format!(
                    "voxel '{}' occupancyProbability {} not in [0,1]",
                    voxel.id, voxel.occupancy_probability
                ),
            ));
        }

        if let Some(obj) = frame
            .objects
            .iter()
            .find(|o| !o.bounding_box.dimensions.is_non_negative())
        {
            return Err(ValidationError::new(
                ValidationRule::NegativeDimension,
                format!("object '{}' has a negative bounding box dimension", obj.id),
            ));
        }

        if let Some(voxel) = frame
            .voxels
            .iter()
            .find(|v| v.size.is_some_and(|s| !s.is_finite() || s < 0.0))
        {
            return Err(ValidationError::new(
                ValidationRule::NegativeDimension,
                format!("voxel '{}' has a negative size", voxel.id),
            ));
        }

        let orientation = frame.pose.orientation;
        match orientation.normalized() {
            Some(unit) if (unit.norm() - 1.0).abs() <= self.config.orientation_epsilon => {}
            _ => {
                return Err(ValidationError::new(
                    ValidationRule::DegenerateOrientation,
                    format!("orientation norm {} cannot be normalized", orientation.norm()),
                ));
            }
        }

        if let Some(field) = frame.status.first_invalid_field() {
            return Err(ValidationError::new(
                ValidationRule::NegativeStatus,
                format!("status.{} must be a non-negative number", field),
            ));
        }

        Ok(sequence_id)
    }
}

fn is_probability(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::frame::{
        BoundingBox, DetectedObject, DeviceStatus, Dimensions, OccupancyVoxel, Pose, Quaternion,
        SequenceId, Vector3,
    };

    pub(crate) const NOW: u64 = 1_760_000_000_000;

    /// A frame that passes every rule at `NOW`
    pub(crate) fn sample_frame(device_id: &str, sequence_id: i64) -> SensorFusionFrame {
        SensorFusionFrame {
            device_id: device_id.to_string(),
            timestamp: NOW,
            sequence_id: sequence_id.into(),
            pose: Pose {
                position: Vector3::new(1.0, 0.0, 2.0),
                orientation: Quaternion::IDENTITY,
                ..Default::default()
            },
            objects: vec![DetectedObject {
                id: "pallet-01".to_string(),
                class_id: "pallet".to_string(),
                confidence: 0.92,
                bounding_box: BoundingBox {
                    center: Vector3::new(3.0, 0.0, 2.0),
                    dimensions: Dimensions::new(1.2, 0.8, 0.15),
                },
                velocity: None,
            }],
            voxels: vec![OccupancyVoxel {
                id: "v-0".to_string(),
                center: Vector3::new(3.0, 0.2, 2.0),
                occupancy_probability: 0.9,
                size: Some(0.2),
            }],
            status: DeviceStatus {
                cpu_load: 0.3,
                memory_usage: 0.5,
                gpu_load: 0.6,
                fusion_latency_ms: 48.0,
            },
        }
    }

    fn rule_of(frame: &SensorFusionFrame) -> Option<ValidationRule> {
        FrameValidator::default()
            .validate(frame, NOW)
            .err()
            .map(|e| e.rule)
    }

    #[test]
    fn test_valid_frame_passes() {
        let frame = sample_frame("FL-01", 42);
        assert_eq!(FrameValidator::default().validate(&frame, NOW), Ok(42));
    }

    #[test]
    fn test_empty_device_id() {
        let frame = sample_frame("  ", 0);
        assert_eq!(rule_of(&frame), Some(ValidationRule::DeviceIdEmpty));
    }

    #[test]
    fn test_timestamp_skew_both_directions() {
        let mut frame = sample_frame("FL-01", 0);
        frame.timestamp = NOW + DEFAULT_SKEW_TOLERANCE_MS + 1;
        assert_eq!(rule_of(&frame), Some(ValidationRule::TimestampSkew));

        frame.timestamp = NOW - DEFAULT_SKEW_TOLERANCE_MS - 1;
        assert_eq!(rule_of(&frame), Some(ValidationRule::TimestampSkew));

        frame.timestamp = NOW - DEFAULT_SKEW_TOLERANCE_MS;
        assert_eq!(rule_of(&frame), None);
    }

    #[test]
    fn test_negative_sequence_id() {
        let frame = sample_frame("FL-01", -1);
        assert_eq!(rule_of(&frame), Some(ValidationRule::SequenceIdNegative));
    }

    #[test]
    fn test_confidence_out_of_range() {
        for bad in [-0.01, 1.01, f64::NAN] {
            let mut frame = sample_frame("FL-01", 0);
            frame.objects[0].confidence = bad;
            assert_eq!(rule_of(&frame), Some(ValidationRule::ConfidenceOutOfRange));
        }
    }

    #[test]
    fn test_occupancy_out_of_range() {
        for bad in [-0.5, 1.5, f64::INFINITY] {
            let mut frame = sample_frame("FL-01", 0);
            frame.voxels[0].occupancy_probability = bad;
            assert_eq!(rule_of(&frame), Some(ValidationRule::OccupancyOutOfRange));
        }
    }

    #[test]
    fn test_boundary_probabilities_accepted() {
        let mut frame = sample_frame("FL-01", 0);
        frame.objects[0].confidence = 1.0;
        frame.voxels[0].occupancy_probability = 0.0;
        assert_eq!(rule_of(&frame), None);
    }

    #[test]
    fn test_negative_dimensions() {
        let mut frame = sample_frame("FL-01", 0);
        frame.objects[0].bounding_box.dimensions.height = -0.1;
        assert_eq!(rule_of(&frame), Some(ValidationRule::NegativeDimension));

        let mut frame = sample_frame("FL-01", 0);
        frame.voxels[0].size = Some(-0.2);
        assert_eq!(rule_of(&frame), Some(ValidationRule::NegativeDimension));
    }

    #[test]
    fn test_zero_norm_orientation_rejected() {
        let mut frame = sample_frame("FL-01", 0);
        frame.pose.orientation = Quaternion {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 0.0,
        };
        assert_eq!(rule_of(&frame), Some(ValidationRule::DegenerateOrientation));
    }

    #[test]
    fn test_unnormalized_orientation_accepted() {
        let mut frame = sample_frame("FL-01", 0);
        frame.pose.orientation = Quaternion {
            x: 0.0,
            y: 0.0,
            z: 3.0,
            w: 4.0,
        };
        assert_eq!(rule_of(&frame), None);
    }

    #[test]
    fn test_sequence_id_above_i64_range() {
        let mut frame = sample_frame("FL-01", 0);
        frame.sequence_id = SequenceId::Unsigned(u64::MAX);
        assert_eq!(FrameValidator::default().validate(&frame, NOW), Ok(u64::MAX));
    }

    #[test]
    fn test_huge_orientation_components_accepted() {
        let mut frame = sample_frame("FL-01", 0);
        frame.pose.orientation = Quaternion {
            x: 1e200,
            y: 0.0,
            z: 0.0,
            w: 1e200,
        };
        assert_eq!(rule_of(&frame), None);
    }

    #[test]
    fn test_loose_epsilon_still_rejects_nan_orientation() {
        let mut frame = sample_frame("FL-01", 0);
        frame.pose.orientation = Quaternion {
            x: f64::NAN,
            ..Quaternion::IDENTITY
        };
        let loose = FrameValidator::new(ValidatorConfig {
            orientation_epsilon: 0.5,
            ..ValidatorConfig::default()
        });
        assert!(loose.validate(&frame, NOW).is_err());
        assert!(loose.validate(&sample_frame("FL-01", 0), NOW).is_ok());
    }

    #[test]
    fn test_negative_status() {
        let mut frame = sample_frame("FL-01", 0);
        frame.status.fusion_latency_ms = -3.0;
        assert_eq!(rule_of(&frame), Some(ValidationRule::NegativeStatus));
    }

    #[test]
    fn test_first_failure_wins() {
        let mut frame = sample_frame("", -5);
        frame.objects[0].confidence = 2.0;
        assert_eq!(rule_of(&frame), Some(ValidationRule::DeviceIdEmpty));

        let mut frame = sample_frame("FL-01", 0);
        frame.objects[0].confidence = 2.0;
        frame.voxels[0].occupancy_probability = 2.0;
        assert_eq!(rule_of(&frame), Some(ValidationRule::ConfidenceOutOfRange));
    }
}
