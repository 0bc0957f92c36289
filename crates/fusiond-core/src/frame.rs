//! Sensor fusion frame types as they arrive from producers

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point or vector in the device's world frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Orientation quaternion (x, y, z, w)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    fn components(&self) -> [f64; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// Euclidean norm of the four components, scaled so large finite
    /// components do not overflow
    pub fn norm(&self) -> f64 {
        let c = self.components();
        if !c.iter().all(|v| v.is_finite()) {
            // NaN or infinity
            return c.iter().map(|v| v.abs()).sum();
        }
        let scale = c.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if scale == 0.0 {
            return 0.0;
        }
        scale * c.iter().map(|v| (v / scale) * (v / scale)).sum::<f64>().sqrt()
    }

    /// Unit quaternion pointing the same way, or `None` when the norm is zero
    /// or not finite
    pub fn normalized(&self) -> Option<Quaternion> {
        let n = self.norm();
        if !n.is_finite() || n <= f64::EPSILON {
            return None;
        }
        Some(Quaternion {
            x: self.x / n,
            y: self.y / n,
            z: self.z / n,
            w: self.w / n,
        })
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Scalar linear and angular speed
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    #[serde(default)]
    pub linear: f64,
    #[serde(default)]
    pub angular: f64,
}

/// 6-DoF pose with velocity
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vector3,
    pub orientation: Quaternion,
    #[serde(default)]
    pub velocity: Velocity,
}

/// Box extents. Older producers send these as x/y/z.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    #[serde(alias = "l", alias = "x")]
    pub length: f64,
    #[serde(alias = "w", alias = "y")]
    pub width: f64,
    #[serde(alias = "h", alias = "z")]
    pub height: f64,
}

impl Dimensions {
    pub fn new(length: f64, width: f64, height: f64) -> Self {
        Self {
            length,
            width,
            height,
        }
    }

    fn components(&self) -> [f64; 3] {
        [self.length, self.width, self.height]
    }

    /// True when every extent is finite and >= 0
    pub fn is_non_negative(&self) -> bool {
        self.components().iter().all(|v| v.is_finite() && *v >= 0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub center: Vector3,
    pub dimensions: Dimensions,
}

/// One object reported by the perception head
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    /// Unique within a frame
    pub id: String,
    /// Class label (e.g. "pallet", "human")
    pub class_id: String,
    /// Detection confidence in [0, 1]
    pub confidence: f64,
    pub bounding_box: BoundingBox,
    /// Estimated object velocity, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Vector3>,
}

/// One cell of the occupancy grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyVoxel {
    pub id: String,
    pub center: Vector3,
    /// Probability the cell is occupied, in [0, 1]
    pub occupancy_probability: f64,
    /// Cube edge length in metres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
}

/// Device health snapshot carried in every frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    #[serde(default)]
    pub cpu_load: f64,
    #[serde(default)]
    pub memory_usage: f64,
    #[serde(default)]
    pub gpu_load: f64,
    #[serde(default)]
    pub fusion_latency_ms: f64,
}

impl DeviceStatus {
    fn fields(&self) -> [(&'static str, f64); 4] {
        [
            ("cpuLoad", self.cpu_load),
            ("memoryUsage", self.memory_usage),
            ("gpuLoad", self.gpu_load),
            ("fusionLatencyMs", self.fusion_latency_ms),
        ]
    }

    /// Name of the first field that is negative or not finite
    pub fn first_invalid_field(&self) -> Option<&'static str> {
        self.fields()
            .into_iter()
            .find(|(_, v)| !v.is_finite() || *v < 0.0)
            .map(|(name, _)| name)
    }
}

/// Producer-assigned sequence number as sent on the wire.
///
/// Covers the full unsigned range plus negative values, so a negative id is
/// still a parseable frame that validation can reject and acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SequenceId {
    Unsigned(u64),
    Negative(i64),
}

impl SequenceId {
    /// The id as an unsigned value, `None` when negative
    pub fn as_unsigned(&self) -> Option<u64> {
        match *self {
            SequenceId::Unsigned(v) => Some(v),
            SequenceId::Negative(v) => u64::try_from(v).ok(),
        }
    }
}

impl From<u64> for SequenceId {
    fn from(v: u64) -> Self {
        SequenceId::Unsigned(v)
    }
}

impl From<i64> for SequenceId {
    fn from(v: i64) -> Self {
        match u64::try_from(v) {
            Ok(v) => SequenceId::Unsigned(v),
            Err(_) => SequenceId::Negative(v),
        }
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceId::Unsigned(v) => write!(f, "{}", v),
            SequenceId::Negative(v) => write!(f, "{}", v),
        }
    }
}

/// One timestamped fused-sensor snapshot from a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorFusionFrame {
    pub device_id: String,
    /// Producer clock, epoch milliseconds
    pub timestamp: u64,
    /// Producer-assigned, monotonically increasing per device
    pub sequence_id: SequenceId,
    pub pose: Pose,
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    #[serde(default)]
    pub voxels: Vec<OccupancyVoxel>,
    #[serde(default)]
    pub status: DeviceStatus,
}
