//! Bounded per-device state store
//!
//! The device table maps each device id to its own slot behind its own mutex.
//! The table lock is only held long enough to look up, insert or detach a
//! slot, never while waiting on a slot, so devices never serialize each other.
//!
//! Lock order is slot then table. Ingestion never holds the table lock while
//! waiting on a slot, which is what lets eviction take the table lock while
//! holding a slot.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::SequenceError;
use crate::frame::SensorFusionFrame;
use crate::sequencer::{SequenceGate, SequenceStats};

/// Default number of frames kept per device
pub const DEFAULT_HISTORY_WINDOW: usize = 64;

/// State held for one device
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub device_id: String,
    /// Highest accepted sequence id
    pub last_sequence_id: u64,
    pub latest_frame: Arc<SensorFusionFrame>,
    /// Last N accepted frames, oldest first
    pub recent_history: VecDeque<Arc<SensorFusionFrame>>,
    pub first_seen_at: DateTime<Utc>,
    /// Server wall clock of the last accepted frame
    pub last_seen_at: DateTime<Utc>,
    pub stats: SequenceStats,
}

impl DeviceRecord {
    /// Frames in acceptance order, oldest first
    pub fn history(&self) -> Vec<Arc<SensorFusionFrame>> {
        self.recent_history.iter().cloned().collect()
    }

    /// Whether the device has sent nothing since `cutoff`
    fn is_idle(&self, cutoff: Option<DateTime<Utc>>) -> bool {
        cutoff.is_some_and(|c| self.last_seen_at < c)
    }
}

/// Outcome of a successful apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedFrame {
    pub device_id: String,
    pub sequence_id: u64,
    pub history_len: usize,
    /// The frame created the device's record
    pub created: bool,
}

#[derive(Debug)]
struct DeviceSlot {
    gate: SequenceGate,
    record: DeviceRecord,
    /// Detached from the table by eviction or removal
    retired: bool,
}

impl DeviceSlot {
    fn first(
        frame: Arc<SensorFusionFrame>,
        sequence_id: u64,
        now: DateTime<Utc>,
        capacity: usize,
    ) -> Self {
        let gate = SequenceGate::starting_at(sequence_id, capacity);

        // Grows up to the window as frames arrive
        let mut recent_history = VecDeque::new();
        recent_history.push_back(frame.clone());

        Self {
            record: DeviceRecord {
                device_id: frame.device_id.clone(),
                last_sequence_id: sequence_id,
                latest_frame: frame,
                recent_history,
                first_seen_at: now,
                last_seen_at: now,
                stats: gate.stats(),
            },
            gate,
            retired: false,
        }
    }

    fn apply(
        &mut self,
        frame: Arc<SensorFusionFrame>,
        sequence_id: u64,
        now: DateTime<Utc>,
        capacity: usize,
    ) -> Result<usize, SequenceError> {
        let admitted = self.gate.admit(sequence_id);
        self.record.stats = self.gate.stats();
        admitted?;

        let record = &mut self.record;
        while record.recent_history.len() >= capacity {
            record.recent_history.pop_front();
        }
        record.recent_history.push_back(frame.clone());
        record.latest_frame = frame;
        record.last_sequence_id = sequence_id;
        record.last_seen_at = now;
        Ok(record.recent_history.len())
    }
}

/// In-memory table of device records
pub struct DeviceStore {
    history_window: usize,
    devices: RwLock<HashMap<String, Arc<Mutex<DeviceSlot>>>>,
}

impl DeviceStore {
    /// Create a store keeping `history_window` frames per device (at least one)
    pub fn new(history_window: usize) -> Self {
        Self {
            history_window: history_window.max(1),
            devices: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, device_id: &str) -> Option<Arc<Mutex<DeviceSlot>>> {
        self.devices.read().await.get(device_id).cloned()
    }

    /// Point-in-time list of slots, taken without holding any slot lock
    async fn snapshot(&self) -> Vec<(String, Arc<Mutex<DeviceSlot>>)> {
        self.devices
            .read()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect()
    }

    /// Run the device's ordering gate on `sequence_id` and, if admitted,
    /// record `frame` as the device's latest.
    ///
    /// Gate and record share one per-device lock, so frames for one device
    /// are admitted and applied in the same order. The frame must already be
    /// validated; its orientation is normalized here.
    pub async fn apply(
        &self,
        mut frame: SensorFusionFrame,
        sequence_id: u64,
        now: DateTime<Utc>,
    ) -> Result<AppliedFrame, SequenceError> {
        if let Some(unit) = frame.pose.orientation.normalized() {
            frame.pose.orientation = unit;
        }
        let device_id = frame.device_id.clone();
        let frame = Arc::new(frame);

        loop {
            if let Some(slot) = self.slot(&device_id).await {
                let mut slot = slot.lock().await;
                if slot.retired {
                    // Evicted between lookup and lock; resolve again
                    continue;
                }
                let history_len = slot.apply(frame, sequence_id, now, self.history_window)?;
                return Ok(AppliedFrame {
                    device_id,
                    sequence_id,
                    history_len,
                    created: false,
                });
            }

            let mut devices = self.devices.write().await;
            if devices.contains_key(&device_id) {
                // Another producer registered the device first
                continue;
            }
            let slot = DeviceSlot::first(frame, sequence_id, now, self.history_window);
            devices.insert(device_id.clone(), Arc::new(Mutex::new(slot)));
            info!(device = %device_id, sequence_id, "Registered new device");
            return Ok(AppliedFrame {
                device_id,
                sequence_id,
                history_len: 1,
                created: true,
            });
        }
    }

    /// Consistent copy of a device's record
    pub async fn get(&self, device_id: &str) -> Option<DeviceRecord> {
        let slot = self.slot(device_id).await?;
        let slot = slot.lock().await;
        Some(slot.record.clone())
    }

    /// Recent frames for a device, oldest first
    pub async fn history(&self, device_id: &str) -> Option<Vec<Arc<SensorFusionFrame>>> {
        let slot = self.slot(device_id).await?;
        let slot = slot.lock().await;
        Some(slot.record.history())
    }

    /// Ids of every tracked device, sorted
    pub async fn list_devices(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of devices with an accepted frame within `ttl` of `now`, sorted
    pub async fn list_active(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<String> {
        let cutoff = cutoff(now, ttl);
        let mut active = Vec::new();
        for (id, slot) in self.snapshot().await {
            let slot = slot.lock().await;
            if !slot.retired && !slot.record.is_idle(cutoff) {
                active.push(id);
            }
        }
        active.sort();
        active
    }

    /// Remove every device whose last accepted frame is older than `now - ttl`.
    ///
    /// Staleness is re-checked under each device's lock, so a device that
    /// receives a frame while the sweep is running is kept. Returns the
    /// evicted ids.
    pub async fn evict_idle(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<String> {
        let cutoff = cutoff(now, ttl);
        let mut evicted = Vec::new();

        for (id, slot) in self.snapshot().await {
            let mut guard = slot.lock().await;
            if guard.retired || !guard.record.is_idle(cutoff) {
                continue;
            }
            if self.detach(&id, &slot).await {
                guard.retired = true;
                info!(
                    device = %id,
                    last_seen = %guard.record.last_seen_at,
                    "Evicted idle device"
                );
                evicted.push(id);
            }
        }

        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Idle eviction sweep complete");
        }
        evicted
    }

    /// Explicitly delete a device's record. Returns false if unknown.
    pub async fn remove(&self, device_id: &str) -> bool {
        let Some(slot) = self.slot(device_id).await else {
            return false;
        };
        let mut guard = slot.lock().await;
        if guard.retired || !self.detach(device_id, &slot).await {
            return false;
        }
        guard.retired = true;
        info!(device = %device_id, "Device removed from store");
        true
    }

    /// Remove `slot` from the table if it is still the one registered for `id`.
    /// Caller holds the slot lock.
    async fn detach(&self, id: &str, slot: &Arc<Mutex<DeviceSlot>>) -> bool {
        let mut devices = self.devices.write().await;
        match devices.get(id) {
            Some(current) if Arc::ptr_eq(current, slot) => {
                devices.remove(id);
                true
            }
            _ => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    #[cfg(test)]
    async fn hold_device(
        &self,
        device_id: &str,
    ) -> Option<tokio::sync::OwnedMutexGuard<DeviceSlot>> {
        let slot = self.slot(device_id).await?;
        Some(slot.lock_owned().await)
    }
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

/// Oldest `last_seen_at` still considered active. `None` when `ttl` reaches
/// past the start of representable time, in which case nothing is idle.
fn cutoff(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl).ok()?;
    now.checked_sub_signed(ttl)
}
