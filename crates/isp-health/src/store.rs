//! Latest reading per sensor type, plus a push channel for new readings.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::debug;

use crate::aggregate::Measurement;
use crate::sensor::{SensorReading, SensorType};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct ReadingStore {
    readings: RwLock<HashMap<SensorType, SensorReading>>,
    updates: broadcast::Sender<SensorReading>,
}

impl Default for ReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingStore {
    pub fn new() -> Self {
        let (updates, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { readings: RwLock::new(HashMap::new()), updates }
    }

    pub fn get(&self, sensor: SensorType) -> Option<SensorReading> {
        self.readings.read().unwrap_or_else(PoisonError::into_inner).get(&sensor).cloned()
    }

    /// Replace the reading for `sensor` with `measurement` and notify subscribers
    ///
    /// The previous reading is consulted under the same lock so a carried
    /// forward failure always merges the value it replaces.
    pub fn settle(&self, sensor: SensorType, measurement: Measurement) -> SensorReading {
        let reading = {
            let mut readings = self.readings.write().unwrap_or_else(PoisonError::into_inner);
            let reading = measurement.into_reading(sensor, readings.get(&sensor));
            readings.insert(sensor, reading.clone());
            reading
        };
        self.publish(reading)
    }

    /// Like [`ReadingStore::settle`], but only when `keep` still holds once
    /// the lock is taken
    ///
    /// A concurrent [`ReadingStore::remove`] either runs after the insert or
    /// is observed by `keep`, never neither.
    pub fn settle_if(
        &self,
        sensor: SensorType,
        measurement: Measurement,
        keep: impl FnOnce() -> bool,
    ) -> Option<SensorReading> {
        let reading = {
            let mut readings = self.readings.write().unwrap_or_else(PoisonError::into_inner);
            if !keep() {
                return None;
            }
            let reading = measurement.into_reading(sensor, readings.get(&sensor));
            readings.insert(sensor, reading.clone());
            reading
        };
        Some(self.publish(reading))
    }

    fn publish(&self, reading: SensorReading) -> SensorReading {
        debug!(sensor = %reading.sensor_type, state = %reading.state, status = %reading.status, "Reading published");
        // No receivers is fine
        let _ = self.updates.send(reading.clone());
        reading
    }

    pub fn remove(&self, sensor: SensorType) -> Option<SensorReading> {
        self.readings.write().unwrap_or_else(PoisonError::into_inner).remove(&sensor)
    }

    /// Point-in-time copy of every stored reading
    pub fn snapshot(&self) -> BTreeMap<SensorType, SensorReading> {
        self.readings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(sensor, reading)| (*sensor, reading.clone()))
            .collect()
    }

    /// Receive every reading published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SensorReading> {
        self.updates.subscribe()
    }
}
