//! Per-sensor scheduling, on-demand runs and the consumer-facing API.

mod pipeline;
mod probes;
mod scheduler;

pub use probes::Probes;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::try_join_all;
use tokio::sync::{OwnedMutexGuard, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::aggregate::{Measurement, RouteHistory};
use crate::config::MonitorConfig;
use crate::error::Error;
use crate::sensor::{SensorReading, SensorType, UnknownSensorType};
use crate::store::ReadingStore;

/// Where a sensor type is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Disabled,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running => write!(f, "running"),
            RunState::Disabled => write!(f, "disabled"),
        }
    }
}

/// Which sensor types an on-demand run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    One(SensorType),
    All,
}

impl From<SensorType> for Trigger {
    fn from(sensor: SensorType) -> Self {
        Trigger::One(sensor)
    }
}

impl FromStr for Trigger {
    type Err = UnknownSensorType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(Trigger::All)
        } else {
            s.parse().map(Trigger::One)
        }
    }
}

/// State shared by the handle, the sensor loops and on-demand runs
pub(crate) struct Shared {
    config: watch::Sender<Arc<MonitorConfig>>,
    probes: Probes,
    store: ReadingStore,
    history: RouteHistory,

    /// Held for the duration of a run; at most one run per sensor type
    gates: [Arc<tokio::sync::Mutex<()>>; SensorType::ALL.len()],
    cancel: CancellationToken,
}

impl Shared {
    fn current(&self) -> Arc<MonitorConfig> {
        Arc::clone(&self.config.borrow())
    }

    /// Run the pipeline once and publish the result
    ///
    /// Returns `None` when the sensor was disabled while the run was in
    /// flight; such a result is discarded.
    async fn execute(&self, sensor: SensorType, config: &MonitorConfig) -> Option<SensorReading> {
        let started = Instant::now();
        let measurement = pipeline::run(sensor, config, &self.probes, &self.history).await;

        let Some(reading) = self.store.settle_if(sensor, measurement, || self.current().is_enabled(sensor)) else {
            debug!(sensor = %sensor, "Sensor disabled during run, discarding result");
            return None;
        };
        info!(
            sensor = %sensor,
            state = %reading.state,
            status = %reading.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Run complete"
        );
        Some(reading)
    }

    fn settle_panic(&self, sensor: SensorType) -> SensorReading {
        self.store.settle(sensor, Measurement::failed("internal", "probe pipeline panicked"))
    }
}

/// Handle to the running monitor
///
/// Dropping the handle cancels every loop and in-flight run; call
/// [`Coordinator::shutdown`] to also wait for them to finish.
pub struct Coordinator {
    shared: Arc<Shared>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    /// Validate `config` and spawn one loop per sensor type
    ///
    /// Must be called from within a Tokio runtime. Nothing is spawned when
    /// validation fails.
    pub fn start(config: MonitorConfig, probes: Probes) -> Result<Self, Error> {
        config.validate()?;

        let enabled: Vec<&str> = config.enabled_sensors().iter().map(|sensor| sensor.as_str()).collect();
        info!(sensors = ?enabled, max_concurrency = config.max_concurrency, "Starting coordinator");

        let (config_tx, _config_rx) = watch::channel(Arc::new(config));
        let shared = Arc::new(Shared {
            config: config_tx,
            probes,
            store: ReadingStore::new(),
            history: RouteHistory::new(),
            gates: std::array::from_fn(|_| Arc::new(tokio::sync::Mutex::new(()))),
            cancel: CancellationToken::new(),
        });

        let loops = SensorType::ALL
            .iter()
            .map(|sensor| tokio::spawn(scheduler::sensor_loop(*sensor, Arc::clone(&shared))))
            .collect();

        Ok(Self { shared, loops: Mutex::new(loops) })
    }

    /// Replace the configuration wholesale
    ///
    /// Loops pick up enablement at their next tick and re-arm when their
    /// interval changed. Readings of sensor types that are now disabled are
    /// dropped.
    pub fn apply_config(&self, config: MonitorConfig) -> Result<(), Error> {
        if self.shared.cancel.is_cancelled() {
            return Err(Error::ShutDown);
        }
        config.validate()?;

        // Publish before dropping readings so a run settling in between sees the sensor disabled
        let config = Arc::new(config);
        self.shared.config.send_replace(Arc::clone(&config));
        info!("Configuration replaced");

        for sensor in SensorType::ALL {
            if !config.is_enabled(sensor) && self.shared.store.remove(sensor).is_some() {
                debug!(sensor = %sensor, "Dropped reading of disabled sensor");
            }
        }
        self.shared.history.retain_targets(&config.sensors.route_stability.targets);
        Ok(())
    }

    pub fn config(&self) -> Arc<MonitorConfig> {
        self.shared.current()
    }

    /// Latest reading, or `None` before the first run completes
    pub fn get_latest(&self, sensor: SensorType) -> Option<SensorReading> {
        self.shared.store.get(sensor)
    }

    /// Latest reading of every enabled sensor type that has produced one
    pub fn get_report(&self) -> BTreeMap<SensorType, SensorReading> {
        let config = self.shared.current();
        let mut report = self.shared.store.snapshot();
        report.retain(|sensor, _| config.is_enabled(*sensor));
        report
    }

    pub fn run_state(&self, sensor: SensorType) -> RunState {
        if !self.shared.current().is_enabled(sensor) {
            return RunState::Disabled;
        }
        match self.shared.gates[sensor.index()].try_lock() {
            Ok(_) => RunState::Idle,
            Err(_) => RunState::Running,
        }
    }

    /// Receive every reading as it is published
    pub fn subscribe(&self) -> broadcast::Receiver<SensorReading> {
        self.shared.store.subscribe()
    }

    /// Run now, outside the schedule, and return the resulting readings
    ///
    /// Waits for an active scheduled run of the same type to finish first.
    /// The regular timers are not touched.
    pub async fn trigger_now(&self, trigger: impl Into<Trigger>) -> Result<Vec<SensorReading>, Error> {
        if self.shared.cancel.is_cancelled() {
            return Err(Error::ShutDown);
        }

        let config = self.shared.current();
        let sensors = match trigger.into() {
            Trigger::One(sensor) if !config.is_enabled(sensor) => return Err(Error::SensorDisabled(sensor)),
            Trigger::One(sensor) => vec![sensor],
            Trigger::All => config.enabled_sensors(),
        };

        try_join_all(sensors.into_iter().map(|sensor| self.trigger_one(sensor))).await
    }

    async fn trigger_one(&self, sensor: SensorType) -> Result<SensorReading, Error> {
        let cancel = &self.shared.cancel;
        let gate = Arc::clone(&self.shared.gates[sensor.index()]);

        let permit: OwnedMutexGuard<()> = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::ShutDown),
            permit = gate.lock_owned() => permit,
        };

        // Config may have changed while waiting for the gate
        let config = self.shared.current();
        if !config.is_enabled(sensor) {
            return Err(Error::SensorDisabled(sensor));
        }

        let shared = Arc::clone(&self.shared);
        let mut task = tokio::spawn(async move {
            let _permit = permit;
            shared.execute(sensor, &config).await
        });

        tokio::select! {
            _ = cancel.cancelled() => {
                task.abort();
                Err(Error::ShutDown)
            }
            joined = &mut task => match joined {
                Ok(Some(reading)) => Ok(reading),
                Ok(None) => Err(Error::SensorDisabled(sensor)),
                Err(err) if err.is_panic() => {
                    error!(sensor = %sensor, "Probe pipeline panicked");
                    Ok(self.shared.settle_panic(sensor))
                }
                Err(_) => Err(Error::ShutDown),
            }
        }
    }

    /// Cancel every timer and in-flight run, then wait for the loops to exit
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        let loops = std::mem::take(&mut *self.loops.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in loops {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    error!("Sensor loop panicked during shutdown");
                }
            }
        }
        info!("Coordinator stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}
