//! Timer loop for one sensor type.
//!
//! A tick starts a run only when the sensor is enabled and its gate is free;
//! otherwise the tick is dropped rather than queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, interval_at};
use tracing::{debug, error, info};

use super::Shared;
use crate::sensor::SensorType;

fn arm(period: Duration, immediately: bool) -> Interval {
    let mut timer = if immediately { interval(period) } else { interval_at(Instant::now() + period, period) };
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

pub(super) async fn sensor_loop(sensor: SensorType, shared: Arc<Shared>) {
    let mut config_rx = shared.config.subscribe();
    let mut period = config_rx.borrow_and_update().interval(sensor);
    let mut timer = arm(period, true);
    let mut runs = JoinSet::new();

    debug!(sensor = %sensor, interval_secs = period.as_secs(), "Sensor loop started");

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,

            changed = config_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = config_rx.borrow_and_update().interval(sensor);
                if next != period {
                    info!(sensor = %sensor, interval_secs = next.as_secs(), "Interval changed, re-arming timer");
                    period = next;
                    timer = arm(period, false);
                }
            }

            _ = timer.tick() => {
                let config = Arc::clone(&config_rx.borrow());
                if !config.is_enabled(sensor) {
                    continue;
                }

                let Ok(permit) = Arc::clone(&shared.gates[sensor.index()]).try_lock_owned() else {
                    debug!(sensor = %sensor, "Previous run still active, skipping tick");
                    continue;
                };

                let shared = Arc::clone(&shared);
                runs.spawn(async move {
                    let _permit = permit;
                    shared.execute(sensor, &config).await;
                });
            }

            Some(joined) = runs.join_next(), if !runs.is_empty() => {
                if let Err(err) = joined {
                    if err.is_panic() {
                        error!(sensor = %sensor, "Probe pipeline panicked");
                        shared.settle_panic(sensor);
                    }
                }
            }
        }
    }

    // Aborts in-flight runs; dropped futures release sockets and kill children
    runs.shutdown().await;
    debug!(sensor = %sensor, "Sensor loop stopped");
}
