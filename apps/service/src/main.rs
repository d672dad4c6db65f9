use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use isp_health::{Coordinator, Probes, SensorReading, SensorType};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

mod config;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "isp-health-service")]
#[command(version, about = "Monitors the health of the internet connection")]
struct Args {
    /// Path to configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Wait for one reading of every enabled sensor, print the report as JSON and exit
    #[arg(long)]
    once: bool,

    /// How long --once waits for the slowest sensor
    #[arg(long, default_value_t = 180)]
    once_timeout_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init()?;
    let args = Args::parse();

    let config = Config::from_config(args.config.as_ref()).context("failed to load configuration")?;
    debug!("{config}");

    let coordinator = Coordinator::start(config.monitor.clone(), Probes::system()?)?;
    info!(sensors = ?config.monitor.enabled_sensors(), "monitoring started");

    if args.once {
        let complete = collect_once(&coordinator, Duration::from_secs(args.once_timeout_seconds)).await;
        println!("{}", serde_json::to_string_pretty(&coordinator.get_report())?);
        coordinator.shutdown().await;
        if !complete {
            anyhow::bail!("timed out before every enabled sensor reported");
        }
        return Ok(());
    }

    run(&coordinator, &args, config).await?;
    coordinator.shutdown().await;
    info!("monitoring stopped");
    Ok(())
}

/// Wait until each enabled sensor has settled at least one reading
async fn collect_once(coordinator: &Coordinator, limit: Duration) -> bool {
    let mut updates = coordinator.subscribe();
    let mut pending: BTreeSet<SensorType> = coordinator.config().enabled_sensors().into_iter().collect();
    for sensor in coordinator.get_report().keys() {
        pending.remove(sensor);
    }

    let deadline = Instant::now() + limit;
    while !pending.is_empty() {
        match tokio::time::timeout_at(deadline, updates.recv()).await {
            Ok(Ok(reading)) => {
                pending.remove(&reading.sensor_type);
            }
            Ok(Err(RecvError::Lagged(_))) => {
                for sensor in coordinator.get_report().keys() {
                    pending.remove(sensor);
                }
            }
            Ok(Err(RecvError::Closed)) => return false,
            Err(_) => {
                warn!(pending = ?pending, "sensors did not report in time");
                return false;
            }
        }
    }
    true
}

async fn run(coordinator: &Coordinator, args: &Args, mut config: Config) -> anyhow::Result<()> {
    let mut updates = coordinator.subscribe();
    let mut report_timer = report_interval(&config);
    let mut signals = Signals::new()?;

    loop {
        tokio::select! {
            signal = signals.next() => match signal {
                Signal::Stop => {
                    info!("shutdown requested");
                    break;
                }
                Signal::Reload => match Config::from_config(args.config.as_ref()) {
                    Ok(reloaded) => match coordinator.apply_config(reloaded.monitor.clone()) {
                        Ok(()) => {
                            if reloaded.service != config.service {
                                report_timer = report_interval(&reloaded);
                            }
                            config = reloaded;
                            info!(sensors = ?config.monitor.enabled_sensors(), "configuration reloaded");
                        }
                        Err(e) => error!("rejected reloaded configuration: {e}"),
                    },
                    Err(e) => error!("failed to reload configuration: {e}"),
                },
            },
            update = updates.recv() => match update {
                Ok(reading) => log_reading(&reading),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "reading log fell behind"),
                Err(RecvError::Closed) => break,
            },
            _ = tick(report_timer.as_mut()) => {
                match serde_json::to_string(&coordinator.get_report()) {
                    Ok(report) => info!(report = %report, "health report"),
                    Err(e) => error!("failed to serialize report: {e}"),
                }
            }
        }
    }

    Ok(())
}

fn log_reading(reading: &SensorReading) {
    let sensor = reading.sensor_type.as_str();
    if reading.status == isp_health::SensorStatus::Error {
        let error = reading.attribute("error").and_then(|value| value.as_str()).unwrap_or_default();
        warn!(sensor, state = %reading.state, stale = reading.is_stale(), error, "sensor failed");
    } else {
        info!(sensor, state = %reading.state, status = %reading.status, "sensor updated");
    }
}

fn report_interval(config: &Config) -> Option<Interval> {
    match config.service.report_interval_seconds {
        0 => None,
        seconds => {
            let period = Duration::from_secs(seconds);
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(timer)
        }
    }
}

async fn tick(timer: Option<&mut Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

enum Signal {
    Stop,
    Reload,
}

/// SIGINT and SIGTERM stop the service, SIGHUP reloads the configuration
#[cfg(unix)]
struct Signals {
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self { terminate: signal(SignalKind::terminate())?, hangup: signal(SignalKind::hangup())? })
    }

    async fn next(&mut self) -> Signal {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => Signal::Stop,
            _ = self.terminate.recv() => Signal::Stop,
            _ = self.hangup.recv() => Signal::Reload,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> Signal {
        let _ = tokio::signal::ctrl_c().await;
        Signal::Stop
    }
}
