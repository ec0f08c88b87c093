//! Background CPU and memory sampling for the machine running the engine.

use std::time::Duration;

use stampede_core::WatchdogSettings;
use sysinfo::{CpuExt, System, SystemExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One CPU/memory reading, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

impl ResourceSample {
    pub fn exceeds(&self, settings: &WatchdogSettings) -> bool {
        self.cpu_percent > settings.cpu_threshold || self.memory_percent > settings.memory_threshold
    }
}

fn sample(system: &mut System) -> ResourceSample {
    system.refresh_cpu();
    system.refresh_memory();
    let total = system.total_memory();
    let memory_percent = if total == 0 {
        0.0
    } else {
        (system.used_memory() as f64 / total as f64 * 100.0) as f32
    };
    ResourceSample {
        cpu_percent: system.global_cpu_info().cpu_usage(),
        memory_percent,
    }
}

/// Handle to a running watchdog. Dropping it leaves the task running until the
/// runtime shuts down; call [`Watchdog::stop`] to end it early.
pub struct Watchdog {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Watchdog {
    /// Spawn the sampling loop on the current tokio runtime.
    pub fn spawn(settings: WatchdogSettings) -> Self {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run(settings, rx));
        info!("System resource monitor started");
        Self { shutdown: tx, handle }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

async fn run(settings: WatchdogSettings, mut shutdown: watch::Receiver<bool>) {
    let mut system = System::new();
    // CPU usage is a delta between two refreshes; prime the first one.
    system.refresh_cpu();

    let mut ticker = tokio::time::interval(Duration::from_secs(settings.interval_secs.max(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reading = sample(&mut system);
                if reading.exceeds(&settings) {
                    warn!(
                        cpu = %format!("{:.1}%", reading.cpu_percent),
                        memory = %format!("{:.1}%", reading.memory_percent),
                        "High resource usage"
                    );
                } else {
                    debug!(cpu = reading.cpu_percent, memory = reading.memory_percent, "Resource sample");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
