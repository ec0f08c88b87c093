//! Process-level wiring for the engine side of a run.

use std::sync::Arc;

use stampede_core::{
    discover, project_from_env, resolve_env, LoadShape, ProjectLayout, ResolvedConfig,
    RunLifecycle, ScenarioRegistry,
};
use tracing::{info, warn};

use crate::listener::MetricsListener;
use crate::sink::{InfluxSink, MetricsSink};
use crate::watchdog::Watchdog;

/// Everything the engine needs to start: configuration, registered actors, the
/// optional load shape and a lifecycle with the metrics listener attached.
pub struct EngineHost {
    pub config: Arc<ResolvedConfig>,
    pub project: Option<String>,
    pub registry: ScenarioRegistry,
    pub shape: Option<LoadShape>,
    pub lifecycle: RunLifecycle,
    watchdog: Option<Watchdog>,
}

impl EngineHost {
    /// Bootstrap from `STAMPEDE_ROOT`, `STAMPEDE_ENV` and `STAMPEDE_PROJECT`, writing
    /// metrics to the configured InfluxDB.
    pub fn from_env() -> Self {
        let layout = ProjectLayout::discover(None);
        let env = resolve_env(None);
        let config = Arc::new(ResolvedConfig::load(layout, env));
        let sink: Arc<dyn MetricsSink> = Arc::new(InfluxSink::new(&config.influxdb()));
        Self::bootstrap(config, project_from_env(), sink)
    }

    /// Wire up a host around an already resolved configuration.
    ///
    /// The resource watchdog is only started when a tokio runtime is available.
    pub fn bootstrap(
        config: Arc<ResolvedConfig>,
        project: Option<String>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        if project.is_none() {
            warn!("STAMPEDE_PROJECT is not set, scenarios from every project will be loaded");
        }

        let view = project
            .as_deref()
            .map(|p| config.project_view(p))
            .unwrap_or_default();

        let shape = LoadShape::from_config(&view);
        if shape.is_some() {
            info!("Load shape configured, stages drive the run");
        } else {
            info!("No load shape configured, using engine CLI parameters");
        }

        info!(
            project = project.as_deref().unwrap_or("<all>"),
            env = config.env(),
            host = view.get_str("host").unwrap_or("<unset>"),
            "Loading project"
        );

        let registry = discover(&config, project.as_deref());

        let mut lifecycle = RunLifecycle::new();
        lifecycle.register(Arc::new(MetricsListener::for_this_host(sink)));

        let watchdog = start_watchdog(&config);

        Self {
            config,
            project,
            registry,
            shape,
            lifecycle,
            watchdog,
        }
    }

    pub fn has_watchdog(&self) -> bool {
        self.watchdog.is_some()
    }

    /// Stop background tasks owned by the host.
    pub async fn shutdown(self) {
        if let Some(watchdog) = self.watchdog {
            watchdog.stop().await;
        }
    }
}

fn start_watchdog(config: &ResolvedConfig) -> Option<Watchdog> {
    let settings = config.watchdog();
    if !settings.enabled {
        return None;
    }
    if let Err(e) = settings.validate() {
        warn!(error = %e, "Invalid watchdog settings, resource monitor disabled");
        return None;
    }
    if tokio::runtime::Handle::try_current().is_err() {
        warn!("No async runtime available, resource monitor disabled");
        return None;
    }
    Some(Watchdog::spawn(settings))
}
