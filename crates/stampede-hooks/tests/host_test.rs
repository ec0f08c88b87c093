// Engine host bootstrap over a fixture workspace.

use std::path::Path;
use std::sync::Arc;

use stampede_core::{ProjectLayout, ResolvedConfig, RunState, ShapeTick};
use stampede_hooks::{EngineHost, MemorySink, MetricsSink};
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "config/env/base.yaml", "watchdog:\n  interval_secs: 1\n");
    write(
        root,
        "projects/crm/env/base.yaml",
        "host: https://crm.internal\n\
         load_shape:\n  stages:\n    - {duration: 60, users: 10, spawn_rate: 1}\n    - {duration: 120, users: 50, spawn_rate: 2}\n",
    );
    write(
        root,
        "projects/crm/scenarios/pages.yaml",
        "actors:\n  - name: PageUser\n    wait: {kind: constant_pacing, seconds: 3}\n    tasks:\n      - {name: me, path: /admin/me}\n",
    );
    dir
}

fn memory_sink() -> Arc<dyn MetricsSink> {
    Arc::new(MemorySink::new())
}

#[tokio::test]
async fn test_bootstrap_wires_everything() {
    let dir = workspace();
    let config = Arc::new(ResolvedConfig::load(ProjectLayout::new(dir.path()), "dev"));
    let host = EngineHost::bootstrap(config, Some("crm".to_string()), memory_sink());

    assert_eq!(host.registry.names(), vec!["PageUser"]);
    assert_eq!(
        host.registry.get("PageUser").unwrap().descriptor.host.as_deref(),
        Some("https://crm.internal")
    );
    let shape = host.shape.as_ref().unwrap();
    assert_eq!(shape.tick(30.0), ShapeTick::Target { users: 10, spawn_rate: 1.0 });
    assert_eq!(host.lifecycle.observer_count(), 1);
    assert_eq!(host.lifecycle.state(), RunState::Idle);
    assert!(host.has_watchdog());

    host.shutdown().await;
}

#[tokio::test]
async fn test_bootstrap_without_project_loads_all() {
    let dir = workspace();
    let config = Arc::new(ResolvedConfig::load(ProjectLayout::new(dir.path()), "dev"));
    let host = EngineHost::bootstrap(config, None, memory_sink());

    assert_eq!(host.registry.len(), 1);
    assert!(host.shape.is_none());
    host.shutdown().await;
}

#[test]
fn test_watchdog_skipped_outside_runtime() {
    let dir = workspace();
    let config = Arc::new(ResolvedConfig::load(ProjectLayout::new(dir.path()), "dev"));
    let host = EngineHost::bootstrap(config, Some("crm".to_string()), memory_sink());
    assert!(!host.has_watchdog());
}
