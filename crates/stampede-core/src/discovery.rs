//! Scenario discovery and the actor registry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::ResolvedConfig;
use crate::scenario::{ActorDescriptor, UnitLoader};

/// An actor selected for execution, with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredActor {
    pub project: String,
    pub source: PathBuf,
    pub descriptor: ActorDescriptor,
}

impl RegisteredActor {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Actors available to the engine, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRegistry {
    actors: BTreeMap<String, RegisteredActor>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `actor`, replacing (and returning) any earlier actor of the same name.
    pub fn register(&mut self, actor: RegisteredActor) -> Option<RegisteredActor> {
        let previous = self.actors.insert(actor.name().to_string(), actor);
        if let Some(previous) = &previous {
            warn!(
                actor = %previous.name(),
                replaced = %previous.source.display(),
                "Actor registered twice, keeping the later definition"
            );
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredActor> {
        self.actors.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.actors.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredActor> {
        self.actors.values()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

/// Scan scenario units and register every qualifying actor.
///
/// With a project, only `projects/<project>/scenarios/` is scanned; otherwise every
/// project's scenario tree is, each with its own project view supplying the default
/// host. Units that fail to load are logged and skipped.
pub fn discover(config: &ResolvedConfig, project: Option<&str>) -> ScenarioRegistry {
    let layout = config.layout();
    let projects = match project {
        Some(project) => vec![project.to_string()],
        None => layout.project_names(),
    };

    let mut registry = ScenarioRegistry::new();
    let mut loader = UnitLoader::new();

    for project in projects {
        let scenarios_dir = layout.scenarios_dir(&project);
        if !scenarios_dir.is_dir() {
            warn!(project = %project, path = %scenarios_dir.display(), "Scenarios directory not found");
            continue;
        }

        let default_host = config
            .project_view(&project)
            .get_str("host")
            .map(str::to_string);

        for unit_path in scenario_units(&scenarios_dir) {
            let unit = match loader.load(&unit_path) {
                Ok(unit) => unit,
                Err(e) => {
                    error!(path = %unit_path.display(), error = %e, "Failed to load scenario unit");
                    continue;
                }
            };

            for actor in unit.runnable() {
                let mut descriptor = actor.clone();
                if let Some(host) = &default_host {
                    if descriptor.needs_default_host() {
                        debug!(actor = %descriptor.name, host = %host, "Applying project host");
                        descriptor.host = Some(host.clone());
                    }
                }
                info!(project = %project, actor = %descriptor.name, path = %unit_path.display(), "Registered actor");
                registry.register(RegisteredActor {
                    project: project.clone(),
                    source: unit_path.clone(),
                    descriptor,
                });
            }
        }
    }

    registry
}

/// Every `*.yaml` / `*.yml` file under `root`, recursively, in file-name order.
pub fn scenario_units(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable scenario path");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
                .unwrap_or(false)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{TaskSpec, WaitPolicy};

    fn actor(name: &str) -> RegisteredActor {
        RegisteredActor {
            project: "crm".to_string(),
            source: PathBuf::from(format!("{name}.yaml")),
            descriptor: ActorDescriptor {
                name: name.to_string(),
                is_abstract: false,
                extends: None,
                host: None,
                weight: None,
                wait: Some(WaitPolicy::Constant { seconds: 1.0 }),
                headers: Default::default(),
                cookies: Default::default(),
                login: None,
                tasks: vec![TaskSpec {
                    name: "home".to_string(),
                    method: "GET".to_string(),
                    path: "/".to_string(),
                    weight: 1,
                    headers: Default::default(),
                    json: None,
                    body: None,
                    tags: Vec::new(),
                    fail_on_status: None,
                }],
            },
        }
    }

    #[test]
    fn test_later_registration_replaces_earlier() {
        let mut registry = ScenarioRegistry::new();
        assert!(registry.register(actor("PageUser")).is_none());

        let mut second = actor("PageUser");
        second.source = PathBuf::from("other.yaml");
        let previous = registry.register(second).unwrap();

        assert_eq!(previous.source, PathBuf::from("PageUser.yaml"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("PageUser").unwrap().source, PathBuf::from("other.yaml"));
    }

    #[test]
    fn test_names_are_sorted() {
        let mut registry = ScenarioRegistry::new();
        registry.register(actor("Zed"));
        registry.register(actor("Alpha"));
        assert_eq!(registry.names(), vec!["Alpha", "Zed"]);
    }
}
