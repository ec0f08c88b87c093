//! Defaults for the quick runner, read from `run_config.yaml` at the workspace root.

use std::path::Path;

use serde_yaml::Value;
use stampede_core::{interpolate_env, ConfigTree, DEFAULT_ENV};
use tracing::{debug, warn};

pub const DEFAULT_PROJECT: &str = "crm";
const DEFAULT_SECTION: &str = "default";
const PROJECTS_SECTION: &str = "projects";

/// Resolved quick-run parameters. Numeric values stay textual and are handed to the
/// executor as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct QuickRunParams {
    pub project: String,
    pub env: String,
    pub users: String,
    pub spawn_rate: String,
    pub duration: String,
}

impl Default for QuickRunParams {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT.to_string(),
            env: DEFAULT_ENV.to_string(),
            users: "10".to_string(),
            spawn_rate: "2".to_string(),
            duration: "30s".to_string(),
        }
    }
}

impl QuickRunParams {
    /// Built-in defaults, then the `default:` section, then `projects.<project>:`.
    ///
    /// The target project is `project` when given, else whatever the `default:`
    /// section names. A missing or malformed file leaves the built-in defaults.
    pub fn load(path: &Path, project: Option<&str>) -> Self {
        let mut params = Self::default();
        if let Some(project) = project {
            params.project = project.to_string();
        }

        if !path.exists() {
            debug!(path = %path.display(), "No run config, using built-in defaults");
            return params;
        }
        let tree = match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| ConfigTree::from_yaml_str(&interpolate_env(&raw)))
        {
            Ok(tree) => tree,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load run config");
                return params;
            }
        };

        params.apply(&tree.subtree(DEFAULT_SECTION), project.is_none());
        let target = params.project.clone();
        let project_section = tree.subtree(PROJECTS_SECTION).subtree(&target);
        params.apply(&project_section, false);
        params.project = target;
        params
    }

    fn apply(&mut self, section: &ConfigTree, take_project: bool) {
        let fields: [(&str, &mut String); 4] = [
            ("env", &mut self.env),
            ("users", &mut self.users),
            ("spawn_rate", &mut self.spawn_rate),
            ("duration", &mut self.duration),
        ];
        for (key, slot) in fields {
            if let Some(value) = section.get(key).and_then(scalar_text) {
                *slot = value;
            }
        }
        if take_project {
            if let Some(project) = section.get("project").and_then(scalar_text) {
                self.project = project;
            }
        }
    }

    /// Positional `env`, `users` and `duration` overrides, in that order.
    pub fn override_with(mut self, env: Option<String>, users: Option<String>, duration: Option<String>) -> Self {
        if let Some(env) = env {
            self.env = env;
        }
        if let Some(users) = users {
            self.users = users;
        }
        if let Some(duration) = duration {
            self.duration = duration;
        }
        self
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
