//! Layered configuration resolution.
//!
//! The merged tree is built once per process from up to four kinds of YAML layers,
//! applied in this order:
//!
//! 1. `config/env/base.yaml` (global base)
//! 2. `config/env/<env>.yaml` (global environment override)
//! 3. `projects/<name>/env/base.yaml` (project base, scoped under `projects.<name>`)
//! 4. `projects/<name>/env/<env>.yaml` (project environment override)
//!
//! Every document goes through `${VAR:-default}` substitution before parsing. Nested
//! mappings merge recursively; any other value in a later layer replaces the earlier one.
//! A layer that is missing or malformed contributes an empty mapping and never fails the
//! resolution as a whole.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::interpolate::interpolate_env;
use crate::layout::ProjectLayout;
use crate::settings::{
    EngineSettings, InfluxSettings, NotificationSettings, SchedulerSettings, WatchdogSettings,
};

/// Top-level section holding per-project subtrees.
pub const PROJECTS_SECTION: &str = "projects";

/// Top-level section holding notification channels. Never leaks into project views.
pub const NOTIFICATION_SECTION: &str = "notification";

const RESERVED_SECTIONS: [&str; 2] = [PROJECTS_SECTION, NOTIFICATION_SECTION];

/// A mapping of string keys to scalars, sequences or nested mappings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree(Mapping);

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mapping(mapping: Mapping) -> Self {
        Self(mapping)
    }

    /// Parse a YAML document. An empty document is an empty tree; a non-mapping
    /// document is an error.
    pub fn from_yaml_str(text: &str) -> Result<Self, String> {
        match serde_yaml::from_str::<Value>(text) {
            Ok(Value::Null) => Ok(Self::new()),
            Ok(Value::Mapping(mapping)) => Ok(Self(mapping)),
            Ok(other) => Err(format!(
                "expected a mapping at the document root, found {}",
                value_kind(&other)
            )),
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.0
    }

    pub fn into_mapping(self) -> Mapping {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Look up a dot-separated path such as `notification.dingtalk.webhook`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = current.as_mapping()?.get(segment)?;
        }
        Some(current)
    }

    /// Like [`ConfigTree::get`], falling back to `default` when the path is absent.
    pub fn get_or<'a>(&'a self, path: &str, default: &'a Value) -> &'a Value {
        self.get(path).unwrap_or(default)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Deserialize the value at `path`. A value of the wrong shape is logged and
    /// treated as absent.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        let value = self.get(path)?;
        match serde_yaml::from_value(value.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(path, error = %e, "Ignoring configuration value of unexpected shape");
                None
            }
        }
    }

    /// Deserialize a section, using its `Default` when absent.
    ///
    /// A field of the wrong shape is logged and dropped on its own; the remaining
    /// fields of the section are kept.
    pub fn section<T: DeserializeOwned + Default>(&self, path: &str) -> T {
        let Some(value) = self.get(path) else {
            return T::default();
        };
        match serde_yaml::from_value(value.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(path, error = %e, "Configuration section has invalid fields");
                salvage_section(path, value)
            }
        }
    }

    /// Sub-mapping at `key`, or an empty tree.
    pub fn subtree(&self, key: &str) -> ConfigTree {
        match self.get(key) {
            Some(Value::Mapping(mapping)) => Self(mapping.clone()),
            _ => Self::new(),
        }
    }

    /// Deep-merge `overlay` onto this tree; `overlay` wins key by key.
    pub fn merge(&mut self, overlay: ConfigTree) {
        deep_merge(&mut self.0, overlay.0);
    }

    /// Set `key` at the top level, replacing any previous value.
    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(Value::String(key.to_string()), value);
    }
}

impl From<Mapping> for ConfigTree {
    fn from(mapping: Mapping) -> Self {
        Self(mapping)
    }
}

/// Rebuild a section field by field, skipping the fields that fail to deserialize.
/// Relies on `#[serde(default)]` for whatever is skipped.
fn salvage_section<T: DeserializeOwned + Default>(path: &str, value: &Value) -> T {
    let Value::Mapping(raw) = value else {
        warn!(path, "Configuration section is not a mapping, using defaults");
        return T::default();
    };
    let mut accepted = Mapping::new();
    for (key, field) in raw {
        let mut candidate = accepted.clone();
        candidate.insert(key.clone(), field.clone());
        match serde_yaml::from_value::<T>(Value::Mapping(candidate.clone())) {
            Ok(_) => accepted = candidate,
            Err(e) => warn!(path, key = ?key, error = %e, "Ignoring invalid configuration field"),
        }
    }
    serde_yaml::from_value(Value::Mapping(accepted)).unwrap_or_default()
}

/// Recursively merge `overlay` into `base`.
///
/// When both sides hold a mapping under the same key the merge recurses; in every other
/// case the overlay value replaces the base value wholesale (sequences are never
/// concatenated).
pub fn deep_merge(base: &mut Mapping, overlay: Mapping) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Mapping(existing)), Value::Mapping(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Read one layer, substituting environment tokens first.
pub fn try_read_layer(path: &Path) -> CoreResult<ConfigTree> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CoreError::not_found("configuration file", path.display().to_string())
        } else {
            CoreError::Io(e)
        }
    })?;
    let text = interpolate_env(&raw);
    ConfigTree::from_yaml_str(&text).map_err(|message| CoreError::parse(path, message))
}

/// Read one layer, degrading any failure to an empty mapping.
pub fn read_layer(path: &Path) -> ConfigTree {
    match try_read_layer(path) {
        Ok(tree) => tree,
        Err(CoreError::NotFound { .. }) => {
            warn!(path = %path.display(), "Configuration file not found, using an empty layer");
            ConfigTree::new()
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Malformed configuration layer ignored");
            ConfigTree::new()
        }
    }
}

/// Builds the merged configuration tree for one environment.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    layout: ProjectLayout,
    env: String,
}

impl ConfigResolver {
    pub fn new(layout: ProjectLayout, env: impl Into<String>) -> Self {
        Self {
            layout,
            env: env.into(),
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    /// Resolve every layer into one immutable configuration object.
    pub fn load(&self) -> ResolvedConfig {
        let global_dir = self.layout.global_env_dir();
        let mut tree = read_layer(&global_dir.join("base.yaml"));

        let env_path = global_dir.join(format!("{}.yaml", self.env));
        if env_path.exists() {
            tree.merge(read_layer(&env_path));
            info!(env = %self.env, "Loaded global config for environment");
        } else {
            warn!(env = %self.env, "Global configuration file for environment not found");
        }

        let mut projects = match tree.get(PROJECTS_SECTION) {
            Some(Value::Mapping(mapping)) => mapping.clone(),
            _ => Mapping::new(),
        };

        for project in self.layout.project_names() {
            if let Some(merged) = self.load_project_layers(&project, &projects) {
                projects.insert(Value::String(project.clone()), Value::Mapping(merged));
                info!(project = %project, "Loaded config for project");
            }
        }

        tree.insert(PROJECTS_SECTION, Value::Mapping(projects));

        ResolvedConfig {
            env: self.env.clone(),
            layout: self.layout.clone(),
            tree,
        }
    }

    /// Project base + env layers merged onto any `projects.<name>` subtree that the
    /// global layers already declared. `None` when the project has no `env/` directory.
    fn load_project_layers(&self, project: &str, projects: &Mapping) -> Option<Mapping> {
        let env_dir = self.layout.project_env_dir(project);
        if !env_dir.is_dir() {
            debug!(project, "Project has no env directory, skipping");
            return None;
        }

        let mut merged = match projects.get(project) {
            Some(Value::Mapping(existing)) => existing.clone(),
            _ => Mapping::new(),
        };

        for name in ["base".to_string(), self.env.clone()] {
            let path = env_dir.join(format!("{name}.yaml"));
            if path.exists() {
                deep_merge(&mut merged, read_layer(&path).into_mapping());
            }
        }

        Some(merged)
    }
}

/// The merged configuration tree. Built once at process entry and shared by reference.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    env: String,
    layout: ProjectLayout,
    tree: ConfigTree,
}

impl ResolvedConfig {
    /// Wrap an already merged tree, e.g. in tests.
    pub fn from_tree(layout: ProjectLayout, env: impl Into<String>, tree: ConfigTree) -> Self {
        Self {
            env: env.into(),
            layout,
            tree,
        }
    }

    /// Resolve from disk for `env`.
    pub fn load(layout: ProjectLayout, env: impl Into<String>) -> Self {
        ConfigResolver::new(layout, env).load()
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    /// Dot-path lookup over the full tree.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.tree.get(path)
    }

    pub fn get_or<'a>(&'a self, path: &str, default: &'a Value) -> &'a Value {
        self.tree.get_or(path, default)
    }

    /// Global defaults (minus `projects` and `notification`) merged with
    /// `projects.<name>`, project values winning. Recomputed on every call.
    pub fn project_view(&self, project: &str) -> ConfigTree {
        let mut view = Mapping::new();
        for (key, value) in self.tree.as_mapping() {
            let reserved = key
                .as_str()
                .map(|k| RESERVED_SECTIONS.contains(&k))
                .unwrap_or(false);
            if !reserved {
                view.insert(key.clone(), value.clone());
            }
        }

        if let Some(Value::Mapping(specific)) = self
            .tree
            .get(PROJECTS_SECTION)
            .and_then(|projects| projects.as_mapping())
            .and_then(|projects| projects.get(project))
        {
            deep_merge(&mut view, specific.clone());
        }

        ConfigTree::from_mapping(view)
    }

    /// Projects known to the merged tree, sorted.
    pub fn projects(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tree
            .subtree(PROJECTS_SECTION)
            .as_mapping()
            .keys()
            .filter_map(|key| key.as_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    pub fn notification(&self) -> NotificationSettings {
        self.tree.section(NOTIFICATION_SECTION)
    }

    pub fn influxdb(&self) -> InfluxSettings {
        self.tree.section("influxdb")
    }

    pub fn scheduler(&self) -> SchedulerSettings {
        self.tree.section("scheduler")
    }

    pub fn engine(&self) -> EngineSettings {
        self.tree.section("engine")
    }

    pub fn watchdog(&self) -> WatchdogSettings {
        self.tree.section("watchdog")
    }
}
