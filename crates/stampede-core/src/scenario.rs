//! Declarative scenario units and actor inheritance.
//!
//! A scenario unit is one YAML file holding `actors:` and optional `imports:`.
//! Imported actors take part in `extends:` resolution but belong to the unit they
//! were defined in; only a unit's own actors are ever candidates for registration.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::interpolate::interpolate_env;
use crate::session::LoginSpec;

/// Host value treated as "not configured".
pub const PLACEHOLDER_HOST: &str = "https://www.example.com";

/// How long a simulated user pauses between tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitPolicy {
    Constant { seconds: f64 },
    Between { min: f64, max: f64 },
    ConstantPacing { seconds: f64 },
    ConstantThroughput { task_runs_per_second: f64 },
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_task_weight() -> u32 {
    1
}

/// One HTTP request an actor performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    #[serde(default = "default_task_weight")]
    pub weight: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Responses with a status at or above this value count as failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_on_status: Option<u16>,
}

/// A simulated-user definition as written in a scenario unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorDescriptor {
    pub name: String,
    #[serde(rename = "abstract", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_abstract: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<WaitPolicy>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cookies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<LoginSpec>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

impl ActorDescriptor {
    /// Has both a task list and a wait policy, and is not abstract.
    pub fn is_runnable(&self) -> bool {
        !self.is_abstract && !self.tasks.is_empty() && self.wait.is_some()
    }

    /// Whether a configured default host should replace this actor's host.
    pub fn needs_default_host(&self) -> bool {
        match self.host.as_deref() {
            None => true,
            Some(host) => host == PLACEHOLDER_HOST,
        }
    }

    /// Flatten `self` over an already resolved `parent`.
    ///
    /// Scalars fall back to the parent, header and cookie maps merge with the child
    /// winning, and an empty task list inherits the parent's tasks. Abstractness is
    /// never inherited.
    fn inherit_from(mut self, parent: &ActorDescriptor) -> Self {
        self.host = self.host.or_else(|| parent.host.clone());
        self.weight = self.weight.or(parent.weight);
        self.wait = self.wait.or_else(|| parent.wait.clone());
        self.login = self.login.or_else(|| parent.login.clone());

        let mut headers = parent.headers.clone();
        headers.extend(std::mem::take(&mut self.headers));
        self.headers = headers;

        let mut cookies = parent.cookies.clone();
        cookies.extend(std::mem::take(&mut self.cookies));
        self.cookies = cookies;

        if self.tasks.is_empty() {
            self.tasks = parent.tasks.clone();
        }
        self
    }

    fn validate(&self, path: &Path) -> CoreResult<()> {
        for task in &self.tasks {
            if task.json.is_some() && task.body.is_some() {
                return Err(CoreError::parse(
                    path,
                    format!(
                        "task `{}` of actor `{}` sets both `json` and `body`",
                        task.name, self.name
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Raw contents of one scenario file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioUnit {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
    #[serde(default)]
    pub actors: Vec<ActorDescriptor>,
}

impl ScenarioUnit {
    /// Parse unit text after `${VAR}` substitution.
    pub fn parse(path: &Path, raw: &str) -> CoreResult<Self> {
        let text = interpolate_env(raw);
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|e| CoreError::parse(path, e))
    }

    pub fn read(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::not_found("scenario unit", path.display().to_string())
            } else {
                CoreError::Io(e)
            }
        })?;
        Self::parse(path, &raw)
    }
}

/// A unit after imports and inheritance have been resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUnit {
    pub path: PathBuf,
    /// Actors defined in this unit, flattened, in declaration order.
    pub own: Vec<ActorDescriptor>,
    /// Actors brought in through `imports:`, flattened.
    pub imported: BTreeMap<String, ActorDescriptor>,
}

impl ResolvedUnit {
    /// Own actors that qualify for registration.
    pub fn runnable(&self) -> impl Iterator<Item = &ActorDescriptor> {
        self.own.iter().filter(|actor| actor.is_runnable())
    }

    fn lookup(&self, name: &str) -> Option<&ActorDescriptor> {
        self.own
            .iter()
            .find(|actor| actor.name == name)
            .or_else(|| self.imported.get(name))
    }

    fn visible(&self) -> BTreeMap<String, ActorDescriptor> {
        let mut all = self.imported.clone();
        for actor in &self.own {
            all.insert(actor.name.clone(), actor.clone());
        }
        all
    }
}

/// Loads scenario units, following imports, with a per-loader cache.
#[derive(Debug, Default)]
pub struct UnitLoader {
    cache: HashMap<PathBuf, Arc<ResolvedUnit>>,
}

impl UnitLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and resolve the unit at `path`.
    pub fn load(&mut self, path: &Path) -> CoreResult<Arc<ResolvedUnit>> {
        let mut stack = Vec::new();
        self.load_inner(path, &mut stack)
    }

    fn load_inner(&mut self, path: &Path, stack: &mut Vec<PathBuf>) -> CoreResult<Arc<ResolvedUnit>> {
        let key = normalize(path);
        if let Some(unit) = self.cache.get(&key) {
            return Ok(Arc::clone(unit));
        }
        if stack.contains(&key) {
            return Err(CoreError::parse(
                path,
                format!("import cycle through {}", display_chain(stack, &key)),
            ));
        }

        stack.push(key.clone());
        let result = self.resolve(path, stack);
        stack.pop();

        let unit = Arc::new(result?);
        self.cache.insert(key, Arc::clone(&unit));
        Ok(unit)
    }

    fn resolve(&mut self, path: &Path, stack: &mut Vec<PathBuf>) -> CoreResult<ResolvedUnit> {
        let unit = ScenarioUnit::read(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut imported = BTreeMap::new();
        for import in &unit.imports {
            let (relative, actor) = match import.split_once('#') {
                Some((file, name)) => (file, Some(name)),
                None => (import.as_str(), None),
            };
            let target = base_dir.join(relative);
            let source = self.load_inner(&target, stack).map_err(|e| match e {
                CoreError::NotFound { .. } => CoreError::parse(
                    path,
                    format!("import `{import}` refers to missing unit {}", target.display()),
                ),
                other => other,
            })?;

            match actor {
                Some(name) => {
                    let found = source.lookup(name).ok_or_else(|| {
                        CoreError::parse(path, format!("import `{import}`: no actor named `{name}`"))
                    })?;
                    imported.insert(name.to_string(), found.clone());
                }
                None => imported.extend(source.visible()),
            }
        }

        let raw: BTreeMap<&str, &ActorDescriptor> =
            unit.actors.iter().map(|a| (a.name.as_str(), a)).collect();
        let mut resolved: HashMap<String, ActorDescriptor> = HashMap::new();
        let mut own = Vec::with_capacity(unit.actors.len());
        for actor in &unit.actors {
            let mut chain = Vec::new();
            let flat = flatten(actor.name.as_str(), &raw, &imported, &mut resolved, &mut chain, path)?;
            flat.validate(path)?;
            own.push(flat);
        }

        debug!(path = %path.display(), actors = own.len(), imported = imported.len(), "Resolved scenario unit");
        Ok(ResolvedUnit {
            path: path.to_path_buf(),
            own,
            imported,
        })
    }
}

fn flatten(
    name: &str,
    raw: &BTreeMap<&str, &ActorDescriptor>,
    imported: &BTreeMap<String, ActorDescriptor>,
    resolved: &mut HashMap<String, ActorDescriptor>,
    chain: &mut Vec<String>,
    path: &Path,
) -> CoreResult<ActorDescriptor> {
    if let Some(done) = resolved.get(name) {
        return Ok(done.clone());
    }
    let Some(actor) = raw.get(name) else {
        // Imported actors are already flattened in their own unit.
        return imported
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::parse(path, format!("unknown actor `{name}`")));
    };
    if chain.iter().any(|seen| seen == name) {
        chain.push(name.to_string());
        return Err(CoreError::parse(
            path,
            format!("inheritance cycle: {}", chain.join(" -> ")),
        ));
    }

    chain.push(name.to_string());
    let flat = match actor.extends.as_deref() {
        None => (*actor).clone(),
        Some(parent_name) => {
            if !raw.contains_key(parent_name) && !imported.contains_key(parent_name) {
                return Err(CoreError::parse(
                    path,
                    format!("actor `{name}` extends unknown actor `{parent_name}`"),
                ));
            }
            let parent = flatten(parent_name, raw, imported, resolved, chain, path)?;
            (*actor).clone().inherit_from(&parent)
        }
    };
    chain.pop();

    resolved.insert(name.to_string(), flat.clone());
    Ok(flat)
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn display_chain(stack: &[PathBuf], last: &Path) -> String {
    stack
        .iter()
        .map(|p| p.display().to_string())
        .chain(std::iter::once(last.display().to_string()))
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    const BASE_UNIT: &str = r#"
actors:
  - name: BaseUser
    abstract: true
    host: https://www.example.com
    headers:
      Accept: application/json
      User-Agent: stampede
    wait:
      kind: constant_pacing
      seconds: 3
"#;

    #[test]
    fn test_wait_policy_shapes() {
        let unit: ScenarioUnit = serde_yaml::from_str(
            "actors:\n\
             \x20 - {name: A, wait: {kind: constant, seconds: 1}}\n\
             \x20 - {name: B, wait: {kind: between, min: 1, max: 2.5}}\n\
             \x20 - {name: C, wait: {kind: constant_throughput, task_runs_per_second: 4}}\n",
        )
        .unwrap();
        assert_eq!(unit.actors[0].wait, Some(WaitPolicy::Constant { seconds: 1.0 }));
        assert_eq!(unit.actors[1].wait, Some(WaitPolicy::Between { min: 1.0, max: 2.5 }));
        assert_eq!(
            unit.actors[2].wait,
            Some(WaitPolicy::ConstantThroughput { task_runs_per_second: 4.0 })
        );
    }

    #[test]
    fn test_task_defaults() {
        let task: TaskSpec = serde_yaml::from_str("name: home\npath: /\n").unwrap();
        assert_eq!(task.method, "GET");
        assert_eq!(task.weight, 1);
        assert!(task.fail_on_status.is_none());
    }

    #[test]
    fn test_extends_within_unit() {
        let dir = TempDir::new().unwrap();
        let unit_text = format!(
            "{BASE_UNIT}{}",
            r#"
  - name: PageUser
    extends: BaseUser
    headers:
      User-Agent: page-bot
    tasks:
      - {name: home, path: /}
"#
        );
        let path = write(&dir, "pages.yaml", &unit_text);

        let unit = UnitLoader::new().load(&path).unwrap();
        let runnable: Vec<_> = unit.runnable().collect();
        assert_eq!(runnable.len(), 1);

        let page = runnable[0];
        assert_eq!(page.name, "PageUser");
        assert!(!page.is_abstract);
        assert_eq!(page.host.as_deref(), Some(PLACEHOLDER_HOST));
        assert_eq!(page.wait, Some(WaitPolicy::ConstantPacing { seconds: 3.0 }));
        assert_eq!(page.headers["Accept"], "application/json");
        assert_eq!(page.headers["User-Agent"], "page-bot");
    }

    #[test]
    fn test_imported_actor_is_not_own() {
        let dir = TempDir::new().unwrap();
        write(&dir, "common.yaml", BASE_UNIT);
        let path = write(
            &dir,
            "pages.yaml",
            "imports: [\"common.yaml#BaseUser\"]\n\
             actors:\n\
             \x20 - name: PageUser\n\
             \x20   extends: BaseUser\n\
             \x20   tasks: [{name: home, path: /}]\n",
        );

        let unit = UnitLoader::new().load(&path).unwrap();
        assert_eq!(unit.own.len(), 1);
        assert!(unit.imported.contains_key("BaseUser"));
        assert_eq!(unit.runnable().count(), 1);
    }

    #[test]
    fn test_unknown_parent_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "bad.yaml",
            "actors:\n  - {name: Orphan, extends: Missing}\n",
        );
        let err = UnitLoader::new().load(&path).unwrap_err();
        assert!(err.to_string().contains("unknown actor `Missing`"));
    }

    #[test]
    fn test_inheritance_cycle_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "cycle.yaml",
            "actors:\n  - {name: A, extends: B}\n  - {name: B, extends: A}\n",
        );
        let err = UnitLoader::new().load(&path).unwrap_err();
        assert!(err.to_string().contains("inheritance cycle"));
    }

    #[test]
    fn test_import_cycle_is_error() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.yaml", "imports: [b.yaml]\nactors: []\n");
        let path = write(&dir, "b.yaml", "imports: [a.yaml]\nactors: []\n");
        let err = UnitLoader::new().load(&path).unwrap_err();
        assert!(err.to_string().contains("import cycle"));
    }

    #[test]
    fn test_missing_import_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "pages.yaml", "imports: [\"nowhere.yaml#Base\"]\n");
        let err = UnitLoader::new().load(&path).unwrap_err();
        assert!(matches!(err, CoreError::Parse { .. }));
    }

    #[test]
    fn test_json_and_body_conflict() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "conflict.yaml",
            "actors:\n  - name: A\n    tasks:\n      - {name: t, path: /, json: {a: 1}, body: raw}\n",
        );
        assert!(UnitLoader::new().load(&path).is_err());
    }

    #[test]
    fn test_needs_default_host() {
        let mut actor: ActorDescriptor = serde_yaml::from_str("name: A\n").unwrap();
        assert!(actor.needs_default_host());
        actor.host = Some(PLACEHOLDER_HOST.to_string());
        assert!(actor.needs_default_host());
        actor.host = Some("https://crm.example".to_string());
        assert!(!actor.needs_default_host());
    }
}
