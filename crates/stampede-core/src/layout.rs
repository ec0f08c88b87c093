//! Fixed on-disk locations under a workspace root.

use std::path::{Path, PathBuf};

/// Environment variable selecting the active project.
pub const PROJECT_ENV_VAR: &str = "STAMPEDE_PROJECT";

/// Environment variable selecting the configuration environment.
pub const ENV_ENV_VAR: &str = "STAMPEDE_ENV";

/// Environment variable overriding the workspace root.
pub const ROOT_ENV_VAR: &str = "STAMPEDE_ROOT";

/// Environment used when none is selected.
pub const DEFAULT_ENV: &str = "dev";

/// Resolves the fixed relative locations of config documents, scenario units and fixtures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from an explicit argument, then `STAMPEDE_ROOT`, then the current directory.
    pub fn discover(explicit: Option<&Path>) -> Self {
        if let Some(root) = explicit {
            return Self::new(root);
        }
        match std::env::var_os(ROOT_ENV_VAR) {
            Some(root) if !root.is_empty() => Self::new(root),
            _ => Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn global_env_dir(&self) -> PathBuf {
        self.root.join("config").join("env")
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.root.join("projects")
    }

    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.projects_dir().join(project)
    }

    pub fn project_env_dir(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("env")
    }

    pub fn scenarios_dir(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("scenarios")
    }

    pub fn generated_scenarios_dir(&self, project: &str) -> PathBuf {
        self.scenarios_dir(project).join("generated")
    }

    pub fn data_dir(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("data")
    }

    pub fn curl_dir(&self, project: &str) -> PathBuf {
        self.data_dir(project).join("curl")
    }

    pub fn run_config_path(&self) -> PathBuf {
        self.root.join("run_config.yaml")
    }

    /// Names of every directory directly under `projects/`, sorted.
    pub fn project_names(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.projects_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }
}

/// Environment from an explicit argument, then `STAMPEDE_ENV`, then `dev`.
pub fn resolve_env(explicit: Option<&str>) -> String {
    if let Some(env) = explicit {
        return env.to_string();
    }
    std::env::var(ENV_ENV_VAR)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_ENV.to_string())
}

/// Project selected through `STAMPEDE_PROJECT`, if any.
pub fn project_from_env() -> Option<String> {
    std::env::var(PROJECT_ENV_VAR)
        .ok()
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let layout = ProjectLayout::new("/srv/perf");
        assert_eq!(layout.global_env_dir(), PathBuf::from("/srv/perf/config/env"));
        assert_eq!(
            layout.scenarios_dir("crm"),
            PathBuf::from("/srv/perf/projects/crm/scenarios")
        );
        assert_eq!(
            layout.curl_dir("crm"),
            PathBuf::from("/srv/perf/projects/crm/data/curl")
        );
    }

    #[test]
    fn test_project_names_only_lists_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("projects/website")).unwrap();
        std::fs::create_dir_all(dir.path().join("projects/crm")).unwrap();
        std::fs::write(dir.path().join("projects/README.md"), "notes").unwrap();

        let layout = ProjectLayout::new(dir.path());
        assert_eq!(layout.project_names(), vec!["crm", "website"]);
    }

    #[test]
    fn test_project_names_without_projects_dir() {
        let dir = TempDir::new().unwrap();
        assert!(ProjectLayout::new(dir.path()).project_names().is_empty());
    }
}
