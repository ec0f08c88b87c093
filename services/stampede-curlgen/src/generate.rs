//! Scenario units from parsed curl requests, and where to write them.

use std::path::{Path, PathBuf};

use stampede_core::{ActorDescriptor, ProjectLayout, ScenarioUnit, TaskSpec, WaitPolicy};
use tracing::{info, warn};
use url::Url;

use crate::curl::CurlRequest;
use crate::error::{GenerateError, GenerateResult};

pub const TASK_NAME: &str = "generated_task";
pub const FAIL_ON_STATUS: u16 = 400;
const PACING_SECONDS: f64 = 1.0;
const FALLBACK_FILE: &str = "scenario.yaml";

/// Lowercase, keep word characters, turn runs of spaces and dashes into `_`.
pub fn slugify(input: &str) -> String {
    let kept: String = input
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();

    let mut slug = String::new();
    let mut pending_separator = false;
    for ch in kept.trim().chars() {
        if ch == '-' || ch.is_whitespace() {
            pending_separator = true;
            continue;
        }
        if pending_separator {
            slug.push('_');
            pending_separator = false;
        }
        slug.extend(ch.to_lowercase());
    }
    if pending_separator {
        slug.push('_');
    }
    slug
}

/// Slug of the last path segment, `root` for `/`.
pub fn endpoint_name(url: &Url) -> String {
    let last = url.path().rsplit('/').next().unwrap_or_default();
    let slug = slugify(if last.is_empty() { "root" } else { last });
    if slug.is_empty() {
        "root".to_string()
    } else {
        slug
    }
}

/// `user_login` -> `UserLoginUser`.
pub fn actor_name(endpoint: &str) -> String {
    let mut name: String = endpoint.split('_').map(title_case).collect();
    name.push_str("User");
    name
}

/// Capitalize the first letter of every alphabetic run, lowercase the rest.
fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut in_letters = false;
    for ch in word.chars() {
        if ch.is_alphabetic() {
            if in_letters {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_letters = true;
        } else {
            out.push(ch);
            in_letters = false;
        }
    }
    out
}

/// A scenario unit generated from one request.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedScenario {
    pub endpoint: String,
    pub source_url: String,
    pub unit: ScenarioUnit,
}

impl GeneratedScenario {
    pub fn from_request(request: CurlRequest) -> GenerateResult<Self> {
        let url = Url::parse(&request.url).map_err(|source| GenerateError::InvalidUrl {
            url: request.url.clone(),
            source,
        })?;

        let host = match url.port() {
            Some(port) => format!("{}://{}:{port}", url.scheme(), url.host_str().unwrap_or_default()),
            None => format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default()),
        };
        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        let (json, body) = match request.body {
            Some(body) => match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(json) => (Some(json), None),
                Err(_) => (None, Some(body)),
            },
            None => (None, None),
        };

        let endpoint = endpoint_name(&url);
        let task = TaskSpec {
            name: TASK_NAME.to_string(),
            method: request.method,
            path,
            weight: 1,
            headers: Default::default(),
            json,
            body,
            tags: Vec::new(),
            fail_on_status: Some(FAIL_ON_STATUS),
        };
        let actor = ActorDescriptor {
            name: actor_name(&endpoint),
            is_abstract: false,
            extends: None,
            host: Some(host),
            weight: None,
            wait: Some(WaitPolicy::ConstantPacing {
                seconds: PACING_SECONDS,
            }),
            headers: request.headers,
            cookies: request.cookies,
            login: None,
            tasks: vec![task],
        };

        Ok(Self {
            endpoint,
            source_url: request.url,
            unit: ScenarioUnit {
                imports: Vec::new(),
                actors: vec![actor],
            },
        })
    }

    pub fn file_name(&self) -> String {
        format!("{}.yaml", self.endpoint)
    }

    pub fn to_yaml(&self) -> GenerateResult<String> {
        let body = serde_yaml::to_string(&self.unit)?;
        Ok(format!("# Generated by stampede-curlgen from {}\n{body}", self.source_url))
    }

    /// Write the unit to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> GenerateResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_yaml()?)?;
        let actor = self.unit.actors.first().map(|a| a.name.as_str()).unwrap_or_default();
        info!(path = %path.display(), actor, "Scenario generated");
        Ok(())
    }
}

/// Read an input argument: a file path, a file under the project's `data/curl/`
/// or `data/`, or else the raw curl command itself. Line continuations and
/// newlines are flattened to spaces.
pub fn resolve_input(layout: &ProjectLayout, project: &str, input: &str) -> GenerateResult<String> {
    let candidates = [
        PathBuf::from(input),
        layout.curl_dir(project).join(input),
        layout.data_dir(project).join(input),
    ];
    let text = match candidates.iter().find(|p| p.is_file()) {
        Some(path) => {
            info!(path = %path.display(), "Processing file");
            std::fs::read_to_string(path)?.trim().to_string()
        }
        None => {
            info!("Processing raw curl string");
            input.to_string()
        }
    };
    Ok(flatten_command(&text))
}

pub fn flatten_command(text: &str) -> String {
    text.replace("\\\r\n", " ")
        .replace("\\\n", " ")
        .replace("\r\n", " ")
        .replace('\n', " ")
}

/// Where the unit for one input goes.
///
/// With several inputs `output` is always a directory. With one input it is a
/// directory when it already is one or ends in `/`, else the file itself.
pub fn output_path(
    layout: &ProjectLayout,
    project: &str,
    output: Option<&Path>,
    input_count: usize,
    file_name: Option<&str>,
) -> PathBuf {
    let file_name = file_name.unwrap_or(FALLBACK_FILE);
    let Some(output) = output else {
        return layout.generated_scenarios_dir(project).join(file_name);
    };
    if input_count > 1 {
        if output.extension().is_some() {
            warn!(
                output = %output.display(),
                "Several inputs but output looks like a file, treating it as a directory"
            );
        }
        return output.join(file_name);
    }
    let trailing_slash = output.to_string_lossy().ends_with('/');
    if output.is_dir() || trailing_slash {
        output.join(file_name)
    } else {
        output.to_path_buf()
    }
}
