use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::error::ConfigError;
use crate::types::{SetupScheme, WorkflowSpec};

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(.*?)\}\}").expect("valid regex"))
}

fn environ_lookup_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*index\s+\.Environ\s+"([^"]+)"\s*$"#).expect("valid regex")
    })
}

/// Substitute `{{ index .Environ "NAME" }}` placeholders from `environ`.
///
/// Any other `{{ ... }}` expression, or a name missing from `environ`, is a
/// template error.
pub fn render_template(text: &str, environ: &HashMap<String, String>) -> Result<String, ConfigError> {
    let mut rendered = String::with_capacity(text.len());
    let mut last = 0;

    for caps in placeholder_regex().captures_iter(text) {
        let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = environ_lookup_regex()
            .captures(expr.as_str())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| {
                ConfigError::TemplateError(format!(
                    "unsupported expression '{}'",
                    whole.as_str()
                ))
            })?;
        let value = environ.get(name).ok_or_else(|| {
            ConfigError::TemplateError(format!("environment variable '{name}' is not set"))
        })?;

        rendered.push_str(&text[last..whole.start()]);
        rendered.push_str(value);
        last = whole.end();
    }

    rendered.push_str(&text[last..]);
    Ok(rendered)
}

/// Render and parse a task file's contents.
pub fn parse_config(text: &str, environ: &HashMap<String, String>) -> Result<SetupScheme, ConfigError> {
    let rendered = render_template(text, environ)?;
    let scheme: SetupScheme = serde_yaml::from_str(&rendered)?;
    Ok(scheme)
}

/// Read a task file, rendering placeholders from the process environment.
pub fn read_config(config_path: &str) -> Result<SetupScheme, ConfigError> {
    let environ: HashMap<String, String> = std::env::vars().collect();
    read_config_with_env(config_path, &environ)
}

pub fn read_config_with_env(
    config_path: &str,
    environ: &HashMap<String, String>,
) -> Result<SetupScheme, ConfigError> {
    if !config_exists(config_path) {
        return Err(ConfigError::NotFound(config_path.to_string()));
    }
    let text = std::fs::read_to_string(config_path)?;
    debug!(config_path, bytes = text.len(), "read task file");
    parse_config(&text, environ)
}

pub fn config_exists(config_path: &str) -> bool {
    Path::new(config_path).is_file()
}

/// Check the fields a run cannot do without, collecting every problem.
pub fn validate_config(scheme: &SetupScheme) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if scheme.github_organization.trim().is_empty() {
        errors.push("githubOrganization is required".to_string());
    }
    if scheme.github_repository.trim().is_empty() {
        errors.push("githubRepository is required".to_string());
    }

    for (index, task) in scheme.tasks.iter().enumerate() {
        if task.title.trim().is_empty() {
            errors.push(format!("tasks[{index}]: title is required"));
        }
        if task.assignee.github_username.trim().is_empty() {
            errors.push(format!(
                "tasks[{index}]: assignee.github_username is required"
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors))
    }
}

/// Read, validate and project a task file into a [`WorkflowSpec`].
pub fn load_workflow_spec(config_path: &str) -> Result<(SetupScheme, WorkflowSpec), ConfigError> {
    let scheme = read_config(config_path)?;
    validate_config(&scheme)?;
    let spec = scheme.to_workflow_spec();
    Ok((scheme, spec))
}
