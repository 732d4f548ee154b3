use std::env;
use std::path::{Path, PathBuf};

/// File name searched for in the working directory and its parents.
pub const LOCAL_CONFIG_FILE: &str = "onboard.config.yaml";

/// Where a task file was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Passed on the command line
    Explicit,
    /// Found walking up from the working directory
    Local,
    /// The per-user config directory
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub source: ConfigSource,
    pub config_path: String,
}

/// Get the global config directory (~/.config/onboard or $XDG_CONFIG_HOME/onboard)
pub fn get_global_config_dir() -> PathBuf {
    let base = if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config")
    } else {
        PathBuf::from(".config")
    };
    base.join("onboard")
}

/// Walk up from start_dir looking for onboard.config.yaml
pub fn find_local_config(start_dir: Option<&Path>) -> Option<PathBuf> {
    let start = match start_dir {
        Some(dir) => dir.to_path_buf(),
        None => env::current_dir().ok()?,
    };

    let mut dir = start.as_path();

    loop {
        let config_path = dir.join(LOCAL_CONFIG_FILE);
        if config_path.is_file() {
            return Some(config_path);
        }

        match dir.parent() {
            Some(parent) if parent != dir => dir = parent,
            _ => break,
        }
    }

    None
}

/// Resolve the task file to load.
/// Priority: explicit path > local config (walk up tree) > global config
pub fn resolve_config_path(explicit: Option<&str>) -> ConfigLocation {
    if let Some(path) = explicit {
        return ConfigLocation {
            source: ConfigSource::Explicit,
            config_path: path.to_string(),
        };
    }

    if let Some(local_config) = find_local_config(None) {
        return ConfigLocation {
            source: ConfigSource::Local,
            config_path: local_config.to_string_lossy().to_string(),
        };
    }

    ConfigLocation {
        source: ConfigSource::Global,
        config_path: get_global_config_dir()
            .join("config.yaml")
            .to_string_lossy()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_local_config_with_temp_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join(LOCAL_CONFIG_FILE);
        std::fs::write(&config_path, "githubOrganization: acme\n").unwrap();

        let found = find_local_config(Some(tmp.path()));
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_local_config_walks_up() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join(LOCAL_CONFIG_FILE);
        std::fs::write(&config_path, "githubOrganization: acme\n").unwrap();

        let subdir = tmp.path().join("docs").join("team");
        std::fs::create_dir_all(&subdir).unwrap();

        let found = find_local_config(Some(&subdir));
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_local_config_ignores_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join(LOCAL_CONFIG_FILE)).unwrap();

        let nested = tmp.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        let found = find_local_config(Some(&nested));
        assert_ne!(found, Some(tmp.path().join(LOCAL_CONFIG_FILE)));
    }

    #[test]
    fn test_explicit_path_wins() {
        let location = resolve_config_path(Some("/tmp/tasks.yaml"));
        assert_eq!(location.source, ConfigSource::Explicit);
        assert_eq!(location.config_path, "/tmp/tasks.yaml");
    }

    #[test]
    fn test_get_global_config_dir() {
        let dir = get_global_config_dir();
        assert!(dir.ends_with("onboard"));
    }
}
