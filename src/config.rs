use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Project configuration read from `.openedge.json`, the config file placed
/// at the workspace root. Every field is optional; a missing or unreadable
/// file means the defaults apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenEdgeConfig {
    pub working_directory: Option<String>,
    pub pro_path: Vec<String>,
    pub parameter_files: Vec<String>,
    pub startup_procedure: Option<String>,
}

impl OpenEdgeConfig {
    /// Load the configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: OpenEdgeConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Find and load `.openedge.json` in the given directory or any parent
    pub fn find_and_load<P: AsRef<Path>>(start_dir: P) -> Result<Self, ConfigError> {
        let mut current = start_dir.as_ref().to_path_buf();

        loop {
            let config_path = current.join(".openedge.json");
            if config_path.exists() {
                return Self::load(config_path);
            }

            if !current.pop() {
                return Err(ConfigError::NotFound);
            }
        }
    }

    /// Like `find_and_load`, but a missing file yields the default
    /// configuration instead of an error. A present-but-broken file still
    /// fails, so a typo is not silently ignored.
    pub fn load_or_default<P: AsRef<Path>>(start_dir: P) -> Result<Self, ConfigError> {
        match Self::find_and_load(start_dir) {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    NotFound,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::NotFound => write!(f, ".openedge.json not found"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parse() {
        let config_json = r#"{
            "workingDirectory": "src",
            "proPath": ["src", "lib"],
            "parameterFiles": ["default.pf"],
            "startupProcedure": "startup.p"
        }"#;

        let config: OpenEdgeConfig = serde_json::from_str(config_json).unwrap();
        assert_eq!(config.working_directory.as_deref(), Some("src"));
        assert_eq!(config.pro_path, vec!["src", "lib"]);
        assert_eq!(config.parameter_files, vec!["default.pf"]);
        assert_eq!(config.startup_procedure.as_deref(), Some("startup.p"));
    }

    #[test]
    fn test_config_defaults_for_missing_fields() {
        let config: OpenEdgeConfig = serde_json::from_str("{}").unwrap();
        assert!(config.working_directory.is_none());
        assert!(config.pro_path.is_empty());
    }

    #[test]
    fn test_find_and_load_walks_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            dir.path().join(".openedge.json"),
            r#"{"proPath": ["src"]}"#,
        )
        .unwrap();

        let config = OpenEdgeConfig::find_and_load(&nested).unwrap();
        assert_eq!(config.pro_path, vec!["src"]);
    }

    #[test]
    fn test_load_or_default_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let config = OpenEdgeConfig::load_or_default(dir.path()).unwrap();
        assert!(config.pro_path.is_empty());
    }

    #[test]
    fn test_broken_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".openedge.json"), "{not json").unwrap();
        assert!(matches!(
            OpenEdgeConfig::find_and_load(dir.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
