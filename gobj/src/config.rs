//! Runtime settings and declarative object trees.

use crate::types::{GobjFlags, Json, JsonMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Runtime settings, usually the `runtime:` section of a yuno config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Trace levels enabled for every object
    #[serde(default)]
    pub trace_levels: Vec<String>,

    /// Trace levels per class name
    #[serde(default)]
    pub gclass_trace: HashMap<String, Vec<String>>,

    /// Trace levels per object name
    #[serde(default)]
    pub gobj_trace: HashMap<String, Vec<String>>,

    /// Attribute values keyed by class name or object name, applied at creation
    #[serde(default)]
    pub global_settings: HashMap<String, JsonMap>,

    /// Directory of the file-backed persistence; none disables persistence
    #[serde(default)]
    pub persistent_dir: Option<PathBuf>,

    /// File holding the node uuid
    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    /// Log every failed service and path lookup
    #[serde(default)]
    pub verbose_lookups: bool,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// One node of a declarative object tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub gclass: String,

    #[serde(default = "empty_kw")]
    pub kw: Json,

    #[serde(default)]
    pub service: bool,

    #[serde(default)]
    pub default_service: bool,

    #[serde(default)]
    pub autostart: bool,

    #[serde(default)]
    pub autoplay: bool,

    #[serde(default)]
    pub volatil: bool,

    #[serde(default)]
    pub disabled: bool,

    /// Become the bottom object of the parent node
    #[serde(default)]
    pub as_bottom: bool,

    #[serde(default)]
    pub children: Vec<NodeConfig>,
}

fn empty_kw() -> Json {
    Json::Object(JsonMap::new())
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, gclass: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gclass: gclass.into(),
            kw: empty_kw(),
            service: false,
            default_service: false,
            autostart: false,
            autoplay: false,
            volatil: false,
            disabled: false,
            as_bottom: false,
            children: Vec::new(),
        }
    }

    /// Creation flags described by this node
    pub fn gobj_flags(&self) -> GobjFlags {
        let mut flags = GobjFlags::empty();
        flags.set(GobjFlags::SERVICE, self.service);
        flags.set(GobjFlags::DEFAULT_SERVICE, self.default_service);
        flags.set(GobjFlags::AUTOSTART, self.autostart);
        flags.set(GobjFlags::AUTOPLAY, self.autoplay);
        flags.set(GobjFlags::VOLATIL, self.volatil);
        flags
    }

    /// Number of nodes in this subtree
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(NodeConfig::count).sum::<usize>()
    }
}

/// A yuno config file: runtime settings plus the object tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YunoConfig {
    #[serde(default)]
    pub runtime: Settings,

    pub yuno: NodeConfig,
}

impl YunoConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: YunoConfig = serde_yaml::from_str(yaml)?;
        if config.yuno.name.is_empty() {
            return Err(ConfigError::MissingField("yuno.name".to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::from_yaml_str("{}").unwrap();
        assert!(settings.trace_levels.is_empty());
        assert!(settings.persistent_dir.is_none());
        assert!(!settings.verbose_lookups);
    }

    #[test]
    fn test_yuno_config() {
        let yaml = r#"
runtime:
  trace_levels: [machine]
  global_settings:
    C_COUNTER:
      limit: 5
yuno:
  name: demo
  gclass: C_YUNO
  children:
    - name: counter
      gclass: C_COUNTER
      service: true
      autostart: true
      kw:
        limit: 3
"#;
        let config = YunoConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.runtime.trace_levels, vec!["machine"]);
        assert_eq!(config.runtime.global_settings["C_COUNTER"]["limit"], 5);
        assert_eq!(config.yuno.count(), 2);

        let counter = &config.yuno.children[0];
        assert_eq!(counter.kw["limit"], 3);
        let flags = counter.gobj_flags();
        assert!(flags.contains(GobjFlags::SERVICE | GobjFlags::AUTOSTART));
        assert!(!flags.contains(GobjFlags::AUTOPLAY));
        assert_eq!(config.yuno.kw, empty_kw());
    }

    #[test]
    fn test_missing_yuno_name() {
        let yaml = "yuno:\n  name: ''\n  gclass: C_YUNO\n";
        assert!(matches!(
            YunoConfig::from_yaml_str(yaml),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Settings::from_yaml_str("trace_levels: 7"),
            Err(ConfigError::ParseError(_))
        ));
    }
}
