//! Engine configuration

use flow_types::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum nodes a single transition may traverse before it is treated
    /// as a routing cycle
    pub max_route_hops: usize,

    /// Flow managers outside a node's required operators may decide it outright
    pub manager_override: bool,

    /// Refuse to create instances of disabled graphs
    pub require_enabled_graph: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_route_hops: 64,
            manager_override: true,
            require_enabled_graph: true,
        }
    }
}

impl EngineConfig {
    /// Parse configuration from TOML text; missing keys take their defaults
    pub fn from_toml(contents: &str) -> FlowResult<Self> {
        let config: EngineConfig =
            toml::from_str(contents).map_err(|e| FlowError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, falling back to defaults if it does not exist
    pub fn load(path: impl AsRef<Path>) -> FlowResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    pub fn to_toml(&self) -> FlowResult<String> {
        toml::to_string_pretty(self).map_err(|e| FlowError::Configuration(e.to_string()))
    }

    pub fn validate(&self) -> FlowResult<()> {
        if self.max_route_hops == 0 {
            return Err(FlowError::Configuration(
                "max_route_hops must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn with_max_route_hops(mut self, hops: usize) -> Self {
        self.max_route_hops = hops;
        self
    }

    pub fn without_manager_override(mut self) -> Self {
        self.manager_override = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_route_hops, 64);
        assert!(config.manager_override);
        assert!(config.require_enabled_graph);
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml("max_route_hops = 8").unwrap();
        assert_eq!(config.max_route_hops, 8);
        assert!(config.manager_override);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            EngineConfig::from_toml("max_route_hops = \"many\""),
            Err(FlowError::Configuration(_))
        ));
        assert!(EngineConfig::from_toml("max_route_hops = 0").is_err());
    }

    #[test]
    fn test_load_missing_config() {
        let config = EngineConfig::load("/nonexistent/path/flow.toml").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default()
            .with_max_route_hops(10)
            .without_manager_override();
        let text = config.to_toml().unwrap();
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
    }
}
