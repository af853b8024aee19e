//! Engine configuration (`tgraph.toml`).
//!
//! Everything is optional. Values present here override what the graph
//! document carries; absent values leave the graph untouched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use tgraph_core::{ExecutionPolicy, FailurePolicy, Graph, ReadinessPolicy, parse_interval};
use tgraph_score::ScoreBands;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for {field}: {value}")]
    Invalid { field: &'static str, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overrides the graph's batch limit. Must be positive.
    pub batch_limit: Option<i64>,
    /// Overrides the graph's network delay, e.g. `60s`.
    pub network_delay: Option<String>,
    pub failure_policy: FailurePolicy,
    pub continue_on_failed_inputs: bool,
    pub missing_inputs_satisfied: bool,
    pub scores: ScoreBands,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_limit: None,
            network_delay: None,
            failure_policy: FailurePolicy::default(),
            continue_on_failed_inputs: false,
            missing_inputs_satisfied: true,
            scores: ScoreBands::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.batch_limit()?;
        self.network_delay()?;
        Ok(())
    }

    /// The batch limit override, if any.
    pub fn batch_limit(&self) -> ConfigResult<Option<u32>> {
        match self.batch_limit {
            None => Ok(None),
            Some(n) if n > 0 => u32::try_from(n).map(Some).map_err(|_| ConfigError::Invalid {
                field: "batch_limit",
                value: n.to_string(),
            }),
            Some(n) => Err(ConfigError::Invalid {
                field: "batch_limit",
                value: n.to_string(),
            }),
        }
    }

    /// The network delay override, if any.
    pub fn network_delay(&self) -> ConfigResult<Option<Duration>> {
        match &self.network_delay {
            None => Ok(None),
            Some(text) => parse_interval(text).map(Some).ok_or_else(|| ConfigError::Invalid {
                field: "network_delay",
                value: text.clone(),
            }),
        }
    }

    pub fn policy(&self) -> ExecutionPolicy {
        ExecutionPolicy {
            failure: self.failure_policy,
            readiness: ReadinessPolicy {
                missing_inputs_satisfied: self.missing_inputs_satisfied,
                continue_on_failed_inputs: self.continue_on_failed_inputs,
            },
        }
    }

    /// Apply overrides to a freshly unpacked graph.
    pub fn apply_to(&self, graph: &mut Graph) -> ConfigResult<()> {
        if let Some(limit) = self.batch_limit()? {
            debug!(transition = graph.id(), batch_limit = limit, "overriding batch limit");
            graph.set_batch_limit(limit);
        }
        if let Some(delay) = self.network_delay()? {
            debug!(
                transition = graph.id(),
                network_delay_ms = delay.as_millis() as u64,
                "overriding network delay"
            );
            graph.set_network_delay(delay);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tgraph_core::GraphBuilder;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.policy(), ExecutionPolicy::default());
    }

    #[test]
    fn parse_full() {
        let config = EngineConfig::from_toml_str(
            r#"
batch_limit = 4
network_delay = "2s"
failure_policy = "continue"
continue_on_failed_inputs = true
missing_inputs_satisfied = false

[scores]
red = -100
green = 100
"#,
        )
        .unwrap();

        assert_eq!(config.batch_limit().unwrap(), Some(4));
        assert_eq!(config.network_delay().unwrap(), Some(Duration::from_secs(2)));
        assert_eq!(config.scores.red, -100);
        assert_eq!(config.scores.yellow, 0);

        let policy = config.policy();
        assert_eq!(policy.failure, FailurePolicy::Continue);
        assert!(policy.readiness.continue_on_failed_inputs);
        assert!(!policy.readiness.missing_inputs_satisfied);
    }

    #[test]
    fn rejects_non_positive_batch_limit() {
        let err = EngineConfig::from_toml_str("batch_limit = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "batch_limit", .. }));
        assert!(EngineConfig::from_toml_str("batch_limit = -3").is_err());
    }

    #[test]
    fn rejects_bad_delay_and_policy() {
        assert!(matches!(
            EngineConfig::from_toml_str(r#"network_delay = "soon""#),
            Err(ConfigError::Invalid { field: "network_delay", .. })
        ));
        assert!(matches!(
            EngineConfig::from_toml_str(r#"failure_policy = "retry""#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn overrides_graph_settings() {
        let mut graph = GraphBuilder::new(3)
            .batch_limit(10)
            .network_delay(Duration::from_secs(60))
            .build()
            .unwrap();
        let config = EngineConfig::from_toml_str("batch_limit = 2\nnetwork_delay = \"500ms\"").unwrap();
        config.apply_to(&mut graph).unwrap();
        assert_eq!(graph.batch_limit(), 2);
        assert_eq!(graph.network_delay(), Duration::from_millis(500));

        let untouched = EngineConfig::default();
        untouched.apply_to(&mut graph).unwrap();
        assert_eq!(graph.batch_limit(), 2);
    }

    #[test]
    fn toml_round_trip() {
        let config = EngineConfig {
            batch_limit: Some(8),
            failure_policy: FailurePolicy::Continue,
            ..Default::default()
        };
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("failure_policy = \"continue\""));
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::from_file(Path::new("/nonexistent/tgraph.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tgraph.toml"));
    }
}
