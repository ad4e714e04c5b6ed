use std::{fs, num::NonZeroUsize, path::Path, thread};

use serde::Deserialize;

use crate::orchestra::ConfigErr;

/// The number of parallel execution units of this machine, the recommended
/// worker count when nothing else is running.
pub fn available_parallelism() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Settings of an `Orchestrator`'s worker pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluatorConfig {
    /// The amount of workers, `None` to use every available core.
    #[serde(default)]
    pub threads: Option<usize>,
}

impl EvaluatorConfig {
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads: Some(threads),
        }
    }

    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigErr> {
        serde_json::from_str(json).map_err(|e| ConfigErr::Source(e.to_string()))
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigErr> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| ConfigErr::Source(format!("{}: {e}", path.display())))?;

        Self::from_json(&json)
    }

    /// The worker count to use. Zero is passed through so the orchestrator
    /// can reject it.
    pub fn resolved_threads(&self) -> usize {
        self.threads.unwrap_or_else(available_parallelism)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_threads() {
        let config = EvaluatorConfig::from_json(r#"{ "threads": 3 }"#).unwrap();
        assert_eq!(config, EvaluatorConfig::with_threads(3));
        assert_eq!(config.resolved_threads(), 3);
    }

    #[test]
    fn missing_threads_falls_back_to_available_cores() {
        let config = EvaluatorConfig::from_json("{}").unwrap();
        assert_eq!(config.threads, None);
        assert_eq!(config.resolved_threads(), available_parallelism());
        assert!(config.resolved_threads() >= 1);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            EvaluatorConfig::from_json(r#"{ "threads": "many" }"#),
            Err(ConfigErr::Source(_))
        ));
        assert!(matches!(
            EvaluatorConfig::from_json(r#"{ "workers": 2 }"#),
            Err(ConfigErr::Source(_))
        ));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = EvaluatorConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
