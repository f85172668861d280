use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FluxError, Result};

/// Top-level configuration, loaded from `fluxsolver.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Seed a run for every autostart flow when a session opens.
    #[serde(default = "default_true")]
    pub autostart: bool,
    /// Upper bound on follow-up rounds fed by facts that node actions wrote
    /// during one propagation cycle.
    #[serde(default = "default_max_propagation_rounds")]
    pub max_propagation_rounds: usize,
    /// Buffer size of the flow event bus.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            autostart: true,
            max_propagation_rounds: default_max_propagation_rounds(),
            event_capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Reject flow sets whose composed nodes call a missing flow or start node.
    /// When disabled the defect is logged and the call-site does nothing.
    #[serde(default = "default_true")]
    pub check_consistency: bool,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            check_consistency: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            with_target: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_propagation_rounds() -> usize {
    64
}

fn default_event_capacity() -> usize {
    256
}

fn default_log_filter() -> String {
    "fluxsolver=info,flux_engine=info,warn".to_string()
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| FluxError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| FluxError::Config(e.to_string()))
    }

    /// Render the effective configuration back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| FluxError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' || chars.peek() != Some(&'{') {
            result.push(c);
            continue;
        }
        chars.next();
        let name: String = chars.by_ref().take_while(|c| *c != '}').collect();
        match std::env::var(&name) {
            Ok(val) => result.push_str(&val),
            // Unset variables stay verbatim so the parse error points at them
            Err(_) => result.push_str(&format!("${{{}}}", name)),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_FLUX_FILTER", "debug");
        let result = expand_env_vars("filter = \"${TEST_FLUX_FILTER}\"");
        assert_eq!(result, "filter = \"debug\"");
        std::env::remove_var("TEST_FLUX_FILTER");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("filter = \"${NONEXISTENT_FLUX_VAR}\"");
        assert_eq!(result, "filter = \"${NONEXISTENT_FLUX_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.solver.autostart);
        assert_eq!(config.solver.max_propagation_rounds, 64);
        assert_eq!(config.solver.event_capacity, 256);
        assert!(config.knowledge.check_consistency);
        assert!(!config.log.with_target);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
[solver]
autostart = false
"#,
        )
        .unwrap();
        assert!(!config.solver.autostart);
        assert_eq!(config.solver.max_propagation_rounds, 64);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let rendered = AppConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[solver]"));
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.log.filter, default_log_filter());
    }
}
