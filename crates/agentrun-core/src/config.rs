//! `RunnerConfig` — enumerated options recognized by the pipeline (spec.md §3).
//!
//! Loaded from a TOML file or environment variables, file-then-env-override
//! precedence, following the teacher's `AgentConfig::load()` design.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    pub container_name: String,
    pub cpu_quota: i64,
    pub default_timeout_secs: u64,
    pub memory_limit: String,
    pub memswap_limit: String,
    pub dependencies_whitelist: Vec<String>,
    pub cached_dependencies: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            container_name: String::new(),
            cpu_quota: 50_000,
            default_timeout_secs: 20,
            memory_limit: "100m".to_string(),
            memswap_limit: "512m".to_string(),
            dependencies_whitelist: vec!["*".to_string()],
            cached_dependencies: Vec::new(),
        }
    }
}

impl RunnerConfig {
    /// Load from file (`AGENTRUN_CONFIG_FILE`, default
    /// `/etc/agentrun/runner.toml`) if present, else from environment
    /// variables, then apply environment overrides over the result.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("AGENTRUN_CONFIG_FILE")
            .unwrap_or_else(|_| "/etc/agentrun/runner.toml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            tracing::info!(path = %config_path, "loading RunnerConfig from file");
            Self::from_file(&config_path)
        } else {
            tracing::info!("config file not found, loading RunnerConfig from environment");
            Self::from_env()
        };

        if let Ok(name) = std::env::var("AGENTRUN_CONTAINER_NAME") {
            config.container_name = name;
        }
        if let Ok(quota) = std::env::var("AGENTRUN_CPU_QUOTA") {
            if let Ok(quota) = quota.parse() {
                config.cpu_quota = quota;
            }
        }
        if let Ok(timeout) = std::env::var("AGENTRUN_DEFAULT_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse() {
                config.default_timeout_secs = timeout;
            }
        }
        if let Ok(mem) = std::env::var("AGENTRUN_MEMORY_LIMIT") {
            config.memory_limit = mem;
        }
        if let Ok(swap) = std::env::var("AGENTRUN_MEMSWAP_LIMIT") {
            config.memswap_limit = swap;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Self {
        let contents = std::fs::read_to_string(path).unwrap_or_default();
        toml::from_str(&contents).unwrap_or_default()
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(name) = std::env::var("AGENTRUN_CONTAINER_NAME") {
            config.container_name = name;
        }
        config
    }

    /// Validate all invariants from spec.md §3. Returns the parsed byte
    /// ceilings so callers don't have to re-parse.
    pub fn validate(&self) -> Result<(u64, u64), ConfigError> {
        if self.container_name.trim().is_empty() {
            return Err(ConfigError::MissingContainerName);
        }
        if self.cpu_quota <= 0 {
            return Err(ConfigError::InvalidCpuQuota(self.cpu_quota));
        }

        let memory = parse_size(&self.memory_limit)
            .map_err(|e| ConfigError::InvalidSize(self.memory_limit.clone(), e))?;
        let memswap = parse_size(&self.memswap_limit)
            .map_err(|e| ConfigError::InvalidSize(self.memswap_limit.clone(), e))?;

        if memswap < memory {
            return Err(ConfigError::SwapBelowMemory { memory, memswap });
        }

        if !self.dependencies_whitelist.iter().any(|w| w == "*") {
            for cached in &self.cached_dependencies {
                if !self.dependencies_whitelist.contains(cached) {
                    return Err(ConfigError::CachedNotWhitelisted(cached.clone()));
                }
            }
        }

        Ok((memory, memswap))
    }

    /// True if `pkg` is permitted by `dependencies_whitelist`.
    pub fn is_whitelisted(&self, pkg: &str) -> bool {
        self.dependencies_whitelist.iter().any(|w| w == "*" || w == pkg)
    }
}

/// Parse a size string `<integer><unit>` where unit is one of
/// `b|k|m|g` (case-insensitive), SI-like powers of 1024 (spec.md §6).
pub fn parse_size(raw: &str) -> Result<u64, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty size string".to_string());
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "b" => 1u64,
        "k" => 1024,
        "m" => 1024 * 1024,
        "g" => 1024 * 1024 * 1024,
        other => return Err(format!("unrecognized unit {other:?}, expected one of b|k|m|g")),
    };
    let digits: u64 = digits
        .parse()
        .map_err(|_| format!("{digits:?} is not a valid integer"))?;
    digits
        .checked_mul(multiplier)
        .ok_or_else(|| "size overflows u64".to_string())
}

/// Format a byte count back into a size string, choosing the largest unit
/// that divides evenly (used for round-trip tests and display).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [(u64, &str); 4] = [
        (1024 * 1024 * 1024, "g"),
        (1024 * 1024, "m"),
        (1024, "k"),
        (1, "b"),
    ];
    for (scale, suffix) in UNITS {
        if bytes % scale == 0 {
            return format!("{}{}", bytes / scale, suffix);
        }
    }
    format!("{bytes}b")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> RunnerConfig {
        RunnerConfig {
            container_name: "sandbox-1".to_string(),
            ..RunnerConfig::default()
        }
    }

    #[test]
    fn test_parse_size_m() {
        assert_eq!(parse_size("100m").unwrap(), 104_857_600);
    }

    #[test]
    fn test_parse_size_units_case_insensitive() {
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("512B").unwrap(), 512);
    }

    #[test]
    fn test_parse_size_rejects_missing_unit() {
        assert!(parse_size("100").is_err());
    }

    #[test]
    fn test_parse_size_rejects_unknown_unit() {
        assert!(parse_size("100x").is_err());
    }

    #[test]
    fn test_round_trip_format_then_parse() {
        for n in [1u64, 1024, 1024 * 1024, 104_857_600, 512 * 1024 * 1024] {
            let formatted = format_size(n);
            assert_eq!(parse_size(&formatted).unwrap(), n, "round trip failed for {n}");
        }
    }

    #[test]
    fn test_validate_rejects_empty_container_name() {
        let mut config = valid_config();
        config.container_name = String::new();
        assert_eq!(config.validate(), Err(ConfigError::MissingContainerName));
    }

    #[test]
    fn test_validate_rejects_nonpositive_cpu_quota() {
        let mut config = valid_config();
        config.cpu_quota = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidCpuQuota(0)));
    }

    #[test]
    fn test_validate_rejects_memswap_below_memory() {
        let mut config = valid_config();
        config.memory_limit = "512m".to_string();
        config.memswap_limit = "100m".to_string();
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::SwapBelowMemory { .. })));
    }

    #[test]
    fn test_validate_ok_with_defaults() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_cached_dependency_outside_whitelist() {
        let mut config = valid_config();
        config.dependencies_whitelist = vec!["requests".to_string()];
        config.cached_dependencies = vec!["numpy".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CachedNotWhitelisted(_))
        ));
    }

    #[test]
    fn test_validate_allows_cached_dependency_under_star() {
        let mut config = valid_config();
        config.dependencies_whitelist = vec!["*".to_string()];
        config.cached_dependencies = vec!["numpy".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_is_whitelisted_star_permits_anything() {
        let config = valid_config();
        assert!(config.is_whitelisted("anything"));
    }

    #[test]
    fn test_is_whitelisted_empty_forbids_all() {
        let mut config = valid_config();
        config.dependencies_whitelist = vec![];
        assert!(!config.is_whitelisted("requests"));
    }
}
