//! AgentRun — sandboxed code-execution pipeline.
//!
//! Accepts an untrusted source snippet, runs it inside an already-running
//! isolation container, and returns its stdout or a faithful error trace.
//! See each submodule for the stage of the pipeline it implements.

pub mod adapter;
pub mod config;
pub mod dependency;
pub mod error;
pub mod executor;
pub mod governor;
pub mod imports;
pub mod orchestrator;
pub mod screener;
pub mod snippet;
pub mod stdlib;

use std::sync::Arc;

pub use adapter::{ContainerAdapter, ContainerStats, ExecResult};
pub use config::RunnerConfig;
pub use error::{AdapterError, ConfigError};

use orchestrator::Orchestrator;

/// The library's single entry point. Construction validates `RunnerConfig`,
/// applies its resource limits, and warms the dependency cache — all
/// fallible, all one-shot (spec.md §9).
pub struct AgentRun {
    orchestrator: Orchestrator,
}

impl AgentRun {
    pub async fn new(config: RunnerConfig, adapter: Arc<dyn ContainerAdapter>) -> Result<Self, ConfigError> {
        let (memory_limit, memswap_limit) = config.validate()?;

        let orchestrator = Orchestrator::new(adapter, config, memory_limit, memswap_limit);

        orchestrator
            .apply_limits()
            .await
            .map_err(|e| ConfigError::ContainerSetupFailed(format!("failed to apply resource limits: {e}")))?;

        orchestrator
            .warm_cache()
            .await
            .map_err(ConfigError::ContainerSetupFailed)?;

        Ok(Self { orchestrator })
    }

    /// Run `source` to completion and return its Outcome (spec.md §4.7).
    /// Returns `Err` only for the fatal `ContainerUnreachable` case spec.md
    /// §7 allows to bubble up to the embedding application; every other
    /// failure kind is folded into the `Ok` Outcome string.
    pub async fn execute(&self, source: &str) -> Result<String, AdapterError> {
        self.orchestrator.execute(source).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapter::fake::FakeAdapter;

    fn config() -> RunnerConfig {
        RunnerConfig { container_name: "sandbox-1".to_string(), ..RunnerConfig::default() }
    }

    #[tokio::test]
    async fn test_new_fails_on_invalid_config() {
        let adapter: Arc<dyn ContainerAdapter> = Arc::new(FakeAdapter::new());
        let mut cfg = config();
        cfg.container_name = String::new();
        let result = AgentRun::new(cfg, adapter).await;
        assert_eq!(result.err(), Some(ConfigError::MissingContainerName));
    }

    #[tokio::test]
    async fn test_new_fails_when_memswap_below_memory() {
        let adapter: Arc<dyn ContainerAdapter> = Arc::new(FakeAdapter::new());
        let mut cfg = config();
        cfg.memory_limit = "512m".to_string();
        cfg.memswap_limit = "100m".to_string();
        let result = AgentRun::new(cfg, adapter).await;
        assert!(matches!(result, Err(ConfigError::SwapBelowMemory { .. })));
    }

    #[tokio::test]
    async fn test_construction_applies_limits_and_warms_cache() {
        let fake = Arc::new(FakeAdapter::new());
        let mut cfg = config();
        cfg.cached_dependencies = vec!["numpy".to_string()];
        let adapter: Arc<dyn ContainerAdapter> = fake.clone();
        AgentRun::new(cfg, adapter).await.unwrap();

        let calls = fake.calls().await;
        assert!(calls.iter().any(|c| matches!(c, adapter::fake::RecordedCall::Reconfigure { .. })));
        assert!(calls.iter().any(|c| matches!(c, adapter::fake::RecordedCall::Exec(cmd) if cmd.contains(&"install".to_string()))));
    }

    #[tokio::test]
    async fn test_execute_round_trips_through_the_public_api() {
        let adapter: Arc<dyn ContainerAdapter> = Arc::new(FakeAdapter::new());
        let agent = AgentRun::new(config(), adapter).await.unwrap();
        let outcome = agent.execute("print('hello, world!')\n").await.unwrap();
        assert_eq!(outcome, "");
    }
}
