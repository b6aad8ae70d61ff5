//! Orchestrator — the public `execute` pipeline and its state machine
//! (spec.md §4.7). Screens, checks the whitelist, waits for capacity,
//! installs dependencies, runs the snippet, and always cleans up,
//! regardless of which step failed.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::adapter::ContainerAdapter;
use crate::config::RunnerConfig;
use crate::dependency::DependencyManager;
use crate::error::{AdapterError, RunError};
use crate::executor::Executor;
use crate::governor::ResourceGovernor;
use crate::imports::extract_imports;
use crate::screener::{self, Verdict};
use crate::snippet::Snippet;

const CAPACITY_POLL_INTERVAL: Duration = Duration::from_secs(1);
const CAPACITY_POLL_MAX_WAIT: Duration = Duration::from_secs(30);

pub struct Orchestrator {
    config: RunnerConfig,
    dependency_manager: DependencyManager,
    governor: ResourceGovernor,
    executor: Executor,
    capacity_poll_interval: Duration,
    capacity_poll_max_wait: Duration,
}

impl Orchestrator {
    pub fn new(adapter: Arc<dyn ContainerAdapter>, config: RunnerConfig, memory_limit: u64, memswap_limit: u64) -> Self {
        Self {
            dependency_manager: DependencyManager::new(adapter.clone(), &config.cached_dependencies),
            governor: ResourceGovernor::new(adapter.clone(), &config, memory_limit, memswap_limit),
            executor: Executor::new(adapter),
            config,
            capacity_poll_interval: CAPACITY_POLL_INTERVAL,
            capacity_poll_max_wait: CAPACITY_POLL_MAX_WAIT,
        }
    }

    /// Shrink the capacity-wait polling cadence for tests; production
    /// always uses the spec's 1s/30s cadence.
    #[cfg(test)]
    pub fn with_capacity_poll(mut self, interval: Duration, max_wait: Duration) -> Self {
        self.capacity_poll_interval = interval;
        self.capacity_poll_max_wait = max_wait;
        self
    }

    /// Install every `cached_dependencies` entry. Called once at
    /// `AgentRun` construction; failure is fatal (spec.md §9).
    pub async fn warm_cache(&self) -> Result<(), String> {
        self.dependency_manager.warm_cache().await
    }

    /// Push the configured CPU/memory/swap limits to the container.
    /// Called once at `AgentRun` construction.
    pub async fn apply_limits(&self) -> Result<(), AdapterError> {
        self.governor.apply().await
    }

    /// The public pipeline. Every outcome short of a dead container is
    /// folded into the returned Outcome string; `ContainerUnreachable` is
    /// the one case spec.md §7 allows to bubble up as a real `Err`, so it
    /// propagates here instead of being formatted into the Outcome.
    pub async fn execute(&self, source: &str) -> Result<String, AdapterError> {
        match self.run(source).await {
            Ok(outcome) => Ok(outcome),
            Err(RunError::UnsafeCode(reason)) => Ok(reason),
            Err(RunError::DependencyBlocked(pkg)) => Ok(format!("Dependency not in whitelist: {pkg}")),
            Err(RunError::CapacityExhausted) => Ok("Container over capacity".to_string()),
            Err(RunError::InstallFailed) => Ok("Failed to install dependencies".to_string()),
            Err(RunError::Adapter(e)) => {
                tracing::error!(kind = "ContainerUnreachable", error = %e, "adapter failure surfaced to caller");
                Err(e)
            }
        }
    }

    async fn run(&self, source: &str) -> Result<String, RunError> {
        // 1. SCREEN
        if let Verdict::Unsafe(reason) = screener::screen(source) {
            tracing::warn!(kind = "UnsafeCode", phase = "SCREEN", reason = %reason, "rejected unsafe snippet");
            return Err(RunError::UnsafeCode(reason));
        }

        // 2. deps := ImportExtractor.extract(source)
        let imports = extract_imports(source);

        // 3. DEPS_CHECK
        if let Err(pkg) = self.dependency_manager.ensure_allowed(&imports, &self.config) {
            tracing::warn!(kind = "DependencyBlocked", phase = "DEPS_CHECK", pkg = %pkg, "blocked dependency");
            return Err(RunError::DependencyBlocked(pkg));
        }

        // 4. WAIT_CAPACITY
        self.wait_for_capacity().await?;

        // 5. INSTALL
        let installed = match self.dependency_manager.install(&imports).await {
            Ok(installed) => installed,
            Err(e) => {
                tracing::error!(kind = "InstallFailed", phase = "INSTALL", transient_deps = ?imports, error = %e, "dependency install failed");
                return Err(RunError::InstallFailed);
            }
        };

        // 6. EXECUTE (Executor guarantees file cleanup on every path)
        let snippet = Snippet::new(source.to_string(), imports);
        let run_result = self.executor.run(&snippet, Duration::from_secs(self.config.default_timeout_secs)).await;

        // 7. CLEANUP_DEPS — runs regardless of whether step 6 succeeded.
        self.dependency_manager.uninstall(&installed).await;

        // 8. Return outcome, or surface a fatal adapter error.
        run_result.map_err(|e| {
            tracing::error!(kind = "ContainerUnreachable", phase = "EXECUTE", transient_deps = ?installed, error = %e, "adapter error during execution");
            RunError::Adapter(e)
        })
    }

    async fn wait_for_capacity(&self) -> Result<(), RunError> {
        let deadline = Instant::now() + self.capacity_poll_max_wait;
        loop {
            if self.governor.has_headroom().await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                tracing::warn!(kind = "CapacityExhausted", phase = "WAIT_CAPACITY", "gave up waiting for container capacity");
                return Err(RunError::CapacityExhausted);
            }
            tokio::time::sleep(self.capacity_poll_interval).await;
        }
    }
}
