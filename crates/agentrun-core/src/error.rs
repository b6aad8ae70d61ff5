//! Error taxonomy for the sandboxed execution pipeline.
//!
//! Mirrors spec.md §7: every recoverable failure is an enumerable variant
//! that the Orchestrator converts into an `Outcome` string. Only
//! `AdapterError::ContainerUnreachable` and config validation failures at
//! construction time are allowed to surface as `Result::Err` to the
//! embedding application.

use thiserror::Error;

/// Failure modes of the Container Control Adapter (spec.md §4.1).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("container unreachable: {0}")]
    ContainerUnreachable(String),
    #[error("command failed: {0}")]
    ExecFailed(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Failure modes of `RunnerConfig` construction/validation (spec.md §3).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("container_name must not be empty")]
    MissingContainerName,
    #[error("cpu_quota must be a positive integer, got {0}")]
    InvalidCpuQuota(i64),
    #[error("invalid size string {0:?}: {1}")]
    InvalidSize(String, String),
    #[error("memswap_limit ({memswap}) must be >= memory_limit ({memory})")]
    SwapBelowMemory { memory: u64, memswap: u64 },
    #[error("cached dependency {0:?} is not present in dependencies_whitelist")]
    CachedNotWhitelisted(String),
    #[error("failed to prepare container at construction: {0}")]
    ContainerSetupFailed(String),
}

/// Internal routing error used only within the Orchestrator before being
/// collapsed into an `Outcome` string. Never returned from the public API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunError {
    #[error("unsafe code: {0}")]
    UnsafeCode(String),
    #[error("dependency not in whitelist: {0}")]
    DependencyBlocked(String),
    #[error("container over capacity")]
    CapacityExhausted,
    #[error("failed to install dependencies")]
    InstallFailed,
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}
