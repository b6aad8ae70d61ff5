//! `ContainerAdapter` — capability interface over the container runtime.
//!
//! Every domain module (Dependency Manager, Governor, Executor) accesses
//! the container exclusively through this trait. `live.rs` provides the
//! real Bollard-backed implementation; `fake.rs` provides a test double.
//! Object-safe thanks to `Pin<Box<…>>` returns, mirroring the teacher's
//! `DockerOps` trait.

pub mod fake;
pub mod live;

use std::future::Future;
use std::pin::Pin;

use crate::error::AdapterError;

/// Outcome of a single synchronous command run inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

/// Live utilization snapshot, read by the Resource Governor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerStats {
    pub cpu_usage_pct: f64,
    pub mem_used: u64,
    pub mem_limit: u64,
}

/// Unified async interface over the container runtime (spec.md §4.1).
///
/// `Send + Sync` so implementations can live inside `Arc<dyn ContainerAdapter>`
/// shared across concurrently executing requests.
pub trait ContainerAdapter: Send + Sync {
    /// Run `cmd` synchronously inside the container, optionally in `workdir`.
    fn exec<'a>(
        &'a self,
        cmd: &'a [String],
        workdir: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<ExecResult, AdapterError>> + Send + 'a>>;

    /// Atomically place `bytes` at `dest_path` inside the container.
    fn copy_in<'a>(
        &'a self,
        bytes: &'a [u8],
        dest_path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AdapterError>> + Send + 'a>>;

    /// Delete a file inside the container. A missing file is not an error.
    fn remove_path<'a>(
        &'a self,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AdapterError>> + Send + 'a>>;

    /// Apply CPU/memory/swap limits to the running container.
    fn reconfigure<'a>(
        &'a self,
        cpu_quota: i64,
        memory_limit: u64,
        memswap_limit: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), AdapterError>> + Send + 'a>>;

    /// Read current utilization.
    fn stats(&self) -> Pin<Box<dyn Future<Output = Result<ContainerStats, AdapterError>> + Send + '_>>;
}
