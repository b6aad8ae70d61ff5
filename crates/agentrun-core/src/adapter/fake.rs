//! Fake — in-memory test double for `ContainerAdapter`.
//!
//! Records every call made to it (for the screener side-effect-freedom and
//! install-serialization invariants in spec.md §8) and lets tests script
//! canned responses for `exec`. Grounded on the teacher's `FakeDocker`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::Mutex;

use super::{ContainerAdapter, ContainerStats, ExecResult};
use crate::error::AdapterError;

/// One recorded call, in the order it was made.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Exec(Vec<String>),
    CopyIn(String),
    RemovePath(String),
    Reconfigure { cpu_quota: i64, memory_limit: u64, memswap_limit: u64 },
    Stats,
}

#[derive(Default)]
struct Inner {
    calls: Vec<RecordedCall>,
    /// Scripted exec responses keyed by the full command line joined with
    /// a space; falls back to `default_exec` when no match is found.
    exec_responses: HashMap<String, ExecResult>,
    files: HashMap<String, Vec<u8>>,
    stats: ContainerStats,
}

pub struct FakeAdapter {
    inner: Mutex<Inner>,
    default_exec: ExecResult,
    default_exec_override: Mutex<Option<ExecResult>>,
    /// Artificial delay applied to every `exec`, used by concurrency tests
    /// to widen the window in which overlapping calls would be observed.
    exec_delay: Duration,
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                stats: ContainerStats { cpu_usage_pct: 0.0, mem_used: 0, mem_limit: u64::MAX },
                ..Inner::default()
            }),
            default_exec: ExecResult { stdout: String::new(), stderr: String::new(), exit_code: 0 },
            default_exec_override: Mutex::new(None),
            exec_delay: Duration::ZERO,
        }
    }

    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = delay;
        self
    }

    /// Script the response for an exact command line (joined with spaces).
    pub async fn script_exec(&self, cmd_line: &str, result: ExecResult) {
        self.inner.lock().await.exec_responses.insert(cmd_line.to_string(), result);
    }

    pub async fn set_stats(&self, stats: ContainerStats) {
        self.inner.lock().await.stats = stats;
    }

    /// Override the response returned for any `exec` call with no matching
    /// scripted response, instead of the zero-exit/empty-output default.
    pub async fn set_default_exec(&self, result: ExecResult) {
        self.default_exec_override.lock().await.replace(result);
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.inner.lock().await.calls.len()
    }

    pub async fn file_exists(&self, path: &str) -> bool {
        self.inner.lock().await.files.contains_key(path)
    }
}

impl Default for FakeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerAdapter for FakeAdapter {
    fn exec<'a>(
        &'a self,
        cmd: &'a [String],
        _workdir: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<ExecResult, AdapterError>> + Send + 'a>> {
        Box::pin(async move {
            if !self.exec_delay.is_zero() {
                tokio::time::sleep(self.exec_delay).await;
            }
            let mut inner = self.inner.lock().await;
            inner.calls.push(RecordedCall::Exec(cmd.to_vec()));
            let key = cmd.join(" ");
            if let Some(scripted) = inner.exec_responses.get(&key).cloned() {
                return Ok(scripted);
            }
            drop(inner);
            let fallback = self.default_exec_override.lock().await.clone().unwrap_or_else(|| self.default_exec.clone());
            Ok(fallback)
        })
    }

    fn copy_in<'a>(
        &'a self,
        bytes: &'a [u8],
        dest_path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AdapterError>> + Send + 'a>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            inner.calls.push(RecordedCall::CopyIn(dest_path.to_string()));
            inner.files.insert(dest_path.to_string(), bytes.to_vec());
            Ok(())
        })
    }

    fn remove_path<'a>(
        &'a self,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AdapterError>> + Send + 'a>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            inner.calls.push(RecordedCall::RemovePath(path.to_string()));
            inner.files.remove(path);
            Ok(())
        })
    }

    fn reconfigure<'a>(
        &'a self,
        cpu_quota: i64,
        memory_limit: u64,
        memswap_limit: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), AdapterError>> + Send + 'a>> {
        Box::pin(async move {
            self.inner.lock().await.calls.push(RecordedCall::Reconfigure {
                cpu_quota,
                memory_limit,
                memswap_limit,
            });
            Ok(())
        })
    }

    fn stats(&self) -> Pin<Box<dyn Future<Output = Result<ContainerStats, AdapterError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            inner.calls.push(RecordedCall::Stats);
            Ok(inner.stats)
        })
    }
}
