//! Executor — copies a screened snippet into the container, runs it under
//! a wall-clock timeout, and normalizes the result (spec.md §4.6).

use std::sync::Arc;
use std::time::Duration;

use crate::adapter::ContainerAdapter;
use crate::error::AdapterError;
use crate::snippet::Snippet;

pub const TIMEOUT_OUTCOME: &str = "Execution timed out";

pub struct Executor {
    adapter: Arc<dyn ContainerAdapter>,
}

impl Executor {
    pub fn new(adapter: Arc<dyn ContainerAdapter>) -> Self {
        Self { adapter }
    }

    /// Copy `snippet` in, run it, and return its Outcome. The source file
    /// is removed on every path out of this function, including the
    /// timeout and adapter-error paths.
    pub async fn run(&self, snippet: &Snippet, timeout: Duration) -> Result<String, AdapterError> {
        self.adapter.copy_in(snippet.source.as_bytes(), &snippet.path).await?;

        let result = self.run_inner(snippet, timeout).await;

        if let Err(e) = self.adapter.remove_path(&snippet.path).await {
            tracing::warn!(kind = "CleanupFailed", phase = "CLEANUP_FILE", path = %snippet.path, error = %e, "failed to remove snippet file");
        }

        result
    }

    async fn run_inner(&self, snippet: &Snippet, timeout: Duration) -> Result<String, AdapterError> {
        let cmd = vec!["python3".to_string(), snippet.path.clone()];

        match tokio::time::timeout(timeout, self.adapter.exec(&cmd, None)).await {
            Ok(Ok(result)) if result.exit_code == 0 => Ok(result.stdout),
            Ok(Ok(result)) => Ok(result.stderr),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => {
                let kill_cmd = vec!["pkill".to_string(), "-f".to_string(), snippet.path.clone()];
                if let Err(e) = self.adapter.exec(&kill_cmd, None).await {
                    tracing::warn!(kind = "KillFailed", phase = "EXECUTE", path = %snippet.path, error = %e, "failed to kill timed-out process");
                }
                Ok(TIMEOUT_OUTCOME.to_string())
            }
        }
    }
}
