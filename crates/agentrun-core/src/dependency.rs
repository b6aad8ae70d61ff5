//! Dependency Manager — install/uninstall, whitelist enforcement, and the
//! pre-warmed cache (spec.md §4.4).
//!
//! "Already present" is always determined by asking the package installer
//! inside the container, never by in-process bookkeeping, so two
//! concurrent runs never double-install. Install/uninstall of the
//! installer itself is serialized behind a single mutex because it is a
//! process-global resource (spec.md §5) — the same mutex also guards a
//! per-package refcount, resolving spec.md §9's open question: a package
//! two concurrent runs both depend on is only physically uninstalled once
//! neither run needs it anymore.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::adapter::ContainerAdapter;
use crate::config::RunnerConfig;

pub struct DependencyManager {
    adapter: Arc<dyn ContainerAdapter>,
    cached: HashSet<String>,
    /// In-flight refcount per transient package name, guarded by the same
    /// lock used to serialize installer invocations.
    refcounts: Mutex<HashMap<String, usize>>,
}

impl DependencyManager {
    pub fn new(adapter: Arc<dyn ContainerAdapter>, cached_dependencies: &[String]) -> Self {
        Self {
            adapter,
            cached: cached_dependencies.iter().cloned().collect(),
            refcounts: Mutex::new(HashMap::new()),
        }
    }

    /// Install every `cached_dependencies` entry once, at construction
    /// time. Failures here are fatal to construction (spec.md §4.4).
    pub async fn warm_cache(&self) -> Result<(), String> {
        for dep in &self.cached {
            self.pip_install(dep)
                .await
                .map_err(|e| format!("failed to warm cached dependency {dep:?}: {e}"))?;
        }
        Ok(())
    }

    /// If `whitelist` is `["*"]`, always passes. Otherwise fails with the
    /// name of the first disallowed package.
    pub fn ensure_allowed(&self, deps: &HashSet<String>, config: &RunnerConfig) -> Result<(), String> {
        for dep in deps {
            if !config.is_whitelisted(dep) {
                return Err(dep.clone());
            }
        }
        Ok(())
    }

    /// Install every dep not already present (cached, or observed present
    /// by a concurrent in-flight run). Sequential per dep; on any failure,
    /// rolls back everything this call installed and returns the failing
    /// package name.
    ///
    /// Returns the full list of transient deps this call is now
    /// responsible for — pass it to `uninstall` on every exit path.
    pub async fn install(&self, deps: &HashSet<String>) -> Result<Vec<String>, String> {
        let mut guard = self.refcounts.lock().await;

        let mut responsible_for = Vec::new();
        let mut newly_installed = Vec::new();

        for dep in deps {
            if self.cached.contains(dep) {
                continue;
            }

            let count = guard.entry(dep.clone()).or_insert(0);
            if *count > 0 {
                *count += 1;
                responsible_for.push(dep.clone());
                continue;
            }

            match self.is_present(dep).await {
                Ok(true) => {
                    *count = 1;
                    responsible_for.push(dep.clone());
                }
                Ok(false) => match self.pip_install(dep).await {
                    Ok(()) => {
                        *count = 1;
                        newly_installed.push(dep.clone());
                        responsible_for.push(dep.clone());
                    }
                    Err(e) => {
                        tracing::error!(kind = "InstallFailed", phase = "INSTALL", dep, error = %e, "dependency install failed");
                        self.rollback(&mut guard, &newly_installed, &responsible_for).await;
                        return Err(e);
                    }
                },
                Err(e) => {
                    tracing::error!(kind = "InstallFailed", phase = "INSTALL", dep, error = %e, "failed to query dependency presence");
                    self.rollback(&mut guard, &newly_installed, &responsible_for).await;
                    return Err(e);
                }
            }
        }

        Ok(responsible_for)
    }

    async fn rollback(&self, guard: &mut HashMap<String, usize>, newly_installed: &[String], responsible_for: &[String]) {
        for dep in responsible_for {
            if let Some(count) = guard.get_mut(dep) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    guard.remove(dep);
                }
            }
        }
        for dep in newly_installed {
            if let Err(e) = self.pip_uninstall(dep).await {
                tracing::warn!(dep, error = %e, "rollback uninstall failed");
            }
        }
    }

    /// Best-effort removal: a failure on one package must not stop attempts
    /// on the rest. Skips any package listed in `cached_dependencies`.
    pub async fn uninstall(&self, deps: &[String]) {
        let mut guard = self.refcounts.lock().await;
        for dep in deps {
            if self.cached.contains(dep) {
                continue;
            }
            let Some(count) = guard.get_mut(dep) else { continue };
            *count = count.saturating_sub(1);
            if *count == 0 {
                guard.remove(dep);
                if let Err(e) = self.pip_uninstall(dep).await {
                    tracing::warn!(kind = "UninstallFailed", phase = "CLEANUP_DEPS", dep, error = %e, "best-effort uninstall failed");
                }
            }
        }
    }

    async fn is_present(&self, dep: &str) -> Result<bool, String> {
        let cmd = vec!["python3".to_string(), "-m".to_string(), "pip".to_string(), "show".to_string(), dep.to_string()];
        let result = self.adapter.exec(&cmd, None).await.map_err(|e| e.to_string())?;
        Ok(result.exit_code == 0)
    }

    async fn pip_install(&self, dep: &str) -> Result<(), String> {
        let cmd = vec![
            "python3".to_string(), "-m".to_string(), "pip".to_string(),
            "install".to_string(), "--quiet".to_string(), dep.to_string(),
        ];
        let result = self.adapter.exec(&cmd, None).await.map_err(|e| e.to_string())?;
        if result.exit_code == 0 {
            Ok(())
        } else {
            Err(result.stderr)
        }
    }

    async fn pip_uninstall(&self, dep: &str) -> Result<(), String> {
        let cmd = vec![
            "python3".to_string(), "-m".to_string(), "pip".to_string(),
            "uninstall".to_string(), "-y".to_string(), dep.to_string(),
        ];
        let result = self.adapter.exec(&cmd, None).await.map_err(|e| e.to_string())?;
        if result.exit_code == 0 {
            Ok(())
        } else {
            Err(result.stderr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::fake::FakeAdapter;
    use std::time::Duration;

    fn deps(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_ensure_allowed_star_permits_anything() {
        let adapter = Arc::new(FakeAdapter::new());
        let manager = DependencyManager::new(adapter, &[]);
        let config = RunnerConfig { container_name: "c".to_string(), ..RunnerConfig::default() };
        assert!(manager.ensure_allowed(&deps(&["requests"]), &config).is_ok());
    }

    #[tokio::test]
    async fn test_ensure_allowed_rejects_unlisted_package() {
        let adapter = Arc::new(FakeAdapter::new());
        let manager = DependencyManager::new(adapter, &[]);
        let mut config = RunnerConfig { container_name: "c".to_string(), ..RunnerConfig::default() };
        config.dependencies_whitelist = vec!["numpy".to_string()];
        assert_eq!(
            manager.ensure_allowed(&deps(&["requests"]), &config),
            Err("requests".to_string())
        );
    }

    #[tokio::test]
    async fn test_install_not_present_then_uninstall_round_trips() {
        let adapter = Arc::new(FakeAdapter::new());
        adapter
            .script_exec(
                "python3 -m pip show requests",
                crate::adapter::ExecResult { stdout: String::new(), stderr: String::new(), exit_code: 1 },
            )
            .await;
        let manager = DependencyManager::new(adapter.clone(), &[]);

        let installed = manager.install(&deps(&["requests"])).await.unwrap();
        assert_eq!(installed, vec!["requests".to_string()]);

        let calls = adapter.calls().await;
        assert!(calls.iter().any(|c| matches!(c, crate::adapter::fake::RecordedCall::Exec(cmd) if cmd.contains(&"install".to_string()))));

        manager.uninstall(&installed).await;
        let calls = adapter.calls().await;
        assert!(calls.iter().any(|c| matches!(c, crate::adapter::fake::RecordedCall::Exec(cmd) if cmd.contains(&"uninstall".to_string()))));
    }

    #[tokio::test]
    async fn test_cached_dependency_never_uninstalled() {
        let adapter = Arc::new(FakeAdapter::new());
        let manager = DependencyManager::new(adapter.clone(), &["numpy".to_string()]);
        manager.warm_cache().await.unwrap();

        // A run that imports the cached dep should not re-install or later uninstall it.
        let installed = manager.install(&deps(&["numpy"])).await.unwrap();
        assert!(installed.is_empty());
        manager.uninstall(&installed).await;

        let uninstall_calls = adapter
            .calls()
            .await
            .into_iter()
            .filter(|c| matches!(c, crate::adapter::fake::RecordedCall::Exec(cmd) if cmd.contains(&"uninstall".to_string())))
            .count();
        assert_eq!(uninstall_calls, 0);
    }

    #[tokio::test]
    async fn test_install_failure_rolls_back_and_returns_error() {
        let adapter = Arc::new(FakeAdapter::new());
        adapter
            .script_exec(
                "python3 -m pip show badpkg",
                crate::adapter::ExecResult { stdout: String::new(), stderr: String::new(), exit_code: 1 },
            )
            .await;
        adapter
            .script_exec(
                "python3 -m pip install --quiet badpkg",
                crate::adapter::ExecResult { stdout: String::new(), stderr: "no such package".to_string(), exit_code: 1 },
            )
            .await;

        let manager = DependencyManager::new(adapter, &[]);
        let result = manager.install(&deps(&["badpkg"])).await;
        assert_eq!(result, Err("no such package".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_installs_of_same_package_share_refcount_and_second_does_not_uninstall_early() {
        let adapter = Arc::new(FakeAdapter::new().with_exec_delay(Duration::from_millis(20)));
        let manager = Arc::new(DependencyManager::new(adapter, &[]));

        let m1 = manager.clone();
        let m2 = manager.clone();
        let (installed1, installed2) = tokio::join!(
            m1.install(&deps(&["requests"])),
            m2.install(&deps(&["requests"])),
        );
        let installed1 = installed1.unwrap();
        let installed2 = installed2.unwrap();

        // First caller finishes its run and uninstalls; second is still "in flight".
        manager.uninstall(&installed1).await;
        assert!(
            manager.refcounts.lock().await.get("requests").copied().unwrap_or(0) >= 1,
            "package should still be tracked as in-use by the second caller"
        );

        manager.uninstall(&installed2).await;
        assert!(manager.refcounts.lock().await.get("requests").is_none());
    }
}
