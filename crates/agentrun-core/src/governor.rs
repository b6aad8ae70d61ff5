//! Resource Governor — applies the configured CPU/memory ceilings to the
//! container and polls live utilization to decide whether there is
//! headroom for another run (spec.md §4.5).

use std::sync::Arc;

use crate::adapter::ContainerAdapter;
use crate::config::RunnerConfig;
use crate::error::AdapterError;

/// Reject admission once CPU utilization crosses this percentage...
const CPU_HEADROOM_CEILING_PCT: f64 = 80.0;
/// ...or once free memory drops below this many bytes of the configured limit.
const MEM_HEADROOM_FLOOR_BYTES: u64 = 50 * 1024 * 1024;

pub struct ResourceGovernor {
    adapter: Arc<dyn ContainerAdapter>,
    cpu_quota: i64,
    memory_limit: u64,
    memswap_limit: u64,
}

impl ResourceGovernor {
    pub fn new(adapter: Arc<dyn ContainerAdapter>, config: &RunnerConfig, memory_limit: u64, memswap_limit: u64) -> Self {
        Self {
            adapter,
            cpu_quota: config.cpu_quota,
            memory_limit,
            memswap_limit,
        }
    }

    /// Push the configured limits down to the container. Called once at
    /// construction; `cpu_period` is fixed at 100ms, matching the Docker
    /// CLI convention `cpu_quota / cpu_period = cpu share`.
    pub async fn apply(&self) -> Result<(), AdapterError> {
        self.adapter.reconfigure(self.cpu_quota, self.memory_limit, self.memswap_limit).await
    }

    /// True if live utilization leaves room to admit another run.
    /// Fails open: a stats read error is treated as "no headroom", since
    /// refusing an admission is always safer than over-subscribing.
    pub async fn has_headroom(&self) -> bool {
        match self.adapter.stats().await {
            Ok(stats) => {
                if stats.cpu_usage_pct > CPU_HEADROOM_CEILING_PCT {
                    return false;
                }
                let free = stats.mem_limit.saturating_sub(stats.mem_used);
                free >= MEM_HEADROOM_FLOOR_BYTES
            }
            Err(e) => {
                tracing::warn!(kind = "StatsUnavailable", error = %e, "failed to read container stats, refusing admission");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::fake::FakeAdapter;
    use crate::adapter::ContainerStats;

    fn config() -> RunnerConfig {
        RunnerConfig { container_name: "c".to_string(), ..RunnerConfig::default() }
    }

    #[tokio::test]
    async fn test_apply_reconfigures_with_configured_limits() {
        let adapter = Arc::new(FakeAdapter::new());
        let governor = ResourceGovernor::new(adapter.clone(), &config(), 104_857_600, 536_870_912);
        governor.apply().await.unwrap();

        let calls = adapter.calls().await;
        assert!(matches!(
            calls.as_slice(),
            [crate::adapter::fake::RecordedCall::Reconfigure { cpu_quota: 50_000, memory_limit: 104_857_600, memswap_limit: 536_870_912 }]
        ));
    }

    #[tokio::test]
    async fn test_has_headroom_true_when_utilization_low() {
        let adapter = Arc::new(FakeAdapter::new());
        adapter.set_stats(ContainerStats { cpu_usage_pct: 10.0, mem_used: 10 * 1024 * 1024, mem_limit: 100 * 1024 * 1024 }).await;
        let governor = ResourceGovernor::new(adapter, &config(), 104_857_600, 536_870_912);
        assert!(governor.has_headroom().await);
    }

    #[tokio::test]
    async fn test_has_headroom_false_above_cpu_ceiling() {
        let adapter = Arc::new(FakeAdapter::new());
        adapter.set_stats(ContainerStats { cpu_usage_pct: 95.0, mem_used: 0, mem_limit: 100 * 1024 * 1024 }).await;
        let governor = ResourceGovernor::new(adapter, &config(), 104_857_600, 536_870_912);
        assert!(!governor.has_headroom().await);
    }

    #[tokio::test]
    async fn test_has_headroom_false_near_memory_limit() {
        let adapter = Arc::new(FakeAdapter::new());
        adapter
            .set_stats(ContainerStats { cpu_usage_pct: 5.0, mem_used: 99 * 1024 * 1024, mem_limit: 100 * 1024 * 1024 })
            .await;
        let governor = ResourceGovernor::new(adapter, &config(), 104_857_600, 536_870_912);
        assert!(!governor.has_headroom().await);
    }
}
