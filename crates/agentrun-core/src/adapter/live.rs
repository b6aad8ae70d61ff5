//! Live — `ContainerAdapter` backed by a real Docker daemon via `bollard`.

use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;

use bollard::body_full;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::query_parameters::{StatsOptions, UpdateContainerOptions};
use bollard::container::{LogOutput, UploadToContainerOptions};
use bollard::Docker;
use futures_util::StreamExt;

use super::{ContainerAdapter, ContainerStats, ExecResult};
use crate::error::AdapterError;

#[derive(Debug, Clone)]
pub struct BollardAdapter {
    client: Docker,
    container_name: String,
}

impl BollardAdapter {
    /// Connect to the Docker daemon at the default socket (or `DOCKER_HOST`)
    /// and target the already-running container `container_name`.
    pub fn new(container_name: &str) -> Result<Self, AdapterError> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| AdapterError::ContainerUnreachable(e.to_string()))?;
        Ok(Self {
            client,
            container_name: container_name.to_string(),
        })
    }

    fn map_bollard_err(&self, e: bollard::errors::Error) -> AdapterError {
        match e {
            bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                AdapterError::NotFound(self.container_name.clone())
            }
            other => AdapterError::ExecFailed(other.to_string()),
        }
    }

    async fn exec_inner(&self, cmd: &[String], workdir: Option<&str>) -> Result<ExecResult, AdapterError> {
        let config = CreateExecOptions {
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            cmd: Some(cmd.to_vec()),
            working_dir: workdir.map(|s| s.to_string()),
            ..Default::default()
        };

        let created = self
            .client
            .create_exec(&self.container_name, config)
            .await
            .map_err(|e| self.map_bollard_err(e))?;

        let start_result = self
            .client
            .start_exec(&created.id, Some(StartExecOptions { detach: false, ..Default::default() }))
            .await
            .map_err(|e| self.map_bollard_err(e))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = start_result {
            while let Some(chunk) = output.next().await {
                let chunk = chunk.map_err(|e| self.map_bollard_err(e))?;
                match chunk {
                    LogOutput::StdOut { message } => stdout.push_str(&String::from_utf8_lossy(&message)),
                    LogOutput::StdErr { message } => stderr.push_str(&String::from_utf8_lossy(&message)),
                    LogOutput::Console { message } => stdout.push_str(&String::from_utf8_lossy(&message)),
                    LogOutput::StdIn { .. } => {}
                }
            }
        }

        let inspected = self
            .client
            .inspect_exec(&created.id)
            .await
            .map_err(|e| self.map_bollard_err(e))?;

        let exit_code = inspected.exit_code.unwrap_or(-1);

        Ok(ExecResult { stdout, stderr, exit_code })
    }

    async fn copy_in_inner(&self, bytes: &[u8], dest_path: &str) -> Result<(), AdapterError> {
        let path = std::path::Path::new(dest_path);
        let dir = path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| "/".to_string());
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .ok_or_else(|| AdapterError::ExecFailed(format!("invalid destination path {dest_path:?}")))?;

        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header
            .set_path(&filename)
            .map_err(|e| AdapterError::ExecFailed(e.to_string()))?;
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append(&header, Cursor::new(bytes))
            .map_err(|e| AdapterError::ExecFailed(e.to_string()))?;
        let tar_bytes = builder
            .into_inner()
            .map_err(|e| AdapterError::ExecFailed(e.to_string()))?;

        let options = UploadToContainerOptions {
            path: dir,
            ..Default::default()
        };

        self.client
            .upload_to_container(&self.container_name, Some(options), body_full(tar_bytes.into()))
            .await
            .map_err(|e| self.map_bollard_err(e))
    }

    async fn remove_path_inner(&self, path: &str) -> Result<(), AdapterError> {
        let result = self
            .exec_inner(&["rm".to_string(), "-f".to_string(), path.to_string()], None)
            .await?;
        if result.exit_code != 0 {
            tracing::warn!(path, exit_code = result.exit_code, "rm -f reported nonzero exit, treating as already gone");
        }
        Ok(())
    }

    async fn reconfigure_inner(&self, cpu_quota: i64, memory_limit: u64, memswap_limit: u64) -> Result<(), AdapterError> {
        let options = UpdateContainerOptions {
            cpu_quota: Some(cpu_quota),
            cpu_period: Some(100_000),
            memory: Some(memory_limit as i64),
            memory_swap: Some(memswap_limit as i64),
            ..Default::default()
        };

        self.client
            .update_container(&self.container_name, options)
            .await
            .map_err(|e| self.map_bollard_err(e))?;
        Ok(())
    }

    async fn stats_inner(&self) -> Result<ContainerStats, AdapterError> {
        let options = Some(StatsOptions { stream: false, ..Default::default() });
        let mut stream = self.client.stats(&self.container_name, options);
        let sample = stream
            .next()
            .await
            .ok_or_else(|| AdapterError::ExecFailed("no stats sample returned".to_string()))?
            .map_err(|e| self.map_bollard_err(e))?;

        let cpu_usage_pct = compute_cpu_percent(&sample);
        let mem_used = sample.memory_stats.as_ref().and_then(|m| m.usage).unwrap_or(0);
        let mem_limit = sample.memory_stats.as_ref().and_then(|m| m.limit).unwrap_or(0);

        Ok(ContainerStats { cpu_usage_pct, mem_used, mem_limit })
    }
}

/// Docker CLI's own CPU% formula: delta of container CPU usage over delta
/// of system CPU usage, scaled by the number of online CPUs.
fn compute_cpu_percent(sample: &bollard::models::ContainerStatsResponse) -> f64 {
    let cpu = match &sample.cpu_stats {
        Some(c) => c,
        None => return 0.0,
    };
    let precpu = match &sample.precpu_stats {
        Some(c) => c,
        None => return 0.0,
    };

    let cpu_total = cpu.cpu_usage.as_ref().and_then(|u| u.total_usage).unwrap_or(0) as f64;
    let precpu_total = precpu.cpu_usage.as_ref().and_then(|u| u.total_usage).unwrap_or(0) as f64;
    let system_total = cpu.system_cpu_usage.unwrap_or(0) as f64;
    let presystem_total = precpu.system_cpu_usage.unwrap_or(0) as f64;
    let online_cpus = cpu.online_cpus.unwrap_or(1).max(1) as f64;

    let cpu_delta = cpu_total - precpu_total;
    let system_delta = system_total - presystem_total;

    if system_delta > 0.0 && cpu_delta > 0.0 {
        (cpu_delta / system_delta) * online_cpus * 100.0
    } else {
        0.0
    }
}

impl ContainerAdapter for BollardAdapter {
    fn exec<'a>(
        &'a self,
        cmd: &'a [String],
        workdir: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<ExecResult, AdapterError>> + Send + 'a>> {
        Box::pin(self.exec_inner(cmd, workdir))
    }

    fn copy_in<'a>(
        &'a self,
        bytes: &'a [u8],
        dest_path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AdapterError>> + Send + 'a>> {
        Box::pin(self.copy_in_inner(bytes, dest_path))
    }

    fn remove_path<'a>(
        &'a self,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AdapterError>> + Send + 'a>> {
        Box::pin(self.remove_path_inner(path))
    }

    fn reconfigure<'a>(
        &'a self,
        cpu_quota: i64,
        memory_limit: u64,
        memswap_limit: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), AdapterError>> + Send + 'a>> {
        Box::pin(self.reconfigure_inner(cpu_quota, memory_limit, memswap_limit))
    }

    fn stats(&self) -> Pin<Box<dyn Future<Output = Result<ContainerStats, AdapterError>> + Send + '_>> {
        Box::pin(self.stats_inner())
    }
}
