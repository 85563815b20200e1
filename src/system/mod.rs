// System Monitoring Module
// Memory checks run before each ensemble member is instantiated

use anyhow::{bail, Result};
use sysinfo::{Pid, System};
use tracing::{info, warn};

const GB: u64 = 1024 * 1024 * 1024;
const MB: u64 = 1024 * 1024;

/// Checked by the orchestrator before every model instantiation
pub trait ResourceGuard {
    fn check_before_model(&self, model_label: &str) -> Result<()>;
}

pub struct SystemMonitor {
    system: System,
}

#[derive(Debug, Clone)]
pub struct MemoryStats {
    pub total_memory_gb: f64,
    pub available_memory_gb: f64,
    pub used_memory_gb: f64,
    pub memory_usage_pct: f64,
}

impl SystemMonitor {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Refresh and return memory stats
    pub fn memory_stats(&mut self) -> MemoryStats {
        self.system.refresh_memory();

        let total_memory = self.system.total_memory();
        let available_memory = self.system.available_memory();
        let used_memory = self.system.used_memory();

        MemoryStats {
            total_memory_gb: total_memory as f64 / GB as f64,
            available_memory_gb: available_memory as f64 / GB as f64,
            used_memory_gb: used_memory as f64 / GB as f64,
            memory_usage_pct: if total_memory > 0 {
                (used_memory as f64 / total_memory as f64) * 100.0
            } else {
                0.0
            },
        }
    }

    /// Fail when less than `min_free_gb` is available for the next model
    pub fn check_memory_before_model_load(&mut self, model_label: &str, min_free_gb: f64) -> Result<MemoryStats> {
        let stats = self.memory_stats();

        if stats.available_memory_gb < min_free_gb {
            warn!(
                model = model_label,
                available_gb = stats.available_memory_gb,
                required_gb = min_free_gb,
                "Insufficient memory for next model"
            );
            bail!(
                "Insufficient memory to load model '{}': {:.2} GB available, {:.2} GB required",
                model_label,
                stats.available_memory_gb,
                min_free_gb
            );
        }

        Ok(stats)
    }

    /// Get current process memory usage in GB
    pub fn get_process_memory_usage(&mut self) -> Result<f64> {
        self.system.refresh_processes();

        let pid = std::process::id();

        if let Some(process) = self.system.process(Pid::from_u32(pid)) {
            let memory_mb = process.memory() / MB;
            Ok(memory_mb as f64 / 1024.0)
        } else {
            bail!("Failed to get current process info")
        }
    }

    /// Get detailed system stats for logging
    pub fn get_system_stats(&mut self) -> Result<serde_json::Value> {
        let memory_stats = self.memory_stats();
        let process_memory_gb = self.get_process_memory_usage()?;
        self.system.refresh_cpu();

        Ok(serde_json::json!({
            "timestamp": chrono::Utc::now(),
            "memory": {
                "total_gb": memory_stats.total_memory_gb,
                "available_gb": memory_stats.available_memory_gb,
                "used_gb": memory_stats.used_memory_gb,
                "usage_pct": memory_stats.memory_usage_pct,
            },
            "process_memory_gb": process_memory_gb,
            "cpu_count": self.system.cpus().len(),
        }))
    }

    /// Log system stats, typically after each frequency group
    pub fn log_memory_stats(&mut self) -> Result<()> {
        let stats = self.get_system_stats()?;
        info!("System stats: {}", serde_json::to_string_pretty(&stats)?);
        Ok(())
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that refuses to start a model below a free-memory threshold
#[derive(Debug, Clone)]
pub struct MemoryGuard {
    pub min_free_gb: f64,
}

impl MemoryGuard {
    pub fn new(min_free_gb: f64) -> Self {
        Self { min_free_gb }
    }
}

impl ResourceGuard for MemoryGuard {
    fn check_before_model(&self, model_label: &str) -> Result<()> {
        let mut monitor = SystemMonitor::new();
        monitor.check_memory_before_model_load(model_label, self.min_free_gb)?;
        Ok(())
    }
}
