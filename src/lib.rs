//! Service wiring for LLM Deploy
//!
//! This module builds the lifecycle manager and its backend from the loaded
//! configuration and runs the HTTP API. It also renders the host report
//! printed by the `memory-check` command.

use std::fmt::Write;
use std::future::Future;
use std::sync::Arc;
use anyhow::Result;
use tracing::info;

use api_gateway::RestApi;
use common::utils::bytes_to_gb;
use hardware_profiler::{check_model, recommend, MemoryVerdict, SystemResources};
use model_manager::{ModelBackend, ModelLifecycleManager, RemoteBackend};
use service_config::ConfigManager;

/// The deployment service
pub struct DeploymentService {
    /// Configuration manager
    config: ConfigManager,

    /// Model lifecycle manager
    manager: Arc<ModelLifecycleManager>,
}

impl DeploymentService {
    /// Creates a new service backed by the configured inference worker
    pub fn new(config: ConfigManager) -> Result<Self> {
        let backend = RemoteBackend::new(&config.settings().backend)?;
        info!(worker = backend.worker_url(), "Using inference worker");
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Creates a new service with an explicit backend
    pub fn with_backend(config: ConfigManager, backend: Arc<dyn ModelBackend>) -> Self {
        let manager = Arc::new(ModelLifecycleManager::new(
            backend,
            config.settings().model.clone(),
        ));
        Self { config, manager }
    }

    /// Gets the lifecycle manager
    pub fn manager(&self) -> Arc<ModelLifecycleManager> {
        self.manager.clone()
    }

    /// Gets the configuration manager
    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    /// Serves the HTTP API until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let settings = self.config.settings();
        let api = RestApi::new(
            settings.server.clone(),
            settings.cors.clone(),
            self.manager.clone(),
        );
        api.serve(shutdown).await
    }
}

/// Renders the host resource report, optionally checking one model
pub fn memory_report(resources: &SystemResources, model: Option<&str>) -> Result<String> {
    let mut out = String::new();
    let memory = &resources.memory;

    writeln!(out, "System Resource Check")?;
    writeln!(out, "{}", "=".repeat(50))?;
    writeln!(out, "Memory:")?;
    writeln!(out, "   Total RAM: {:.1} GB", memory.total_gb())?;
    writeln!(out, "   Available: {:.1} GB", memory.available_gb())?;
    writeln!(
        out,
        "   Used: {:.1} GB ({:.1}%)",
        bytes_to_gb(memory.used_bytes),
        memory.usage_percent
    )?;

    writeln!(out, "\nCPU:")?;
    writeln!(
        out,
        "   Cores: {} logical, {} physical",
        resources.cpu.logical_cores, resources.cpu.physical_cores
    )?;
    writeln!(out, "   Usage: {:.1}%", resources.cpu.usage_percent)?;

    writeln!(out, "\nDisk:")?;
    writeln!(out, "   Total: {:.1} GB", bytes_to_gb(resources.disk.total_bytes))?;
    writeln!(out, "   Free: {:.1} GB", resources.disk.free_gb())?;

    let recommendations = recommend(resources);
    writeln!(out, "\nRecommendations:")?;
    match recommendations.memory_verdict {
        MemoryVerdict::Insufficient => {
            writeln!(out, "   Insufficient RAM for large models")?;
            writeln!(out, "   Recommended models: gpt2, distilgpt2, microsoft/DialoGPT-medium")?;
        }
        MemoryVerdict::Limited => {
            writeln!(out, "   Limited RAM for 20B models")?;
            writeln!(out, "   Consider smaller models or stop other memory-heavy processes")?;
        }
        MemoryVerdict::Sufficient => {
            writeln!(out, "   Sufficient RAM for large models")?;
        }
    }
    if recommendations.low_disk {
        writeln!(out, "   Limited disk space for model caching")?;
    }

    writeln!(out, "\nRecommended models for {:.1} GB available RAM:", memory.available_gb())?;
    for model in &recommendations.models {
        writeln!(out, "   - {}", model)?;
    }

    if let Some(model) = model {
        let check = check_model(model, resources);
        writeln!(out, "\nModel requirements: {}", check.model_name)?;
        writeln!(out, "{}", "=".repeat(50))?;
        writeln!(out, "   Size category: {}", check.size_category)?;
        writeln!(out, "   Minimum RAM: {} GB", check.min_memory_gb)?;
        if check.is_large {
            writeln!(out, "   Large model: CPU-only conservative loading, may take 10-30 minutes")?;
        }
        let verdict = if check.fits { "yes" } else { "no" };
        writeln!(out, "   Fits this host: {}", verdict)?;
    }

    Ok(out)
}
