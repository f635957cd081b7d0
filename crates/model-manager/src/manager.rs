//! Single-slot model lifecycle manager
//!
//! The manager owns at most one loaded model and governs how it is deployed,
//! queried, inspected and undeployed under concurrent access. The slot sits
//! behind a single reader-writer lock: queries and status reads share it,
//! while the precondition and commit phases of a deploy and the whole of an
//! undeploy take it exclusively. The backend load itself runs outside the
//! lock on a dedicated single-permit loader, so status stays responsive and
//! competing deploys are rejected instead of queued.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use futures::FutureExt;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use validator::Validate;

use common::{
    DeployRequest, DeployResponse, Device, Error, ModelStatus, QueryRequest, QueryResponse,
    Result, UndeployResponse,
};
use service_config::ModelSettings;

use crate::backend::{BackendError, GenerationParams, LoadedModel, ModelBackend, ModelHandle, TokenizerHandle};
use crate::hints::enrich_load_error;
use crate::plan::{resolve_device, LoadPlan};

/// Device reported when nothing can be introspected
const UNKNOWN_DEVICE: &str = "unknown";

/// Contents of the slot
#[derive(Default)]
struct ModelSlot {
    model_name: Option<String>,
    loaded: Option<LoadedModel>,
    is_loading: bool,
    last_error: Option<String>,
}

/// A deploy accepted by [`ModelLifecycleManager::start_deploy`]
pub struct DeployTicket {
    pub model_name: String,
    pub device: Device,
    handle: JoinHandle<Result<()>>,
}

impl DeployTicket {
    /// Response for a deploy that is still in flight
    pub fn response(&self) -> DeployResponse {
        DeployResponse {
            message: format!("Model {} is being loaded on {}", self.model_name, self.device),
            model_name: self.model_name.clone(),
            device: self.device.to_string(),
            status: "loading".to_string(),
        }
    }

    /// Waits for the load to finish
    ///
    /// Dropping the ticket instead leaves the load running to completion.
    pub async fn wait(self) -> Result<DeployResponse> {
        match self.handle.await {
            Ok(Ok(())) => Ok(DeployResponse {
                message: format!("Model {} deployed successfully", self.model_name),
                model_name: self.model_name,
                device: self.device.to_string(),
                status: "loaded".to_string(),
            }),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(Error::Internal(format!("Loader task failed: {}", e))),
        }
    }
}

/// Lifecycle manager for the single model slot
pub struct ModelLifecycleManager {
    /// Model backend
    backend: Arc<dyn ModelBackend>,

    /// Model loading settings
    settings: ModelSettings,

    /// The slot
    slot: RwLock<ModelSlot>,

    /// Dedicated loader worker
    loader: Arc<Semaphore>,
}

impl ModelLifecycleManager {
    /// Creates a new manager with an empty slot
    pub fn new(backend: Arc<dyn ModelBackend>, settings: ModelSettings) -> Self {
        let workers = settings.loader_workers.max(1);
        Self {
            backend,
            settings,
            slot: RwLock::new(ModelSlot::default()),
            loader: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Deploys a model and waits for the load to finish
    pub async fn deploy(self: &Arc<Self>, request: DeployRequest) -> Result<DeployResponse> {
        self.start_deploy(request).await?.wait().await
    }

    /// Starts a deploy and returns once the slot is marked as loading
    ///
    /// Preconditions are checked and the loading flag raised under the write
    /// lock, so a second deploy racing this one is rejected with
    /// `AlreadyLoading`. The load itself runs on the loader worker.
    pub async fn start_deploy(self: &Arc<Self>, request: DeployRequest) -> Result<DeployTicket> {
        request.validate()?;

        let preference = request
            .device
            .as_deref()
            .unwrap_or(self.settings.default_device.as_str());
        let device = resolve_device(Some(preference));
        let plan = LoadPlan::new(
            &request,
            device,
            self.backend.supports_quantization(),
            &self.settings.offload_folder,
        );

        {
            let mut slot = self.slot.write().await;
            if slot.is_loading {
                return Err(Error::AlreadyLoading);
            }
            if slot.loaded.is_some() {
                return Err(Error::AlreadyLoaded);
            }
            slot.model_name = Some(plan.model_name.clone());
            slot.is_loading = true;
            slot.last_error = None;
        }

        info!(model = %plan.model_name, device = %device, large = plan.is_large, "Deploying model");

        let model_name = plan.model_name.clone();
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let outcome = match Arc::clone(&manager.loader).acquire_owned().await {
                Ok(_permit) => match AssertUnwindSafe(manager.load(&plan)).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Internal(format!(
                        "Loading {} panicked in the backend",
                        plan.model_name
                    ))),
                },
                Err(_) => Err(Error::Internal("Loader worker is closed".to_string())),
            };
            manager.finish_load(&plan.model_name, outcome).await
        });

        Ok(DeployTicket {
            model_name,
            device,
            handle,
        })
    }

    /// Acquires tokenizer, weights and generator for a plan
    ///
    /// Handles acquired before a later step fails are released again, so a
    /// failed load leaves nothing allocated on the backend.
    async fn load(&self, plan: &LoadPlan) -> Result<LoadedModel> {
        let mut tokenizer = self.load_tokenizer(plan).await.map_err(load_error)?;
        let padded = ensure_pad_token(tokenizer.as_mut()).await;
        let tokenizer: Arc<dyn TokenizerHandle> = Arc::from(tokenizer);
        if let Err(e) = padded {
            self.discard(None, Some(tokenizer)).await;
            return Err(load_error(e));
        }

        let model = match self.load_weights(plan).await {
            Ok(model) => model,
            Err(e) => {
                self.discard(None, Some(tokenizer)).await;
                return Err(load_error(e));
            }
        };

        let generator = match self
            .backend
            .bind(Arc::clone(&model), Arc::clone(&tokenizer), &plan.pipeline_options())
            .await
        {
            Ok(generator) => generator,
            Err(e) => {
                self.discard(Some(model), Some(tokenizer)).await;
                return Err(load_error(e));
            }
        };

        Ok(LoadedModel {
            model,
            tokenizer,
            generator,
        })
    }

    /// Releases the handles of a failed load
    ///
    /// The load error is what the caller sees; cleanup failures are only logged.
    async fn discard(
        &self,
        model: Option<Arc<dyn ModelHandle>>,
        tokenizer: Option<Arc<dyn TokenizerHandle>>,
    ) {
        if let Err(e) = self.backend.release_handles(model, tokenizer).await {
            warn!(error = %e, "Failed to release handles of a failed load");
        }
        if let Err(e) = self.backend.collect_garbage().await {
            warn!(error = %e, "Garbage collection after a failed load failed");
        }
    }

    /// Fast tokenizer first, then one attempt with the slow implementation
    async fn load_tokenizer(
        &self,
        plan: &LoadPlan,
    ) -> std::result::Result<Box<dyn TokenizerHandle>, BackendError> {
        match self
            .backend
            .load_tokenizer(&plan.model_name, &plan.tokenizer_options(true))
            .await
        {
            Ok(tokenizer) => Ok(tokenizer),
            Err(e) => {
                warn!(model = %plan.model_name, error = %e, "Fast tokenizer failed, retrying with slow tokenizer");
                self.backend
                    .load_tokenizer(&plan.model_name, &plan.tokenizer_options(false))
                    .await
            }
        }
    }

    /// Full options first, then one attempt with the minimal option set
    async fn load_weights(
        &self,
        plan: &LoadPlan,
    ) -> std::result::Result<Arc<dyn ModelHandle>, BackendError> {
        match self
            .backend
            .load_model(&plan.model_name, &plan.model_options())
            .await
        {
            Ok(model) => Ok(model),
            Err(e) => {
                warn!(model = %plan.model_name, error = %e, "Model load failed, retrying with minimal options");
                self.backend
                    .load_model(&plan.model_name, &plan.minimal_model_options())
                    .await
            }
        }
    }

    /// Commits a load outcome and lowers the loading flag
    async fn finish_load(&self, model_name: &str, outcome: Result<LoadedModel>) -> Result<()> {
        let mut slot = self.slot.write().await;
        slot.is_loading = false;

        match outcome {
            Ok(loaded) => {
                slot.loaded = Some(loaded);
                info!(model = %model_name, "Model loaded");
                Ok(())
            }
            Err(e) => {
                slot.model_name = None;
                slot.loaded = None;
                slot.last_error = Some(e.to_string());
                error!(model = %model_name, error = %e, "Failed to load model");
                Err(e)
            }
        }
    }

    /// Generates a continuation of the prompt
    ///
    /// The read guard is held for the whole generation so an undeploy cannot
    /// release the handles underneath it. The lock is write-preferring: once
    /// an undeploy or deploy is queued behind a running query, `status` waits
    /// too until that query finishes.
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        request.validate()?;

        let slot = self.slot.read().await;
        if slot.is_loading {
            return Err(Error::ModelLoading);
        }
        let loaded = slot.loaded.as_ref().ok_or(Error::NoModelLoaded)?;
        let model_name = slot.model_name.clone().unwrap_or_default();

        let started = Instant::now();

        let input_ids = loaded
            .tokenizer
            .encode(&request.prompt)
            .await
            .map_err(generation_error)?;

        let mut params = GenerationParams::from(request);
        params.pad_token_id = loaded.tokenizer.eos_token_id();

        let sequences = loaded
            .generator
            .generate(&request.prompt, &params)
            .await
            .map_err(generation_error)?;
        let generated = sequences
            .into_iter()
            .next()
            .ok_or_else(|| Error::Generation("Backend returned no sequences".to_string()))?;

        let response = strip_prompt(&generated, &request.prompt);

        let output_ids = loaded
            .tokenizer
            .encode(&response)
            .await
            .map_err(generation_error)?;

        let generation_time = started.elapsed().as_secs_f64();

        debug!(
            model = %model_name,
            input_tokens = input_ids.len(),
            output_tokens = output_ids.len(),
            generation_time,
            "Query completed"
        );

        Ok(QueryResponse {
            response,
            model_name,
            generation_time,
            input_tokens: input_ids.len(),
            output_tokens: output_ids.len(),
        })
    }

    /// Current state of the slot
    pub async fn status(&self) -> ModelStatus {
        let slot = self.slot.read().await;

        let device = match &slot.loaded {
            Some(loaded) => loaded
                .device()
                .unwrap_or_else(|| Device::Cpu.to_string()),
            None => UNKNOWN_DEVICE.to_string(),
        };

        ModelStatus {
            model_name: slot.model_name.clone(),
            is_loaded: slot.loaded.is_some(),
            is_loading: slot.is_loading,
            device: Some(device),
            last_error: slot.last_error.clone(),
        }
    }

    /// Unloads the current model
    ///
    /// The slot is emptied before the backend is asked to release, so a
    /// release failure is reported but never leaves a half-loaded slot.
    /// Garbage collection is requested even when the release fails.
    pub async fn undeploy(&self) -> Result<UndeployResponse> {
        let mut slot = self.slot.write().await;
        let loaded = slot.loaded.take().ok_or(Error::NoModelLoaded)?;
        let model_name = slot.model_name.take().unwrap_or_default();

        info!(model = %model_name, "Undeploying model");

        let released = self.backend.release(loaded).await;
        let collected = self.backend.collect_garbage().await;
        if let Err(e) = released.and(collected) {
            error!(model = %model_name, error = %e, "Backend cleanup failed");
            return Err(Error::Undeploy(e.message));
        }

        info!(model = %model_name, "Model undeployed");

        Ok(UndeployResponse {
            message: "Model undeployed successfully".to_string(),
        })
    }
}

/// Aliases a missing padding token to the end-of-sequence token
async fn ensure_pad_token(tokenizer: &mut dyn TokenizerHandle) -> std::result::Result<(), BackendError> {
    if tokenizer.pad_token().is_some() {
        return Ok(());
    }
    match tokenizer.eos_token().map(str::to_string) {
        Some(eos) => {
            debug!(token = %eos, "Using end-of-sequence token for padding");
            tokenizer.set_pad_token(eos).await
        }
        None => Ok(()),
    }
}

/// Removes the echoed prompt and surrounding whitespace
fn strip_prompt(generated: &str, prompt: &str) -> String {
    let continuation = match generated.strip_prefix(prompt) {
        Some(rest) => rest,
        None => {
            let skip = generated
                .char_indices()
                .nth(prompt.chars().count())
                .map(|(i, _)| i)
                .unwrap_or(generated.len());
            &generated[skip..]
        }
    };
    continuation.trim().to_string()
}

fn load_error(e: BackendError) -> Error {
    Error::ModelLoad(enrich_load_error(&e))
}

fn generation_error(e: BackendError) -> Error {
    Error::Generation(e.message)
}
