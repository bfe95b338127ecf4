//! Description in, validated shot record out.

use std::path::Path;
use std::sync::Arc;

use shot_schema::{inference_prompt, parse_record, strip_trailing_turns, ShotParameterRecord};
use tracing::{debug, instrument, warn};

use crate::artifact::ModelArtifact;
use crate::backend::{GenerationParams, InferenceBackend, OllamaBackend, DEFAULT_OLLAMA_URL};
use crate::error::{ClientError, Result};

/// Characters of raw output kept in parse errors.
const EXCERPT_CHARS: usize = 160;

/// Inference client bound to one trained artifact
pub struct ShotClient {
    artifact: ModelArtifact,
    backend: Arc<dyn InferenceBackend>,
    params: GenerationParams,
}

impl std::fmt::Debug for ShotClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShotClient")
            .field("artifact", &self.artifact)
            .field("backend", &self.backend.name())
            .field("params", &self.params)
            .finish()
    }
}

impl ShotClient {
    /// Open the artifact at `path`, served by a local Ollama under the
    /// artifact's serving name.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let artifact = ModelArtifact::inspect(path.as_ref())?;
        let backend = OllamaBackend::new(DEFAULT_OLLAMA_URL, artifact.serving_name())?;
        Ok(Self::from_parts(artifact, Arc::new(backend)))
    }

    /// Open the artifact at `path` with an explicit backend.
    pub fn with_backend(
        path: impl AsRef<Path>,
        backend: Arc<dyn InferenceBackend>,
    ) -> Result<Self> {
        let artifact = ModelArtifact::inspect(path.as_ref())?;
        Ok(Self::from_parts(artifact, backend))
    }

    fn from_parts(artifact: ModelArtifact, backend: Arc<dyn InferenceBackend>) -> Self {
        ShotClient {
            artifact,
            backend,
            params: GenerationParams::default(),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    /// Turn a natural-language description into a validated shot record.
    ///
    /// Output that does not decode or validate is an
    /// [`ClientError::InferenceParse`]; raw text is never returned.
    #[instrument(skip(self), fields(backend = %self.backend.name()))]
    pub async fn generate_shot_params(&self, description: &str) -> Result<ShotParameterRecord> {
        let description = description.trim();
        if description.is_empty() {
            return Err(ClientError::InvalidInput(
                "shot description is empty".to_string(),
            ));
        }

        let prompt = inference_prompt(description);
        let completion = self.backend.complete(&prompt, &self.params).await?;
        let body = strip_trailing_turns(&completion);

        match parse_record(body) {
            Ok(record) => {
                debug!(
                    shot_name = %record.shot_name,
                    path = record.path.tag(),
                    "Parsed shot record"
                );
                Ok(record)
            }
            Err(err) => {
                let excerpt: String = body.trim().chars().take(EXCERPT_CHARS).collect();
                warn!(
                    event = "inference.parse_failed",
                    error = %err,
                    excerpt = %excerpt,
                    "Model output rejected"
                );
                Err(ClientError::InferenceParse {
                    reason: err.to_string(),
                    excerpt,
                })
            }
        }
    }

    /// Ask for a modified version of `current`.
    pub async fn refine_shot(
        &self,
        current: &ShotParameterRecord,
        request: &str,
    ) -> Result<ShotParameterRecord> {
        if request.trim().is_empty() {
            return Err(ClientError::InvalidInput(
                "refinement request is empty".to_string(),
            ));
        }
        let current = serde_json::to_string_pretty(current)
            .map_err(|e| ClientError::InvalidInput(format!("unserializable shot: {e}")))?;
        let description = format!(
            "Current camera shot configuration:\n{current}\n\n\
             User wants to modify: {}\n\n\
             Please output the updated JSON configuration.",
            request.trim()
        );
        self.generate_shot_params(&description).await
    }
}
