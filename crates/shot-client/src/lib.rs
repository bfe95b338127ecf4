//! Shot-Client: Inference for Shot-Tuner Models
//!
//! Loads a trained artifact and turns shot descriptions into validated
//! [`ShotParameterRecord`]s:
//!
//! ```no_run
//! # async fn demo() -> shot_client::Result<()> {
//! let client = shot_client::ShotClient::new("./camera_shot_model")?;
//! let shot = client.generate_shot_params("环绕角色的史诗镜头，从低角度升起").await?;
//! assert_eq!(shot.path.tag(), "orbit");
//! # Ok(())
//! # }
//! ```
//!
//! ## Layer 3 - Inference
//!
//! Focus: fail fast on bad artifacts, never return unparsed model text.

pub mod artifact;
pub mod backend;
pub mod client;
pub mod error;
pub mod export;

pub use artifact::{ArtifactKind, ModelArtifact};
pub use backend::{
    GenerationParams, InferenceBackend, OllamaBackend, OpenAiCompatBackend, DEFAULT_OLLAMA_URL,
};
pub use client::ShotClient;
pub use error::{ClientError, Result};
pub use export::{create_modelfile, export_to_ollama, write_modelfile, OllamaCli};
pub use shot_schema::ShotParameterRecord;
