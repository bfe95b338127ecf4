//! Shot-Tuner Core Library
//!
//! Shared telemetry and lifecycle observability, plus re-exports of the
//! pipeline crates for programmatic access.

pub mod obs;
pub mod telemetry;

pub use obs::StageSpan;
pub use telemetry::init_tracing;

pub use shot_schema::{
    parse_record, read_dataset, validate_records, write_dataset, AimConstraint, CameraPath,
    DatasetReport, FocalLength, Height, Lens, Modifier, RecordRejection, SchemaError,
    ShotParameterRecord, TrainingExample, SCHEMA_VERSION,
};

pub use shot_datagen::{
    generate_dataset, save_dataset, DatagenError, GenerationError, GenerationMode,
    GenerationReport, LocalGenerator, Provider, ProviderConfig, RemoteGenerator, RemoteOptions,
};

pub use shot_trainer::{
    estimate_memory, CommandBackend, MemoryEstimate, TrainConfig, TrainError, Trainer,
    TrainingBackend, TrainingDataError, TrainingManifest,
};

pub use shot_client::{
    export_to_ollama, ArtifactKind, ClientError, GenerationParams, InferenceBackend,
    ModelArtifact, OllamaBackend, OllamaCli, OpenAiCompatBackend, ShotClient,
};
