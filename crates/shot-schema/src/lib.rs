//! Shot-Schema: Structured Cinematography Records for Shot-Tuner
//!
//! This crate defines the data contract shared by every stage:
//! the [`ShotParameterRecord`] a model emits, the [`TrainingExample`] pairs
//! a dataset is made of, the prompt layout used for training and inference,
//! and tolerant extraction of JSON from model output.
//!
//! ## Layer 0 - Data Contract
//!
//! Focus: closed tagged variants, value validation, lossless round-trips.

pub mod dataset;
pub mod error;
pub mod example;
pub mod extract;
pub mod prompt;
pub mod record;

pub use dataset::{
    dataset_digest, parse_dataset, read_dataset, validate_records, write_dataset, DatasetReport,
    RecordRejection,
};
pub use error::{Result, SchemaError, Violation};
pub use example::TrainingExample;
pub use extract::{extract_json, parse_example_values, parse_record, repair_json};
pub use prompt::{inference_prompt, strip_trailing_turns, training_text};
pub use record::{
    AimConstraint, CameraPath, FocalLength, Height, Lens, Modifier, ShotParameterRecord,
    DEFAULT_MODIFIER_INTENSITY, SELECTED_TARGET,
};

/// Version of the record schema written into training manifests.
pub const SCHEMA_VERSION: u32 = 1;

/// File name of the manifest a training run leaves in its output directory.
pub const MANIFEST_FILE: &str = "training_manifest.json";
