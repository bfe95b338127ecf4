//! Recognizing trained model artifacts on disk
//!
//! Three layouts are accepted:
//!
//! - adapter directory: `adapter_config.json` plus adapter weights
//! - merged model directory: `config.json` plus full weights
//! - GGUF: a `.gguf` file, or a directory holding one
//!
//! A `training_manifest.json` next to the artifact, when present, must carry
//! the record schema version this client speaks.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shot_schema::{MANIFEST_FILE, SCHEMA_VERSION};
use tracing::debug;

use crate::error::{ClientError, Result};

const ADAPTER_CONFIG: &str = "adapter_config.json";
const MODEL_CONFIG: &str = "config.json";
const MERGED_WEIGHTS: [&str; 3] = [
    "model.safetensors",
    "model.safetensors.index.json",
    "pytorch_model.bin",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Adapter,
    Merged,
    Gguf,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Adapter => write!(f, "adapter"),
            ArtifactKind::Merged => write!(f, "merged"),
            ArtifactKind::Gguf => write!(f, "gguf"),
        }
    }
}

/// A recognized model artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelArtifact {
    /// Path as given
    pub path: PathBuf,
    pub kind: ArtifactKind,
    /// The `.gguf` file for GGUF artifacts
    pub model_file: Option<PathBuf>,
    pub base_model: Option<String>,
    /// Schema version from the training manifest, if one was found
    pub schema_version: Option<u32>,
}

#[derive(Deserialize)]
struct ManifestHeader {
    schema_version: u32,
    #[serde(default)]
    base_model: Option<String>,
}

#[derive(Deserialize)]
struct AdapterConfigHeader {
    #[serde(default)]
    base_model_name_or_path: Option<String>,
}

impl ModelArtifact {
    /// Inspect `path` and classify it.
    pub fn inspect(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ClientError::Configuration(format!(
                "model artifact not found: {}",
                path.display()
            )));
        }

        let (kind, model_file, manifest_dir) = if path.is_file() {
            if !has_gguf_extension(path) {
                return Err(unrecognized(path));
            }
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            (ArtifactKind::Gguf, Some(path.to_path_buf()), dir)
        } else if path.join(ADAPTER_CONFIG).is_file() {
            (ArtifactKind::Adapter, None, path.to_path_buf())
        } else if path.join(MODEL_CONFIG).is_file()
            && MERGED_WEIGHTS.iter().any(|w| path.join(w).is_file())
        {
            (ArtifactKind::Merged, None, path.to_path_buf())
        } else if let Some(gguf) = find_gguf(path)? {
            (ArtifactKind::Gguf, Some(gguf), path.to_path_buf())
        } else {
            return Err(unrecognized(path));
        };

        let mut artifact = ModelArtifact {
            path: path.to_path_buf(),
            kind,
            model_file,
            base_model: None,
            schema_version: None,
        };

        if kind == ArtifactKind::Adapter {
            let header: AdapterConfigHeader = read_json(&path.join(ADAPTER_CONFIG))?;
            artifact.base_model = header.base_model_name_or_path;
        }

        let manifest_path = manifest_dir.join(MANIFEST_FILE);
        if manifest_path.is_file() {
            let header: ManifestHeader = read_json(&manifest_path)?;
            if header.schema_version != SCHEMA_VERSION {
                return Err(ClientError::Configuration(format!(
                    "artifact was trained for record schema v{}, this client speaks v{}",
                    header.schema_version, SCHEMA_VERSION
                )));
            }
            artifact.schema_version = Some(header.schema_version);
            if artifact.base_model.is_none() {
                artifact.base_model = header.base_model;
            }
        }

        debug!(
            path = %artifact.path.display(),
            kind = %artifact.kind,
            base_model = ?artifact.base_model,
            "Recognized model artifact"
        );
        Ok(artifact)
    }

    /// Name to serve the model under: the artifact's file stem or directory
    /// name, lowercased, with whitespace replaced by dashes.
    pub fn serving_name(&self) -> String {
        let source = self.model_file.as_deref().unwrap_or(&self.path);
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty() && s != ".")
            .unwrap_or_else(|| "camera-shot".to_string());
        stem.to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
    }
}

fn has_gguf_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gguf"))
}

fn find_gguf(dir: &Path) -> Result<Option<PathBuf>> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_gguf_extension(p))
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| {
        ClientError::Configuration(format!("unreadable {}: {e}", path.display()))
    })
}

fn unrecognized(path: &Path) -> ClientError {
    ClientError::Configuration(format!(
        "{} is not a recognizable model artifact (expected an adapter directory, \
         a merged model directory or a .gguf file)",
        path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_missing_path_is_configuration_error() {
        let err = ModelArtifact::inspect(Path::new("/nonexistent/camera_shot_model")).unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[test]
    fn test_empty_directory_is_unrecognized() {
        let dir = tempdir().unwrap();
        let err = ModelArtifact::inspect(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a recognizable model artifact"));
    }

    #[test]
    fn test_adapter_directory() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "adapter_config.json",
            r#"{"base_model_name_or_path": "Qwen/Qwen2.5-0.5B-Instruct", "r": 16}"#,
        );
        let artifact = ModelArtifact::inspect(dir.path()).unwrap();
        assert_eq!(artifact.kind, ArtifactKind::Adapter);
        assert_eq!(artifact.base_model.as_deref(), Some("Qwen/Qwen2.5-0.5B-Instruct"));
        assert_eq!(artifact.schema_version, None);
    }

    #[test]
    fn test_merged_directory() {
        let dir = tempdir().unwrap();
        write(dir.path(), "config.json", "{}");
        write(dir.path(), "model.safetensors", "");
        assert_eq!(
            ModelArtifact::inspect(dir.path()).unwrap().kind,
            ArtifactKind::Merged
        );
    }

    #[test]
    fn test_gguf_file_and_directory() {
        let dir = tempdir().unwrap();
        write(dir.path(), "Camera Shot.Q4_K_M.gguf", "");

        let from_dir = ModelArtifact::inspect(dir.path()).unwrap();
        assert_eq!(from_dir.kind, ArtifactKind::Gguf);
        let file = from_dir.model_file.clone().unwrap();

        let from_file = ModelArtifact::inspect(&file).unwrap();
        assert_eq!(from_file.kind, ArtifactKind::Gguf);
        assert_eq!(from_file.serving_name(), "camera-shot.q4_k_m");
    }

    #[test]
    fn test_other_file_is_unrecognized() {
        let dir = tempdir().unwrap();
        write(dir.path(), "weights.bin", "");
        let err = ModelArtifact::inspect(&dir.path().join("weights.bin")).unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[test]
    fn test_manifest_schema_version_is_checked() {
        let dir = tempdir().unwrap();
        write(dir.path(), "adapter_config.json", "{}");
        write(
            dir.path(),
            MANIFEST_FILE,
            r#"{"schema_version": 99, "base_model": "x"}"#,
        );
        let err = ModelArtifact::inspect(dir.path()).unwrap_err();
        assert!(err.to_string().contains("schema v99"));

        write(
            dir.path(),
            MANIFEST_FILE,
            &format!(r#"{{"schema_version": {SCHEMA_VERSION}, "base_model": "Qwen/Qwen2.5-0.5B-Instruct"}}"#),
        );
        let artifact = ModelArtifact::inspect(dir.path()).unwrap();
        assert_eq!(artifact.schema_version, Some(SCHEMA_VERSION));
        assert_eq!(artifact.base_model.as_deref(), Some("Qwen/Qwen2.5-0.5B-Instruct"));
    }

    #[test]
    fn test_serving_name_from_directory() {
        let dir = tempdir().unwrap();
        let model_dir = dir.path().join("camera_shot_model");
        std::fs::create_dir(&model_dir).unwrap();
        write(&model_dir, "adapter_config.json", "{}");
        let artifact = ModelArtifact::inspect(&model_dir).unwrap();
        assert_eq!(artifact.serving_name(), "camera_shot_model");
    }
}
