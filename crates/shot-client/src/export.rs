//! Packaging a GGUF artifact for Ollama
//!
//! The generated `Modelfile` bakes the training prompt layout into the model
//! template, so `ollama run <name> "<description>"` works without raw mode.

use std::path::{Path, PathBuf};

use shot_schema::prompt::{INPUT_HEADER, OUTPUT_HEADER};
use tokio::process::Command;
use tracing::{info, warn};

use crate::artifact::{ArtifactKind, ModelArtifact};
use crate::backend::GenerationParams;
use crate::error::{ClientError, Result};

pub const MODELFILE_NAME: &str = "Modelfile";

/// Render a Modelfile for the GGUF file at `gguf`.
pub fn create_modelfile(gguf: &Path, params: &GenerationParams) -> String {
    let mut content = format!("FROM {}\n\n", gguf.display());
    content.push_str(&format!(
        "TEMPLATE \"\"\"{INPUT_HEADER}\n{{{{ .Prompt }}}}\n\n{OUTPUT_HEADER}\n\"\"\"\n\n"
    ));
    content.push_str(&format!("PARAMETER temperature {}\n", params.temperature));
    content.push_str(&format!("PARAMETER num_predict {}\n", params.max_tokens));
    for stop in &params.stop {
        content.push_str(&format!("PARAMETER stop \"{stop}\"\n"));
    }
    content
}

/// Write a Modelfile next to the artifact's GGUF file.
pub fn write_modelfile(artifact: &ModelArtifact, params: &GenerationParams) -> Result<PathBuf> {
    let gguf = match (artifact.kind, &artifact.model_file) {
        (ArtifactKind::Gguf, Some(file)) => file,
        _ => {
            return Err(ClientError::Configuration(format!(
                "{} is a {} artifact; convert it to GGUF before exporting to Ollama",
                artifact.path.display(),
                artifact.kind
            )))
        }
    };
    let gguf = gguf.canonicalize()?;
    let dir = gguf
        .parent()
        .ok_or_else(|| ClientError::Configuration("GGUF file has no parent directory".into()))?;

    let path = dir.join(MODELFILE_NAME);
    std::fs::write(&path, create_modelfile(&gguf, params))?;
    info!(path = %path.display(), "Wrote Modelfile");
    Ok(path)
}

/// The `ollama` command-line tool
#[derive(Debug, Clone)]
pub struct OllamaCli {
    program: PathBuf,
}

impl Default for OllamaCli {
    fn default() -> Self {
        OllamaCli {
            program: PathBuf::from("ollama"),
        }
    }
}

impl OllamaCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        OllamaCli {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                ClientError::Export(format!(
                    "failed to run {}: {e} (is Ollama installed?)",
                    self.program.display()
                ))
            })?;
        if !output.status.success() {
            return Err(ClientError::Export(format!(
                "{} {} failed: {}",
                self.program.display(),
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Register `name` from `modelfile` and confirm it is listed.
    pub async fn create(&self, name: &str, modelfile: &Path) -> Result<()> {
        let modelfile = modelfile.to_string_lossy();
        self.run(&["create", name, "-f", &modelfile]).await?;

        if self.is_registered(name).await? {
            info!(model = %name, "Registered model with Ollama");
            Ok(())
        } else {
            warn!(model = %name, "Model missing from `ollama list` after create");
            Err(ClientError::Export(format!(
                "model '{name}' not listed after ollama create"
            )))
        }
    }

    /// Whether `ollama list` shows `name`, with or without a tag.
    pub async fn is_registered(&self, name: &str) -> Result<bool> {
        let listing = self.run(&["list"]).await?;
        Ok(listing.lines().skip(1).any(|line| {
            line.split_whitespace().next().is_some_and(|listed| {
                listed == name || listed.split_once(':').is_some_and(|(base, _)| base == name)
            })
        }))
    }
}

/// Write a Modelfile for `artifact` and register it as `name`.
pub async fn export_to_ollama(
    artifact: &ModelArtifact,
    name: &str,
    params: &GenerationParams,
    cli: &OllamaCli,
) -> Result<PathBuf> {
    if name.trim().is_empty() || name.contains(char::is_whitespace) {
        return Err(ClientError::Configuration(format!(
            "invalid Ollama model name '{name}'"
        )));
    }
    let modelfile = write_modelfile(artifact, params)?;
    cli.create(name, &modelfile).await?;
    Ok(modelfile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_modelfile_carries_prompt_layout() {
        let content = create_modelfile(Path::new("/models/shot.gguf"), &GenerationParams::default());
        assert!(content.starts_with("FROM /models/shot.gguf\n"));
        assert!(content.contains("TEMPLATE \"\"\"### 输入:\n{{ .Prompt }}\n\n### 输出:\n\"\"\""));
        assert!(content.contains("PARAMETER temperature 0.1\n"));
        assert!(content.contains("PARAMETER stop \"### 输入:\"\n"));
    }

    #[test]
    fn test_write_modelfile_requires_gguf() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("adapter_config.json"), "{}").unwrap();
        let artifact = ModelArtifact::inspect(dir.path()).unwrap();
        let err = write_modelfile(&artifact, &GenerationParams::default()).unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[test]
    fn test_write_modelfile_next_to_gguf() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("shot.gguf"), "").unwrap();
        let artifact = ModelArtifact::inspect(dir.path()).unwrap();

        let path = write_modelfile(&artifact, &GenerationParams::default()).unwrap();
        assert_eq!(path.file_name().unwrap(), MODELFILE_NAME);
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.lines().next().unwrap().ends_with("shot.gguf"));
    }

    #[tokio::test]
    async fn test_invalid_model_name() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("shot.gguf"), "").unwrap();
        let artifact = ModelArtifact::inspect(dir.path()).unwrap();
        let err = export_to_ollama(
            &artifact,
            "camera shot",
            &GenerationParams::default(),
            &OllamaCli::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }
}
