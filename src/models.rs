//! Whisper model download and management.
//!
//! Handles automatic downloading of GGML model files on first use and when
//! the user switches models with /model.

use crate::config::SpeechModel;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const GGML_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Metadata for a downloadable model file.
struct ModelInfo {
    /// Filename to save as.
    filename: &'static str,
    /// Expected file size for validation.
    size_bytes: u64,
}

fn model_info(model: SpeechModel) -> ModelInfo {
    match model {
        SpeechModel::Tiny => ModelInfo {
            filename: "ggml-tiny.bin",
            size_bytes: 77_691_713,
        },
        SpeechModel::TinyEn => ModelInfo {
            filename: "ggml-tiny.en.bin",
            size_bytes: 77_704_715,
        },
        SpeechModel::Base => ModelInfo {
            filename: "ggml-base.bin",
            size_bytes: 147_951_465,
        },
        SpeechModel::BaseEn => ModelInfo {
            filename: "ggml-base.en.bin",
            size_bytes: 147_964_211,
        },
        SpeechModel::Small => ModelInfo {
            filename: "ggml-small.bin",
            size_bytes: 487_601_967,
        },
        SpeechModel::SmallEn => ModelInfo {
            filename: "ggml-small.en.bin",
            size_bytes: 487_614_201,
        },
        SpeechModel::Medium => ModelInfo {
            filename: "ggml-medium.bin",
            size_bytes: 1_533_774_781,
        },
        SpeechModel::MediumEn => ModelInfo {
            filename: "ggml-medium.en.bin",
            size_bytes: 1_533_774_781,
        },
        SpeechModel::LargeV3 => ModelInfo {
            filename: "ggml-large-v3.bin",
            size_bytes: 3_094_623_691,
        },
        SpeechModel::LargeV3Turbo => ModelInfo {
            filename: "ggml-large-v3-turbo.bin",
            size_bytes: 1_624_592_891,
        },
    }
}

/// Manages model downloads and storage.
pub struct ModelManager {
    models_dir: PathBuf,
}

impl ModelManager {
    /// Create a new ModelManager using the default models directory.
    ///
    /// Default: `~/.local/share/voicescribe/models/`
    pub fn new() -> Result<Self> {
        let models_dir = crate::config::Config::models_dir()?;
        Ok(Self { models_dir })
    }

    /// Create a ModelManager with a custom models directory.
    pub fn with_dir(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    /// Get the models directory path.
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Path a model file will live at once downloaded.
    pub fn model_path(&self, model: SpeechModel) -> PathBuf {
        self.models_dir.join(model_info(model).filename)
    }

    /// Ensure a model is available, downloading if necessary.
    ///
    /// Returns the path to the model file.
    pub async fn ensure(&self, model: SpeechModel) -> Result<PathBuf> {
        let info = model_info(model);
        let model_path = self.models_dir.join(info.filename);

        if model_path.exists() {
            let metadata = fs::metadata(&model_path)
                .await
                .context("Failed to read model metadata")?;
            let actual_size = metadata.len();

            if actual_size == info.size_bytes {
                debug!(path = %model_path.display(), "Model already exists");
                return Ok(model_path);
            }

            warn!(
                model = model.name(),
                expected = info.size_bytes,
                actual = actual_size,
                "Model size mismatch, re-downloading"
            );
            fs::remove_file(&model_path)
                .await
                .context("Failed to remove corrupted model")?;
        }

        self.download(&info, &model_path).await?;
        Ok(model_path)
    }

    /// Download a model file from the GGML repository.
    async fn download(&self, info: &ModelInfo, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create models directory")?;
        }

        let url = format!("{GGML_BASE_URL}/{}", info.filename);
        info!(url = %url, dest = %dest.display(), "Downloading model");

        let response = reqwest::get(&url)
            .await
            .with_context(|| format!("Failed to download model from {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download model: HTTP {}", response.status());
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read response body")?;

        if bytes.len() as u64 != info.size_bytes {
            anyhow::bail!(
                "Downloaded model size mismatch: expected {}, got {}",
                info.size_bytes,
                bytes.len()
            );
        }

        // Write to temporary file first, then rename (atomic)
        let temp_path = dest.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .context("Failed to create temporary model file")?;
        file.write_all(&bytes)
            .await
            .context("Failed to write model file")?;
        file.sync_all().await.context("Failed to sync model file")?;

        fs::rename(&temp_path, dest)
            .await
            .context("Failed to finalize model file")?;

        info!(path = %dest.display(), size = bytes.len(), "Model downloaded");

        Ok(())
    }
}

#[cfg(test)]
#[path = "models_test.rs"]
mod tests;
