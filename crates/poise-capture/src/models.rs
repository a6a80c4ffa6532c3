//! Detection model loading and the readiness signal the UI polls.
//!
//! Three artifacts load in a fixed order, reporting 33/66/100 progress. A
//! failure is terminal for the session: detection stays unavailable, nothing
//! else is affected, and there is no retry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model artifact missing: {0}")]
    Missing(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid weights manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to load {artifact}: {reason}")]
    Load { artifact: ModelArtifact, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelArtifact {
    TinyFaceDetector,
    FaceExpression,
    FaceLandmark68,
}

impl ModelArtifact {
    pub const LOAD_ORDER: [ModelArtifact; 3] = [
        ModelArtifact::TinyFaceDetector,
        ModelArtifact::FaceExpression,
        ModelArtifact::FaceLandmark68,
    ];

    fn stem(self) -> &'static str {
        match self {
            ModelArtifact::TinyFaceDetector => "tiny_face_detector_model",
            ModelArtifact::FaceExpression => "face_expression_model",
            ModelArtifact::FaceLandmark68 => "face_landmark_68_model",
        }
    }

    pub fn manifest_file(self) -> String {
        format!("{}-weights_manifest.json", self.stem())
    }

    pub fn shard_file(self) -> String {
        format!("{}-shard1", self.stem())
    }
}

impl fmt::Display for ModelArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

/// Published on the readiness channel while and after models load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    Loading { progress: u8 },
    Ready,
    Failed(String),
}

impl ModelStatus {
    /// True once every artifact has loaded.
    pub fn is_ready(&self) -> bool {
        matches!(self, ModelStatus::Ready)
    }

    /// Percent loaded; a failed load reports 0.
    pub fn progress(&self) -> u8 {
        match self {
            ModelStatus::Loading { progress } => *progress,
            ModelStatus::Ready => 100,
            ModelStatus::Failed(_) => 0,
        }
    }
}

/// New readiness channel, starting at 0% loaded.
pub fn readiness_channel() -> (watch::Sender<ModelStatus>, watch::Receiver<ModelStatus>) {
    watch::channel(ModelStatus::Loading { progress: 0 })
}

/// Progress after `stage` of the three artifacts has loaded: 33, 66, 100.
fn stage_progress(stage: usize) -> u8 {
    (stage * 100 / ModelArtifact::LOAD_ORDER.len()) as u8
}

/// Load every artifact from `dir` in order through `loader`.
///
/// Stops at the first failure and publishes [`ModelStatus::Failed`].
pub fn load_models<L>(dir: &Path, mut loader: L, readiness: &watch::Sender<ModelStatus>) -> Result<(), ModelError>
where
    L: FnMut(ModelArtifact, &Path) -> Result<(), ModelError>,
{
    readiness.send_replace(ModelStatus::Loading { progress: 0 });

    for (i, &artifact) in ModelArtifact::LOAD_ORDER.iter().enumerate() {
        if let Err(e) = loader(artifact, dir) {
            tracing::error!(%artifact, dir = %dir.display(), error = %e, "model load failed");
            readiness.send_replace(ModelStatus::Failed(format!(
                "failed to load face detection models from {}: {e}; make sure the model files have been downloaded",
                dir.display()
            )));
            return Err(e);
        }
        let progress = stage_progress(i + 1);
        tracing::info!(%artifact, progress, "model loaded");
        readiness.send_replace(ModelStatus::Loading { progress });
    }

    readiness.send_replace(ModelStatus::Ready);
    Ok(())
}

/// Loader that checks an artifact's files are present and its manifest is JSON.
pub fn check_artifact(artifact: ModelArtifact, dir: &Path) -> Result<(), ModelError> {
    let manifest = dir.join(artifact.manifest_file());
    let shard = dir.join(artifact.shard_file());

    for path in [&manifest, &shard] {
        if !path.exists() {
            return Err(ModelError::Missing(path.clone()));
        }
    }

    let text = std::fs::read_to_string(&manifest).map_err(|source| ModelError::Io {
        path: manifest.clone(),
        source,
    })?;
    serde_json::from_str::<serde_json::Value>(&text).map_err(|source| ModelError::Manifest {
        path: manifest.clone(),
        source,
    })?;
    Ok(())
}
