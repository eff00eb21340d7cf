use super::ModelKind;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Artifact<M> {
    kind: String,
    format_version: u32,
    saved_at: DateTime<Utc>,
    model: M,
}

pub fn artifact_path(model_dir: &Path, kind: ModelKind) -> PathBuf {
    model_dir.join(kind.artifact_file_name())
}

/// Writes `model` to `<model_dir>/<kind>.pkl`, replacing any previous artifact.
///
/// The file is written next to the target and renamed into place, so a failed write leaves the
/// previous artifact intact.
pub fn save<M: Serialize>(model_dir: &Path, kind: ModelKind, model: &M) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create model dir {}", model_dir.display()))?;

    let path = artifact_path(model_dir, kind);
    let artifact = Artifact {
        kind: kind.as_str().to_string(),
        format_version: FORMAT_VERSION,
        saved_at: Utc::now(),
        model,
    };
    let bytes = serde_json::to_vec(&artifact)
        .with_context(|| format!("failed to serialize {kind} artifact"))?;

    let tmp = path.with_extension("pkl.tmp");
    std::fs::write(&tmp, &bytes)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    if let Err(err) = std::fs::rename(&tmp, &path) {
        std::fs::remove_file(&tmp).ok();
        return Err(err)
            .with_context(|| format!("failed to move artifact into {}", path.display()));
    }

    tracing::debug!(model = %kind, path = %path.display(), bytes = bytes.len(), "wrote model artifact");
    Ok(path)
}

pub fn load<M: DeserializeOwned>(model_dir: &Path, kind: ModelKind) -> anyhow::Result<M> {
    let path = artifact_path(model_dir, kind);
    let bytes =
        std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let artifact: Artifact<M> = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a valid {kind} artifact", path.display()))?;

    anyhow::ensure!(
        artifact.kind == kind.as_str(),
        "{} holds a {} model, expected {kind}",
        path.display(),
        artifact.kind
    );
    anyhow::ensure!(
        artifact.format_version == FORMAT_VERSION,
        "{} has artifact format {}, expected {FORMAT_VERSION}",
        path.display(),
        artifact.format_version
    );

    tracing::info!(
        model = %kind,
        path = %path.display(),
        saved_at = %artifact.saved_at,
        "loaded model artifact"
    );
    Ok(artifact.model)
}
