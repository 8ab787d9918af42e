use crate::model_service::ModelLoadError;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Makes sure the artifact exists at `path`, downloading it once from
/// `remote_url` when it does not. There is no retry: a failed download is
/// reported as a load error.
#[instrument(skip(remote_url))]
pub async fn ensure_artifact(path: &Path, remote_url: Option<&str>) -> Result<(), ModelLoadError> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(());
    }

    let Some(url) = remote_url else {
        return Err(ModelLoadError::Missing(path.display().to_string()));
    };

    tracing::info!("Model artifact missing, downloading from {}", url);
    let response = reqwest::get(url)
        .await
        .map_err(|e| ModelLoadError::Fetch(e.to_string()))?;
    if !response.status().is_success() {
        return Err(ModelLoadError::Fetch(format!(
            "{} answered with status {}",
            url,
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ModelLoadError::Fetch(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ModelLoadError::Fetch(format!("cannot create {}: {e}", parent.display())))?;
    }

    // Write next to the target and rename, so a partial download never looks
    // like a usable artifact.
    let partial = partial_path(path);
    if let Err(e) = tokio::fs::write(&partial, &bytes).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(ModelLoadError::Fetch(format!(
            "cannot write {}: {e}",
            partial.display()
        )));
    }
    if let Err(e) = tokio::fs::rename(&partial, path).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(ModelLoadError::Fetch(format!(
            "cannot move artifact into {}: {e}",
            path.display()
        )));
    }

    tracing::info!("Downloaded {} bytes into {}", bytes.len(), path.display());
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
