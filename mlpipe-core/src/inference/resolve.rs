//! Locate the most recent trained model under the artifact root.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::ArtifactNotFoundError;

/// Path of the model file in the most recently modified run directory.
///
/// Every subdirectory of `artifact_root` counts as a run directory; ties on
/// modification time are broken by the larger directory name. Model files are
/// written atomically, so a returned path always points at a complete file.
pub fn resolve_latest_model(
    artifact_root: &Path,
    model_subpath: &Path,
) -> Result<PathBuf, ArtifactNotFoundError> {
    let entries = match std::fs::read_dir(artifact_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ArtifactNotFoundError::NoRunDirectories {
                root: artifact_root.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(ArtifactNotFoundError::RootUnreadable {
                root: artifact_root.to_path_buf(),
                source,
            });
        }
    };

    let unreadable = |source: io::Error| ArtifactNotFoundError::RootUnreadable {
        root: artifact_root.to_path_buf(),
        source,
    };
    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(unreadable)?;
        let meta = entry.metadata().map_err(unreadable)?;
        if !meta.is_dir() {
            continue;
        }
        let modified = meta.modified().map_err(unreadable)?;
        let path = entry.path();
        let newer = match &latest {
            None => true,
            Some((best_time, best_path)) => (modified, &path) > (*best_time, best_path),
        };
        if newer {
            latest = Some((modified, path));
        }
    }

    let Some((_, run_dir)) = latest else {
        return Err(ArtifactNotFoundError::NoRunDirectories {
            root: artifact_root.to_path_buf(),
        });
    };
    let model_path = run_dir.join(model_subpath);
    if !model_path.is_file() {
        return Err(ArtifactNotFoundError::ModelFileMissing { path: model_path });
    }
    tracing::debug!(path = %model_path.display(), "Resolved latest model");
    Ok(model_path)
}
