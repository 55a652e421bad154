//! Data file discovery.

use std::path::Path;

use traj_import_models::FileBatch;

/// Errors from listing the data directory.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The directory holds no file with the requested suffix.
    #[error("No '{suffix}' files found in directory '{dir}'")]
    NoFilesFound {
        /// Directory that was searched.
        dir: String,
        /// Suffix that was searched for.
        suffix: String,
    },

    /// The directory or one of its entries could not be read.
    #[error("Failed to read directory {dir}: {source}")]
    ReadDir {
        /// Directory that was searched.
        dir: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Lists the regular files in `dir` whose name ends with `suffix`, ordered
/// by file name.
///
/// Subdirectories are not searched.
///
/// # Errors
///
/// Returns [`DiscoveryError::NoFilesFound`] if nothing matches, or
/// [`DiscoveryError::ReadDir`] if the directory cannot be read.
pub fn list(dir: &Path, suffix: &str) -> Result<FileBatch, DiscoveryError> {
    let read_err = |e| DiscoveryError::ReadDir {
        dir: dir.display().to_string(),
        source: e,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        let matches = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with(suffix));
        if matches && path.is_file() {
            files.push(path);
        }
    }

    let batch = FileBatch::new(files);
    if batch.is_empty() {
        return Err(DiscoveryError::NoFilesFound {
            dir: dir.display().to_string(),
            suffix: suffix.to_string(),
        });
    }

    log::debug!("Discovered {} file(s) in {}", batch.len(), dir.display());

    Ok(batch)
}
