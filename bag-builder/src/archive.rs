//! Compressed archives of finished bags.

use crate::{BagError, BagResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// Path of the archive written for `dir`: a sibling named `<dir>.tar.gz`.
pub fn archive_path(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_os_string();
    name.push(".");
    name.push(ARCHIVE_EXTENSION);
    PathBuf::from(name)
}

/// Writes `dir` to a gzipped tarball rooted at the directory's own name,
/// then removes the directory.
pub fn compress_dir(dir: &Path) -> BagResult<PathBuf> {
    if !dir.is_dir() {
        return Err(BagError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    let root_name = dir.file_name().ok_or_else(|| BagError::InvalidBag {
        reason: format!("cannot archive a directory without a name: {}", dir.display()),
    })?;

    let compressed_path = archive_path(dir);
    let file = File::create(&compressed_path)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder.append_dir_all(root_name, dir)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?;

    fs::remove_dir_all(dir)?;
    debug!("Compressed {} to {}", dir.display(), compressed_path.display());
    Ok(compressed_path)
}
