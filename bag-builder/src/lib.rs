//! BagIt packaging utilities for digitized image packages
//!
//! This crate turns a directory of digitized files into a BagIt bag
//! (payload under `data/`, checksum manifests, `bag-info.txt`) and
//! compresses finished bags into `.tar.gz` archives for delivery.

pub mod archive;
pub mod bag;

use std::path::PathBuf;
use thiserror::Error;

pub use archive::{archive_path, compress_dir};
pub use bag::{make_bag, Bag, BagInfo, ChecksumAlgorithm, DEFAULT_ALGORITHMS};

/// Errors related to bag creation, validation and compression
#[derive(Error, Debug)]
pub enum BagError {
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Invalid bag: {reason}")]
    InvalidBag { reason: String },

    #[error("Unsupported checksum algorithm: {name}")]
    UnsupportedAlgorithm { name: String },

    #[error("File listed in manifest is missing: {path}")]
    MissingFile { path: String },

    #[error("Payload file not listed in {manifest}: {path}")]
    UntrackedFile { path: String, manifest: String },

    #[error("{algorithm} checksum mismatch for {path}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        path: String,
        algorithm: ChecksumAlgorithm,
        expected: String,
        actual: String,
    },

    #[error("Payload-Oxum mismatch: expected {expected}, found {actual}")]
    OxumMismatch { expected: String, actual: String },

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BagResult<T> = Result<T, BagError>;
