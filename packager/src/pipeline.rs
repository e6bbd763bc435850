//! The packaging job.
//!
//! ```text
//! SSM config -> ArchivesSpace session -> copy to tmp -> bag -> tar.gz
//!     -> S3 upload -> remove source -> SUCCESS notification
//! ```
//!
//! Any failing step removes the working bag and archive and publishes a
//! FAILURE notification carrying the error chain. Source files are only
//! removed once the package has been delivered.

use crate::notification::Notification;
use crate::services::{ServiceError, Services};
use crate::settings::JobSettings;
use archivesspace::{
    date_range, format_date_range, ArchivesSpaceApi, ArchivesSpaceConfig, ArchivesSpaceError,
};
use bag_builder::{archive_path, compress_dir, make_bag, BagError, BagInfo};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub const ORIGIN: &str = "digitization";
pub const BAGIT_PROFILE: &str = "zorya_bagit_profile.json";
pub const PACKAGE_CONTENT_TYPE: &str = "application/gzip";

#[derive(Error, Debug)]
pub enum PackagerError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Source directory {path} does not exist")]
    SourceMissing { path: PathBuf },

    #[error("Destination {path} already exists")]
    DestinationExists { path: PathBuf },

    #[error("ArchivesSpace session has not been opened")]
    NotConnected,

    #[error("ArchivesSpace error: {0}")]
    ArchivesSpace(#[from] ArchivesSpaceError),

    #[error("Bag error: {0}")]
    Bag(#[from] BagError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Copy failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type PackagerResult<T> = Result<T, PackagerError>;

pub struct Packager {
    settings: JobSettings,
    services: Services,
    archivesspace: Option<Box<dyn ArchivesSpaceApi>>,
}

impl Packager {
    /// Creates the tmp directory if needed.
    pub fn new(settings: JobSettings, services: Services) -> PackagerResult<Self> {
        settings
            .validate()
            .map_err(|message| PackagerError::InvalidConfig { message })?;
        if !settings.tmp_dir.is_dir() {
            fs::create_dir_all(&settings.tmp_dir)?;
        }
        debug!(?settings, "Packager created");
        Ok(Self {
            settings,
            services,
            archivesspace: None,
        })
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    pub fn bag_dir(&self) -> PathBuf {
        self.settings.tmp_dir.join(&self.settings.refid)
    }

    pub fn source_path(&self) -> PathBuf {
        self.settings.source_dir.join(&self.settings.refid)
    }

    /// Use an already opened ArchivesSpace session instead of connecting
    /// from Parameter Store values.
    pub fn with_archivesspace(mut self, client: Box<dyn ArchivesSpaceApi>) -> Self {
        self.archivesspace = Some(client);
        self
    }

    /// Runs the whole job. Failures are cleaned up and notified before being
    /// returned.
    pub async fn run(&mut self) -> PackagerResult<()> {
        let refid = self.settings.refid.clone();
        let bag_dir = self.bag_dir();
        debug!("Packaging started for package {}.", refid);

        match self.package(&bag_dir).await {
            Ok(()) => {
                info!("Package {} successfully packaged.", refid);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "Package {} failed packaging.", refid);
                if let Err(cleanup_err) = self.cleanup_failed_job(&bag_dir) {
                    warn!("Cleanup after failed job incomplete: {}", cleanup_err);
                }
                if let Err(notify_err) = self.deliver_failure_notification(&err).await {
                    error!("Failure notification not delivered: {}", notify_err);
                }
                Err(err)
            }
        }
    }

    async fn package(&mut self, bag_dir: &Path) -> PackagerResult<()> {
        let path = self.settings.ssm_parameter_path.clone();
        let config = self.get_config(&path).await?;
        self.connect(&config).await?;
        self.move_to_tmp(bag_dir).await?;
        let rights_ids = self.settings.rights_ids.clone();
        self.create_bag(bag_dir, &rights_ids).await?;
        let compressed_path = self.compress_bag(bag_dir).await?;
        self.deliver_package(&compressed_path).await?;
        self.cleanup_successful_job()?;
        self.deliver_success_notification().await?;
        Ok(())
    }

    /// All parameters under `path`, keyed by name.
    pub async fn get_config(&self, path: &str) -> PackagerResult<HashMap<String, String>> {
        Ok(self.services.parameters.parameters_by_path(path).await?)
    }

    /// Opens an ArchivesSpace session from Parameter Store values, unless one
    /// was supplied up front.
    pub async fn connect(&mut self, config: &HashMap<String, String>) -> PackagerResult<()> {
        if self.archivesspace.is_some() {
            return Ok(());
        }
        let config = ArchivesSpaceConfig::from_parameters(config)
            .map_err(|message| PackagerError::InvalidConfig { message })?;
        let client = self.services.catalog.connect(config).await?;
        self.archivesspace = Some(client);
        Ok(())
    }

    /// Copies the source files for this ref id into `dest_dir`.
    pub async fn move_to_tmp(&self, dest_dir: &Path) -> PackagerResult<()> {
        let source = self.source_path();
        let dest = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || copy_tree(&source, &dest)).await??;
        debug!("Copied source files to {}", dest_dir.display());
        Ok(())
    }

    /// Makes `bag_dir` a bag described by its ArchivesSpace record.
    pub async fn create_bag(&self, bag_dir: &Path, rights_ids: &[String]) -> PackagerResult<()> {
        let client = self
            .archivesspace
            .as_deref()
            .ok_or(PackagerError::NotConnected)?;
        let refid = bag_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| PackagerError::InvalidConfig {
                message: format!("Bag directory {} has no name", bag_dir.display()),
            })?;

        let uri = client.archival_object_uri(&refid).await?;
        let dates = client.closest_dates(&uri).await?;
        let (start_date, end_date) = date_range(&dates)?;
        let (start_date, end_date) = format_date_range(&start_date, &end_date)?;

        let info = bag_info(&uri, &start_date, &end_date, rights_ids);
        let dir = bag_dir.to_path_buf();
        tokio::task::spawn_blocking(move || make_bag(&dir, &info)).await??;
        debug!(
            "Bag created from {} with Rights IDs {:?}.",
            bag_dir.display(),
            rights_ids
        );
        Ok(())
    }

    /// Compresses the bag and removes the uncompressed directory.
    pub async fn compress_bag(&self, bag_dir: &Path) -> PackagerResult<PathBuf> {
        let dir = bag_dir.to_path_buf();
        let compressed_path = tokio::task::spawn_blocking(move || compress_dir(&dir)).await??;
        debug!("Compressed bag {} created.", compressed_path.display());
        Ok(compressed_path)
    }

    /// Uploads the archive under its file name, then deletes the local copy.
    pub async fn deliver_package(&self, package_path: &Path) -> PackagerResult<()> {
        let key = package_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| PackagerError::InvalidConfig {
                message: format!("Package path {} has no file name", package_path.display()),
            })?;
        self.services
            .storage
            .upload(package_path, &key, PACKAGE_CONTENT_TYPE)
            .await?;
        fs::remove_file(package_path)?;
        debug!(
            "Package delivered to {}.",
            self.services.storage.destination()
        );
        Ok(())
    }

    pub fn cleanup_successful_job(&self) -> PackagerResult<()> {
        fs::remove_dir_all(self.source_path())?;
        debug!("Cleanup from successful job completed.");
        Ok(())
    }

    /// Removes the bag directory and its archive; either may be absent.
    pub fn cleanup_failed_job(&self, bag_dir: &Path) -> PackagerResult<()> {
        if bag_dir.is_dir() {
            fs::remove_dir_all(bag_dir)?;
        }
        match fs::remove_file(archive_path(bag_dir)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        debug!("Cleanup from failed job completed.");
        Ok(())
    }

    pub async fn deliver_success_notification(&self) -> PackagerResult<()> {
        self.services
            .notifier
            .publish(&Notification::success(&self.settings.refid))
            .await?;
        debug!("Success notification delivered.");
        Ok(())
    }

    pub async fn deliver_failure_notification(
        &self,
        error: &PackagerError,
    ) -> PackagerResult<()> {
        self.services
            .notifier
            .publish(&Notification::failure(&self.settings.refid, error))
            .await?;
        debug!("Failure notification delivered.");
        Ok(())
    }
}

pub fn bag_info(uri: &str, start_date: &str, end_date: &str, rights_ids: &[String]) -> BagInfo {
    BagInfo::new()
        .with_tag("ArchivesSpace-URI", uri)
        .with_tag("Start-Date", start_date)
        .with_tag("End-Date", end_date)
        .with_tag("Origin", ORIGIN)
        .with_tags("Rights-ID", rights_ids.iter().cloned())
        .with_tag("BagIt-Profile-Identifier", BAGIT_PROFILE)
}

/// Recursively copies `source` to a new directory `dest`, following symlinks.
pub fn copy_tree(source: &Path, dest: &Path) -> PackagerResult<()> {
    if !source.is_dir() {
        return Err(PackagerError::SourceMissing {
            path: source.to_path_buf(),
        });
    }
    if dest.exists() {
        return Err(PackagerError::DestinationExists {
            path: dest.to_path_buf(),
        });
    }

    fs::create_dir_all(dest)?;
    for entry in WalkDir::new(source).min_depth(1).follow_links(true) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| PackagerError::SourceMissing {
                path: entry.path().to_path_buf(),
            })?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
