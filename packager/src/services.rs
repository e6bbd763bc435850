use crate::notification::Notification;
use archivesspace::{
    ArchivesSpaceApi, ArchivesSpaceClient, ArchivesSpaceConfig, ArchivesSpaceResult,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Parameter Store request failed: {message}")]
    ParameterStore { message: String },

    #[error("Upload failed: {message}")]
    Storage { message: String },

    #[error("Notification failed: {message}")]
    Notification { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Source of service configuration
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Parameters directly under `path`, keyed by the last segment of
    /// their name.
    async fn parameters_by_path(&self, path: &str) -> ServiceResult<HashMap<String, String>>;
}

/// Destination for finished packages
#[async_trait]
pub trait PackageStore: Send + Sync {
    async fn upload(&self, path: &Path, key: &str, content_type: &str) -> ServiceResult<()>;

    fn destination(&self) -> &str;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &Notification) -> ServiceResult<()>;
}

/// Opens an ArchivesSpace session once configuration is known
#[async_trait]
pub trait CatalogConnector: Send + Sync {
    async fn connect(
        &self,
        config: ArchivesSpaceConfig,
    ) -> ArchivesSpaceResult<Box<dyn ArchivesSpaceApi>>;
}

pub struct ArchivesSpaceConnector;

#[async_trait]
impl CatalogConnector for ArchivesSpaceConnector {
    async fn connect(
        &self,
        config: ArchivesSpaceConfig,
    ) -> ArchivesSpaceResult<Box<dyn ArchivesSpaceApi>> {
        let client = ArchivesSpaceClient::connect(config).await?;
        Ok(Box::new(client))
    }
}

/// External collaborators of a packaging job
#[derive(Clone)]
pub struct Services {
    pub parameters: Arc<dyn ParameterStore>,
    pub storage: Arc<dyn PackageStore>,
    pub notifier: Arc<dyn Notifier>,
    pub catalog: Arc<dyn CatalogConnector>,
}

/// Last `/`-separated segment of a parameter name.
pub fn parameter_key(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
