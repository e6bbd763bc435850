use crate::api::{ArchivesSpaceApi, ArchivesSpaceError, ArchivesSpaceResult};
use crate::config::ArchivesSpaceConfig;
use crate::types::{ArchivalObject, DateRecord, FindByIdResponse, SessionResponse};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

pub const SESSION_HEADER: &str = "X-ArchivesSpace-Session";

/// Authenticated client for the ArchivesSpace backend API
pub struct ArchivesSpaceClient {
    http_client: reqwest::Client,
    base_url: String,
    repository: String,
    session: String,
}

impl ArchivesSpaceClient {
    /// Validates the config and opens a session with the backend.
    pub async fn connect(config: ArchivesSpaceConfig) -> ArchivesSpaceResult<Self> {
        config
            .validate()
            .map_err(|message| ArchivesSpaceError::InvalidConfig { message })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ArchivesSpaceError::InvalidConfig {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        let session = Self::login(&http_client, &config).await?;
        info!("Authenticated with ArchivesSpace at {}", config.base_url);

        Ok(Self {
            http_client,
            base_url: config.base_url,
            repository: config.repository,
            session,
        })
    }

    async fn login(
        http_client: &reqwest::Client,
        config: &ArchivesSpaceConfig,
    ) -> ArchivesSpaceResult<String> {
        let url = build_url(
            &config.base_url,
            &format!("users/{}/login", config.username),
        );
        let response = http_client
            .post(&url)
            .form(&[("password", config.password.as_str())])
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(ArchivesSpaceError::Authentication {
                username: config.username.clone(),
            });
        }

        let response = response
            .error_for_status()
            .map_err(Self::handle_http_error)?;
        let body = response.text().await?;
        let session: SessionResponse = serde_json::from_str(&body)?;
        Ok(session.session)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ArchivesSpaceResult<T> {
        let url = build_url(&self.base_url, path);
        debug!("GET {} {:?}", url, query);

        let response = self
            .http_client
            .get(&url)
            .header(SESSION_HEADER, &self.session)
            .query(query)
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ArchivesSpaceError::NotFound {
                uri: path.to_string(),
            });
        }

        let response = response
            .error_for_status()
            .map_err(Self::handle_http_error)?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    fn handle_http_error(err: reqwest::Error) -> ArchivesSpaceError {
        if err.is_timeout() {
            ArchivesSpaceError::ServiceUnavailable {
                message: "Request timeout".to_string(),
            }
        } else if err.is_connect() {
            ArchivesSpaceError::ServiceUnavailable {
                message: "Cannot connect to ArchivesSpace".to_string(),
            }
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                401 | 403 => ArchivesSpaceError::Authentication {
                    username: "current session".to_string(),
                },
                503 => ArchivesSpaceError::ServiceUnavailable {
                    message: "ArchivesSpace service unavailable".to_string(),
                },
                _ => ArchivesSpaceError::Network(err),
            }
        } else {
            ArchivesSpaceError::Network(err)
        }
    }
}

#[async_trait]
impl ArchivesSpaceApi for ArchivesSpaceClient {
    async fn archival_object_uri(&self, refid: &str) -> ArchivesSpaceResult<String> {
        let path = find_by_id_path(&self.repository);
        let response: FindByIdResponse = self.get_json(&path, &[("ref_id[]", refid)]).await?;
        unique_uri(response, &format!("{}?ref_id[]={}", path, refid))
    }

    async fn closest_dates(&self, uri: &str) -> ArchivesSpaceResult<Vec<DateRecord>> {
        let object: ArchivalObject = self.get_json(uri, &[("resolve[]", "ancestors")]).await?;
        object
            .closest_dates()
            .map(<[DateRecord]>::to_vec)
            .ok_or_else(|| ArchivesSpaceError::NoDates {
                uri: uri.to_string(),
            })
    }

    fn repository(&self) -> &str {
        &self.repository
    }
}

/// Joins a base URL and an API path with exactly one slash between them.
pub fn build_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub fn find_by_id_path(repository: &str) -> String {
    format!("repositories/{}/find_by_id/archival_objects", repository)
}

/// Returns the single archival object URI in a find-by-id response.
pub fn unique_uri(response: FindByIdResponse, search: &str) -> ArchivesSpaceResult<String> {
    let count = response.archival_objects.len();
    match <[_; 1]>::try_from(response.archival_objects) {
        Ok([record]) => Ok(record.uri),
        Err(_) => Err(ArchivesSpaceError::UnexpectedResultCount {
            count,
            search: search.to_string(),
        }),
    }
}
