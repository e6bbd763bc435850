use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

pub const PARAM_BASE_URL: &str = "AS_BASEURL";
pub const PARAM_USERNAME: &str = "AS_USERNAME";
pub const PARAM_PASSWORD: &str = "AS_PASSWORD";
pub const PARAM_REPOSITORY: &str = "AS_REPO";

#[derive(Clone, Serialize, Deserialize)]
pub struct ArchivesSpaceConfig {
    pub base_url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub repository: String,
    pub timeout: Duration,
}

impl Default for ArchivesSpaceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8089".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            repository: "2".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl fmt::Debug for ArchivesSpaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchivesSpaceConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("repository", &self.repository)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ArchivesSpaceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a config from Parameter Store values keyed by parameter name
    /// (`AS_BASEURL`, `AS_USERNAME`, `AS_PASSWORD`, `AS_REPO`).
    pub fn from_parameters(parameters: &HashMap<String, String>) -> Result<Self, String> {
        let lookup = |name: &str| {
            parameters
                .get(name)
                .cloned()
                .ok_or_else(|| format!("Missing configuration parameter {}", name))
        };

        let config = Self {
            base_url: lookup(PARAM_BASE_URL)?,
            username: lookup(PARAM_USERNAME)?,
            password: lookup(PARAM_PASSWORD)?,
            repository: lookup(PARAM_REPOSITORY)?,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("Base URL cannot be empty".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("Base URL must start with http:// or https://".to_string());
        }

        if self.username.is_empty() {
            return Err("Username cannot be empty".to_string());
        }

        if self.repository.is_empty() || !self.repository.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!(
                "Repository must be a numeric identifier, got {:?}",
                self.repository
            ));
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters() -> HashMap<String, String> {
        [
            ("AS_BASEURL", "https://aspace.example.org/api"),
            ("AS_USERNAME", "packager"),
            ("AS_PASSWORD", "secret"),
            ("AS_REPO", "2"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_default_config() {
        let config = ArchivesSpaceConfig::default();
        assert_eq!(config.base_url, "http://localhost:8089");
        assert_eq!(config.repository, "2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ArchivesSpaceConfig::new()
            .with_base_url("https://aspace.example.org/api")
            .with_credentials("user", "pass")
            .with_repository("5")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(config.base_url, "https://aspace.example.org/api");
        assert_eq!(config.username, "user");
        assert_eq!(config.password, "pass");
        assert_eq!(config.repository, "5");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ArchivesSpaceConfig::default();

        config.base_url = "".to_string();
        assert!(config.validate().is_err());

        config.base_url = "aspace.example.org".to_string();
        assert!(config.validate().is_err());

        config.base_url = "http://localhost:8089".to_string();
        config.repository = "two".to_string();
        assert!(config.validate().is_err());

        config.repository = "2".to_string();
        config.username = "".to_string();
        assert!(config.validate().is_err());

        config.username = "admin".to_string();
        config.timeout = Duration::from_secs(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_parameters() {
        let config = ArchivesSpaceConfig::from_parameters(&parameters()).unwrap();
        assert_eq!(config.base_url, "https://aspace.example.org/api");
        assert_eq!(config.username, "packager");
        assert_eq!(config.password, "secret");
        assert_eq!(config.repository, "2");
    }

    #[test]
    fn test_from_parameters_missing_value() {
        let mut params = parameters();
        params.remove("AS_PASSWORD");
        let err = ArchivesSpaceConfig::from_parameters(&params).unwrap_err();
        assert_eq!(err, "Missing configuration parameter AS_PASSWORD");
    }

    #[test]
    fn test_password_not_exposed() {
        let config = ArchivesSpaceConfig::default().with_credentials("user", "hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
    }
}
