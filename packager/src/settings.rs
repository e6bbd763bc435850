use clap::Args;
use std::path::PathBuf;

/// Job inputs, normally provided to the ECS task as environment variables
#[derive(Debug, Clone, Args)]
pub struct PackageArgs {
    /// ArchivesSpace ref id of the digitized archival object
    #[arg(long, env = "REFID")]
    pub refid: String,
    /// Comma-separated rights statement identifiers
    #[arg(long, env = "RIGHTS_IDS")]
    pub rights_ids: String,
    /// AWS region for SSM, S3 and SNS
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub region: String,
    /// IAM role assumed for all AWS calls
    #[arg(long, env = "AWS_ROLE_ARN")]
    pub role_arn: Option<String>,
    /// Working directory for bags and archives
    #[arg(long, env = "TMP_DIR")]
    pub tmp_dir: PathBuf,
    /// Directory holding one sub-directory of files per ref id
    #[arg(long, env = "SOURCE_DIR")]
    pub source_dir: PathBuf,
    /// Bucket receiving finished packages
    #[arg(long, env = "AWS_DESTINATION_BUCKET")]
    pub destination_bucket: String,
    /// Topic ARN for outcome notifications
    #[arg(long, env = "AWS_SNS_TOPIC")]
    pub sns_topic: String,
    /// Deployment environment, first segment of the parameter path
    #[arg(long = "env", env = "ENV")]
    pub environment: String,
    /// Application segment of the parameter path
    #[arg(long, env = "APP_CONFIG_PATH")]
    pub app_config_path: String,
}

impl PackageArgs {
    pub fn into_settings(self) -> Result<JobSettings, String> {
        let settings = JobSettings {
            ssm_parameter_path: ssm_parameter_path(&self.environment, &self.app_config_path),
            refid: self.refid.trim().to_string(),
            rights_ids: parse_rights_ids(&self.rights_ids),
            region: self.region,
            role_arn: self.role_arn.filter(|arn| !arn.trim().is_empty()),
            tmp_dir: self.tmp_dir,
            source_dir: self.source_dir,
            destination_bucket: self.destination_bucket,
            sns_topic: self.sns_topic,
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Validated settings for one packaging job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    pub refid: String,
    pub rights_ids: Vec<String>,
    pub region: String,
    pub role_arn: Option<String>,
    pub tmp_dir: PathBuf,
    pub source_dir: PathBuf,
    pub destination_bucket: String,
    pub sns_topic: String,
    pub ssm_parameter_path: String,
}

impl JobSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.refid.is_empty() {
            return Err("Ref id cannot be empty".to_string());
        }

        if self.refid.contains(['/', '\\']) || self.refid == "." || self.refid == ".." {
            return Err(format!(
                "Ref id must be a single path segment, got {:?}",
                self.refid
            ));
        }

        if self.rights_ids.is_empty() {
            return Err("At least one rights id is required".to_string());
        }

        if self.destination_bucket.trim().is_empty() {
            return Err("Destination bucket cannot be empty".to_string());
        }

        if self.sns_topic.trim().is_empty() {
            return Err("SNS topic cannot be empty".to_string());
        }

        Ok(())
    }
}

/// Splits a comma-separated list, trimming entries and dropping empty ones.
pub fn parse_rights_ids(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn ssm_parameter_path(environment: &str, app_config_path: &str) -> String {
    format!(
        "/{}/{}",
        environment.trim_matches('/'),
        app_config_path.trim_matches('/')
    )
}
