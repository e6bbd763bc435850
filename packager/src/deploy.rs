//! Branch-driven deployment of the packaging image.
//!
//! Pushes to `development` publish a fresh image to ECR; pushes to `base`
//! promote the current `dev` image to `prod`. Other branches deploy nothing.

use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

pub const DEVELOPMENT_BRANCH: &str = "development";
pub const BASE_BRANCH: &str = "base";

pub const PUSH_IMAGE_SCRIPT: &str = "push_image_to_ecr.sh";
pub const ADD_TAG_SCRIPT: &str = "add_tag_to_image.sh";

pub const DEV_TAG: &str = "dev";
pub const PROD_TAG: &str = "prod";

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Deploy script not found: {path}")]
    ScriptNotFound { path: PathBuf },

    #[error("Deploy script {script} failed with status {status:?}")]
    ScriptFailed { script: String, status: Option<i32> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployStep {
    PushImage {
        app_name: String,
    },
    AddTag {
        app_name: String,
        source_tag: String,
        dest_tag: String,
    },
}

impl DeployStep {
    pub fn script(&self) -> &'static str {
        match self {
            DeployStep::PushImage { .. } => PUSH_IMAGE_SCRIPT,
            DeployStep::AddTag { .. } => ADD_TAG_SCRIPT,
        }
    }

    pub fn args(&self) -> Vec<String> {
        match self {
            DeployStep::PushImage { app_name } => vec![app_name.clone()],
            DeployStep::AddTag {
                app_name,
                source_tag,
                dest_tag,
            } => vec![app_name.clone(), source_tag.clone(), dest_tag.clone()],
        }
    }

    /// `bash <scripts_dir>/<script> <args>` with the deploy environment set.
    pub fn command(&self, scripts_dir: &Path, env: &DeployEnvironment) -> Command {
        let mut command = Command::new("bash");
        command
            .arg(scripts_dir.join(self.script()))
            .args(self.args())
            .env("TIMESTAMP", &env.timestamp)
            .env("APP_NAME", &env.app_name);
        command
    }
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.script(), self.args().join(" "))
    }
}

/// Variables exported to every deploy script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployEnvironment {
    pub timestamp: String,
    pub app_name: String,
}

impl DeployEnvironment {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            app_name: app_name.into(),
        }
    }
}

/// Steps to run for a push to `branch`.
pub fn plan_for_branch(branch: &str, app_name: &str) -> Vec<DeployStep> {
    match branch {
        DEVELOPMENT_BRANCH => vec![DeployStep::PushImage {
            app_name: app_name.to_string(),
        }],
        BASE_BRANCH => vec![DeployStep::AddTag {
            app_name: app_name.to_string(),
            source_tag: DEV_TAG.to_string(),
            dest_tag: PROD_TAG.to_string(),
        }],
        _ => Vec::new(),
    }
}

/// Runs each step in order, stopping at the first failure.
pub fn execute(
    steps: &[DeployStep],
    scripts_dir: &Path,
    env: &DeployEnvironment,
) -> DeployResult<()> {
    for step in steps {
        let script = scripts_dir.join(step.script());
        if !script.is_file() {
            return Err(DeployError::ScriptNotFound { path: script });
        }

        info!("Running {}", step);
        let status = step.command(scripts_dir, env).status()?;
        if !status.success() {
            return Err(DeployError::ScriptFailed {
                script: step.script().to_string(),
                status: status.code(),
            });
        }
        debug!("{} completed", step.script());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn test_development_branch_pushes_image() {
        let steps = plan_for_branch("development", "digitized_image_packaging");
        assert_eq!(
            steps,
            vec![DeployStep::PushImage {
                app_name: "digitized_image_packaging".to_string()
            }]
        );
        assert_eq!(steps[0].script(), "push_image_to_ecr.sh");
        assert_eq!(steps[0].args(), vec!["digitized_image_packaging"]);
    }

    #[test]
    fn test_base_branch_promotes_dev_to_prod() {
        let steps = plan_for_branch("base", "app");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].script(), "add_tag_to_image.sh");
        assert_eq!(steps[0].args(), vec!["app", "dev", "prod"]);
        assert_eq!(steps[0].to_string(), "add_tag_to_image.sh app dev prod");
    }

    #[test]
    fn test_other_branches_deploy_nothing() {
        assert!(plan_for_branch("feature/foo", "app").is_empty());
        assert!(plan_for_branch("", "app").is_empty());
        assert!(plan_for_branch("Development", "app").is_empty());
    }

    #[test]
    fn test_timestamp_format() {
        let env = DeployEnvironment::new("app");
        assert_eq!(env.timestamp.len(), 14);
        assert!(env.timestamp.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(env.app_name, "app");
    }

    #[test]
    fn test_command_environment() {
        let env = DeployEnvironment {
            timestamp: "20240101120000".to_string(),
            app_name: "app".to_string(),
        };
        let step = DeployStep::PushImage {
            app_name: "app".to_string(),
        };
        let command = step.command(Path::new("deploy_scripts"), &env);

        assert_eq!(command.get_program(), "bash");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args.len(), 2);
        assert_eq!(
            args[0],
            Path::new("deploy_scripts")
                .join("push_image_to_ecr.sh")
                .as_os_str()
        );
        assert_eq!(args[1], "app");

        let envs: Vec<_> = command.get_envs().collect();
        assert!(envs.contains(&(
            OsStr::new("TIMESTAMP"),
            Some(OsStr::new("20240101120000"))
        )));
        assert!(envs.contains(&(OsStr::new("APP_NAME"), Some(OsStr::new("app")))));
    }

    #[test]
    fn test_missing_script() {
        let tmp = tempfile::tempdir().unwrap();
        let steps = plan_for_branch("development", "app");
        let result = execute(&steps, tmp.path(), &DeployEnvironment::new("app"));
        assert!(matches!(result, Err(DeployError::ScriptNotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_runs_scripts_with_environment() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out.txt");
        std::fs::write(
            tmp.path().join(ADD_TAG_SCRIPT),
            format!(
                "echo \"$APP_NAME $TIMESTAMP $1 $2 $3\" > \"{}\"\n",
                out.display()
            ),
        )
        .unwrap();

        let env = DeployEnvironment {
            timestamp: "20240101120000".to_string(),
            app_name: "app".to_string(),
        };
        execute(&plan_for_branch("base", "app"), tmp.path(), &env).unwrap();

        let written = std::fs::read_to_string(out).unwrap();
        assert_eq!(written.trim(), "app 20240101120000 app dev prod");
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_stops_on_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("tagged.txt");
        std::fs::write(tmp.path().join(PUSH_IMAGE_SCRIPT), "exit 3\n").unwrap();
        std::fs::write(
            tmp.path().join(ADD_TAG_SCRIPT),
            format!("touch \"{}\"\n", marker.display()),
        )
        .unwrap();

        let steps = vec![
            DeployStep::PushImage {
                app_name: "app".to_string(),
            },
            DeployStep::AddTag {
                app_name: "app".to_string(),
                source_tag: DEV_TAG.to_string(),
                dest_tag: PROD_TAG.to_string(),
            },
        ];
        let result = execute(&steps, tmp.path(), &DeployEnvironment::new("app"));
        match result {
            Err(DeployError::ScriptFailed { script, status }) => {
                assert_eq!(script, PUSH_IMAGE_SCRIPT);
                assert_eq!(status, Some(3));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!marker.exists());
    }
}
