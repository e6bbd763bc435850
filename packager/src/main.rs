use clap::{Parser, Subcommand};
use packager::deploy::{self, DeployEnvironment};
use packager::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "packager")]
#[command(about = "Packages digitized archival objects as BagIt archives")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package one ref id and deliver it to the destination bucket
    Package(PackageArgs),
    /// Show or run the deploy steps for a branch
    Deploy {
        /// Branch that was pushed
        #[arg(short, long, env = "BRANCH")]
        branch: String,
        /// Image name passed to the deploy scripts
        #[arg(long, env = "APP_NAME", default_value = SERVICE_NAME)]
        app_name: String,
        /// Directory holding the deploy scripts
        #[arg(long, default_value = "deploy_scripts")]
        scripts_dir: PathBuf,
        /// Run the scripts instead of only printing them
        #[arg(long)]
        execute: bool,
    },
}

fn init_tracing() {
    let filter = log_filter(
        std::env::var("RUST_LOG").ok(),
        std::env::var("LOGGING_LEVEL").ok(),
    );
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// `RUST_LOG` wins, then `LOGGING_LEVEL`, then `info`.
fn log_filter(rust_log: Option<String>, logging_level: Option<String>) -> EnvFilter {
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
    non_empty(rust_log)
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| {
            non_empty(logging_level)
                .and_then(|level| EnvFilter::try_new(level_directive(&level)).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Numeric logging levels (`10`, `20`, ...) become the matching tracing
/// level. Any other value is used as a filter directive.
fn level_directive(value: &str) -> String {
    let value = value.trim();
    match value.parse::<u32>() {
        Ok(level) if level < 10 => "trace".to_string(),
        Ok(level) if level < 20 => "debug".to_string(),
        Ok(level) if level < 30 => "info".to_string(),
        Ok(level) if level < 40 => "warn".to_string(),
        Ok(_) => "error".to_string(),
        Err(_) => value.to_string(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Package(args) => run_package(args).await,
        Commands::Deploy {
            branch,
            app_name,
            scripts_dir,
            execute,
        } => run_deploy(&branch, &app_name, scripts_dir, execute),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", error_chain(err.as_ref()));
            ExitCode::FAILURE
        }
    }
}

async fn run_package(args: PackageArgs) -> Result<(), Box<dyn std::error::Error>> {
    let settings = args.into_settings()?;
    let aws = AwsContext::load(&settings.region, settings.role_arn.as_deref()).await;

    let services = Services {
        parameters: Arc::new(aws.parameter_store()),
        storage: Arc::new(aws.package_store(settings.destination_bucket.clone())),
        notifier: Arc::new(aws.notifier(settings.sns_topic.clone())),
        catalog: Arc::new(ArchivesSpaceConnector),
    };

    let mut packager = Packager::new(settings, services)?;
    packager.run().await?;
    Ok(())
}

fn run_deploy(
    branch: &str,
    app_name: &str,
    scripts_dir: PathBuf,
    execute: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let steps = deploy::plan_for_branch(branch, app_name);
    if steps.is_empty() {
        info!("Nothing to deploy for branch {}", branch);
        return Ok(());
    }

    for step in &steps {
        println!("{}", step);
    }

    if execute {
        deploy::execute(&steps, &scripts_dir, &DeployEnvironment::new(app_name))?;
        info!("Deployed {} from branch {}", app_name, branch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_logging_levels() {
        assert_eq!(level_directive("10"), "debug");
        assert_eq!(level_directive("20"), "info");
        assert_eq!(level_directive(" 30 "), "warn");
        assert_eq!(level_directive("40"), "error");
        assert_eq!(level_directive("50"), "error");
        assert_eq!(level_directive("5"), "trace");
    }

    #[test]
    fn test_named_logging_levels_pass_through() {
        assert_eq!(level_directive("debug"), "debug");
        assert_eq!(level_directive("packager=trace"), "packager=trace");
    }

    #[test]
    fn test_log_filter_precedence() {
        let filter = log_filter(None, Some("20".to_string()));
        assert_eq!(filter.to_string(), "info");

        let filter = log_filter(Some("packager=debug".to_string()), Some("40".to_string()));
        assert_eq!(filter.to_string(), "packager=debug");

        let filter = log_filter(Some(" ".to_string()), Some("40".to_string()));
        assert_eq!(filter.to_string(), "error");

        assert_eq!(log_filter(None, None).to_string(), "info");
    }
}
