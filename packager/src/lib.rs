pub mod aws;
pub mod deploy;
pub mod notification;
pub mod pipeline;
pub mod services;
pub mod settings;

pub use aws::{AwsContext, S3PackageStore, SnsNotifier, SsmParameterStore};
pub use deploy::{
    execute, plan_for_branch, DeployEnvironment, DeployError, DeployResult, DeployStep,
};
pub use notification::{error_chain, Notification, Outcome, SERVICE_NAME};
pub use pipeline::{bag_info, copy_tree, Packager, PackagerError, PackagerResult};
pub use services::{
    ArchivesSpaceConnector, CatalogConnector, Notifier, PackageStore, ParameterStore,
    ServiceError, ServiceResult, Services,
};
pub use settings::{JobSettings, PackageArgs};

pub mod prelude {
    pub use crate::aws::AwsContext;
    pub use crate::notification::{error_chain, Notification, SERVICE_NAME};
    pub use crate::pipeline::{Packager, PackagerError, PackagerResult};
    pub use crate::services::*;
    pub use crate::settings::{JobSettings, PackageArgs};
}
