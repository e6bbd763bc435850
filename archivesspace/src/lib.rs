pub mod api;
pub mod client;
pub mod config;
pub mod dates;
pub mod types;

pub use api::{ArchivesSpaceApi, ArchivesSpaceError, ArchivesSpaceResult};
pub use client::ArchivesSpaceClient;
pub use config::ArchivesSpaceConfig;
pub use dates::{date_range, format_date_range};
pub use types::{ArchivalObject, DateRecord, FindByIdResponse, RecordRef};

pub mod prelude {
    pub use crate::api::*;
    pub use crate::client::*;
    pub use crate::config::*;
    pub use crate::dates::*;
    pub use crate::types::*;
}
