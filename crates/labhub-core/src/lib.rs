pub mod config;
pub mod error;
pub mod types;

pub use config::LabhubConfig;
pub use error::{LabhubError, Result};
pub use types::{ConnId, GroupKey, TenantKind};
