pub mod backup;
pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod integrity;
pub mod lock;
pub mod registry;
pub mod store;
pub mod validation;

pub use backup::{BackupInfo, BackupScheduler, BackupSnapshot, BackupStatus, CleanupReport};
pub use config::{Shape, StoreConfig};
pub use error::{Result, StoreError};
pub use integrity::IntegrityReport;
pub use store::{LoadSource, Loaded, RestoreReport, Store};
