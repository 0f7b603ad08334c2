// Store configuration: data directory, lock tuning, backups, document registry

mod parser;
mod types;

pub use parser::{parse_config, parse_config_str};
pub use types::{
    default_documents, BackupConfig, CacheConfig, DocumentDefinition, LockConfig, Shape,
    StoreConfig,
};
