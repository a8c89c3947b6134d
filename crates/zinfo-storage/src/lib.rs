//! zinfo-storage: random-access layer sources for the span orchestrator
//!
//! - `operator`: OpenDAL operator factories (S3-compatible or local filesystem)
//! - `source`: `RangeSource` implementations over an operator or a local file

pub mod operator;
pub mod source;

pub use operator::{
    build_from_core_config, build_fs_operator, build_operator, Credentials, StorageConfig,
};
pub use source::{FileSource, OperatorSource};
