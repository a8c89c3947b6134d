pub mod config;
pub mod error;
pub mod types;

pub use error::{ZinfoError, ZinfoResult};
pub use types::{FileMetadata, Offset, SpanId, Toc};
