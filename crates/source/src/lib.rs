pub mod adapter;
pub mod cache;
pub mod error;
pub mod local;
pub mod remote;

pub use adapter::{Origin, Resolution, SourceAdapter};
pub use cache::{CacheStats, CachedDocument, DocumentCache};
pub use error::SourceError;
pub use local::LocalStore;
pub use remote::{HttpRemoteSource, RemoteSource};
