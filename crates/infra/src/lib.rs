//! Infrastructure layer: provider client, delivery queue, durable storage,
//! configuration.

pub mod config;
pub mod files;
pub mod provider;
pub mod queue;
pub mod storage;

pub use config::Config;
pub use files::{FileStore, FileStoreError, InMemoryFileStore, LocalFileStore};
pub use provider::OpenAiImageProvider;
pub use queue::{DeliveryQueue, WorkerPool};
