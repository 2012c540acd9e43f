pub mod archive;
pub mod backend_client;
pub mod drivers;
pub mod s3_transport;
pub mod status_resolver;
pub mod storage;
pub mod transport;

pub use archive::{ArchiveClient, ArchiveJobApi, OmicsArchive};
pub use backend_client::{BackendClient, RetryPolicy};
pub use drivers::{
    is_archival_reference, ArchivalDriver, Capabilities, PrimaryDriver, ReducedDriver,
    RestoreOptions, StorageBackend,
};
pub use s3_transport::S3Transport;
pub use storage::Storage;
pub use transport::{ErrorClass, ObjectTransport, RestoreTier, TransportError};
