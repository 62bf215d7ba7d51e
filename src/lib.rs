// PhotonDB Index - Rust Implementation
// An embedded, single-writer cross-reference index store

#![warn(rust_2018_idioms)]

pub mod buffer;
pub mod codec;
pub mod config;
pub mod progress;
pub mod registry;
pub mod session;
pub mod settings;
pub mod storage;
pub mod telemetry;

// Re-exports for convenience
pub use buffer::{ByteArray, ByteArrayList};
pub use codec::{CodecProfile, OptimizedStringCodec, PlainStringCodec, StringCodec, StringPool};
pub use config::{
    Configuration, ConfigurationBuilder, ContributorInfo, Layer, LayerInfo, LayerKind,
    ProcessorInfo,
};
pub use session::{Index, IndexSession, IndexTransaction, SessionRegistry};
pub use settings::IndexSettings;

/// Index error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        // Configuration errors: fatal at build time, never retried.
        #[error("Duplicate layer: {0}")]
        DuplicateLayer(String),

        #[error("Duplicate processor: {0}")]
        DuplicateProcessor(String),

        #[error("Unknown processor: {0}")]
        UnknownProcessor(String),

        #[error("Unknown layer: {0}")]
        UnknownLayer(String),

        #[error("Configuration already built")]
        AlreadyBuilt,

        #[error("Malformed registry record: {0}")]
        MalformedRecord(String),

        #[error("Plugin '{plugin}' contributed an invalid configuration: {source}")]
        Registry {
            plugin: String,
            #[source]
            source: Box<Error>,
        },

        // Version mismatch: the caller rebuilds.
        #[error("Index requires full rebuild: {0}")]
        RequiresFullRebuild(String),

        // Possibly transient; the caller backs off and retries.
        #[error("Index temporarily non-operational: {0}")]
        StorageUnavailable(String),

        // Programmer errors.
        #[error("Index session {0} has been disposed")]
        SessionDisposed(u64),

        #[error("Another index session is already live")]
        ConcurrentSession,

        #[error("Corrupted index data: {0}")]
        Corruption(String),

        #[error("String encoding failed: {0}")]
        Codec(String),

        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Serialization error: {0}")]
        Serialization(String),

        #[error("Settings error: {0}")]
        Settings(String),

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),
    }

    impl Error {
        /// Errors the caller should answer by rebuilding the index from scratch.
        pub fn requires_rebuild(&self) -> bool {
            matches!(self, Error::RequiresFullRebuild(_) | Error::Corruption(_))
        }

        /// Errors that may go away if the operation is attempted again later.
        pub fn is_recoverable(&self) -> bool {
            matches!(self, Error::StorageUnavailable(_) | Error::Io(_))
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::error::Error;

    #[test]
    fn test_error_classification() {
        assert!(Error::RequiresFullRebuild("marker".into()).requires_rebuild());
        assert!(Error::Corruption("tail".into()).requires_rebuild());
        assert!(Error::StorageUnavailable("busy".into()).is_recoverable());
        assert!(!Error::ConcurrentSession.is_recoverable());
        assert!(!Error::SessionDisposed(3).requires_rebuild());
    }

    #[test]
    fn test_registry_error_keeps_plugin_identity() {
        let err = Error::Registry {
            plugin: "org.example.refs".to_string(),
            source: Box::new(Error::DuplicateLayer("refs".to_string())),
        };
        let message = err.to_string();
        assert!(message.contains("org.example.refs"));
        assert!(message.contains("Duplicate layer: refs"));
    }
}
