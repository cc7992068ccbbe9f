//! Engine-level configuration: persistence, codecs, checkpointing.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::CheckpointPolicy;

/// Where execution state lives.
///
/// Only [`PersistenceBackend::Memory`] is implemented in-process; the other
/// variants name pluggable backends and are rejected by
/// [`EngineConfig::validate`] until one is wired in.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBackend {
    #[default]
    Memory,
    Disk,
    Database,
    Distributed,
}

/// Serialization format for persisted state and checkpoints.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SerializationFormat {
    #[default]
    Json,
    Binary,
    Protobuf,
    Custom,
}

/// Compression applied to serialized checkpoints.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompressionCodec {
    #[default]
    None,
    Gzip,
    Lz4,
    Custom,
}

/// A configuration selection the engine cannot honor.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("persistence backend {0:?} is not available; only 'memory' is built in")]
    #[diagnostic(code(gridflow::runtime::unsupported_persistence))]
    UnsupportedPersistence(PersistenceBackend),

    #[error("serialization format {0:?} is not available; only 'json' is built in")]
    #[diagnostic(code(gridflow::runtime::unsupported_serialization))]
    UnsupportedSerialization(SerializationFormat),

    #[error("compression codec {0:?} is not available; only 'none' is built in")]
    #[diagnostic(code(gridflow::runtime::unsupported_compression))]
    UnsupportedCompression(CompressionCodec),
}

const DEFAULT_MAX_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// Top-level engine configuration.
///
/// `max_size_bytes` and `versioning` are recorded for persistence backends;
/// the in-memory backend does not enforce them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub persistence: PersistenceBackend,
    pub serialization: SerializationFormat,
    pub compression: CompressionCodec,
    pub max_size_bytes: u64,
    pub versioning: bool,
    pub checkpointing: CheckpointPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persistence: PersistenceBackend::default(),
            serialization: SerializationFormat::default(),
            compression: CompressionCodec::default(),
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            versioning: true,
            checkpointing: CheckpointPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Reject selections with no built-in implementation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.persistence != PersistenceBackend::Memory {
            return Err(ConfigError::UnsupportedPersistence(self.persistence));
        }
        if self.serialization != SerializationFormat::Json {
            return Err(ConfigError::UnsupportedSerialization(self.serialization));
        }
        if self.compression != CompressionCodec::None {
            return Err(ConfigError::UnsupportedCompression(self.compression));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_checkpointing(mut self, checkpointing: CheckpointPolicy) -> Self {
        self.checkpointing = checkpointing;
        self
    }
}
