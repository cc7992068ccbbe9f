//! Engine assembly and lifecycle: configuration plus the
//! [`WorkflowEngine`] façade.

mod config;
mod engine;

pub use config::{
    CompressionCodec, ConfigError, EngineConfig, PersistenceBackend, SerializationFormat,
};
pub use engine::{EngineError, WorkflowEngine};
