//! Feature registry, bit assignment, and IL-injection hooks (§4.4, §6).
//!
//! Features register with a `FeatureRegistry`, each claiming one bit of
//! a 64-bit `FeatureSet`. A scheduler job (`instrument-scheduler`) forks
//! a shader's `Program`, then calls `FeatureRegistry::inject_all` with
//! the job's effective feature set before handing the program back to
//! its backend (`instrument-bitcode`/`instrument-spir`) for recompile.

pub mod export;
pub mod feature;
pub mod message;
pub mod registry;
pub mod writing_negative_value;

pub use export::{ExportField, ExportSchema, ExportSchemaSink};
pub use feature::Feature;
pub use message::MessageSink;
pub use registry::{FeatureId, FeatureRegistry, FeatureSet};
pub use writing_negative_value::WritingNegativeValue;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("feature set exhausted: at most 64 features may be registered")]
    FeatureSetExhausted,
    #[error("feature refused installation")]
    FeatureInstallFailed,
}

pub type Result<T> = std::result::Result<T, Error>;
