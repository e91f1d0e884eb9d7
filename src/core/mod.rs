pub mod atomic_config;
pub mod engine_config;
pub mod factory;
pub mod generator;
pub mod pipeline;
pub mod version;

pub use atomic_config::{AtomicConfig, UpdateError, Validate};
pub use engine_config::EngineConfig;
pub use factory::ProtocolFactory;
pub use generator::{Compilation, GenerateError, SingboxGenerator, SkippedProtocol};
pub use pipeline::{ConfigPipeline, PipelineError};
pub use version::Dialect;
