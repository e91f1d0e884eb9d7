pub mod cert_store;
pub mod config_providers;
pub mod deployer;
pub mod version_probe;

/// Re-export commonly used types from adapters
pub use cert_store::FsCertificateResolver;
pub use config_providers::FileConfigProvider;
pub use deployer::FileDeployer;
pub use version_probe::{CommandVersionProbe, StaticVersionProbe};
