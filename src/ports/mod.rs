pub mod cert_resolver;
pub mod config_provider;
pub mod deployer;
pub mod version_probe;

pub use cert_resolver::{CertPaths, CertificateError, CertificateResolver};
pub use config_provider::ConfigProvider;
pub use deployer::EngineDeployer;
pub use version_probe::VersionProbe;
