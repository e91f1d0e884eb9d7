use async_trait::async_trait;
use eyre::Result;
use tokio::sync::mpsc;

use crate::config::models::DomainConfig;

/// Trait for configuration providers that can load and watch for configuration changes.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Load, migrate and validate the current configuration.
    async fn load_config(&self) -> Result<DomainConfig>;

    /// Return a channel that signals when the configuration has changed.
    /// The receiver should trigger a reload by calling `load_config`.
    fn watch(&self) -> Result<mpsc::Receiver<()>>;
}
