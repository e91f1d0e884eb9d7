use async_trait::async_trait;
use eyre::Result;

use crate::core::EngineConfig;

/// EngineDeployer defines the "write config and restart" side effect.
///
/// Implementations are only invoked after a configuration update has been
/// published, never while the writer lock is held.
#[async_trait]
pub trait EngineDeployer: Send + Sync + 'static {
    async fn deploy(&self, config: &EngineConfig) -> Result<()>;
}
