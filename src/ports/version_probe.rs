use async_trait::async_trait;
use eyre::Result;

/// VersionProbe defines the port for asking the engine which version it is.
#[async_trait]
pub trait VersionProbe: Send + Sync + 'static {
    /// Version string such as `1.12.0`. Callers bound this with a timeout.
    async fn probe(&self) -> Result<String>;
}
