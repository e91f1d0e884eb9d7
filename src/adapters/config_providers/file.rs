use std::path::{Path, PathBuf};

use async_trait::async_trait;
use eyre::{Context, Result, eyre};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::{
    config::{loader::load_config, models::DomainConfig},
    ports::config_provider::ConfigProvider,
};

/// Loads the domain configuration from a local file and watches it for changes.
pub struct FileConfigProvider {
    path: PathBuf,
    // Dropping the watcher stops notifications
    _watcher: Option<notify::RecommendedWatcher>,
    update_tx: mpsc::Sender<()>,
    // Taken once by `watch()`
    update_rx: std::sync::Mutex<Option<mpsc::Receiver<()>>>,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (tx, rx) = mpsc::channel(1);

        let mut provider = Self {
            path,
            _watcher: None,
            update_tx: tx,
            update_rx: std::sync::Mutex::new(Some(rx)),
        };

        provider.init_watcher()?;
        Ok(provider)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_watcher(&mut self) -> Result<()> {
        let tx = self.update_tx.clone();
        let config_filename = self
            .path
            .file_name()
            .ok_or_else(|| eyre!("Invalid config path: {}", self.path.display()))?
            .to_owned();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if (event.kind.is_modify()
                            || event.kind.is_create()
                            || event.kind.is_remove())
                            && event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == Some(&config_filename))
                        {
                            tracing::debug!("Config file changed: {:?}", event.kind);
                            // A pending signal already covers this change
                            let _ = tx.try_send(());
                        }
                    }
                    Err(e) => tracing::error!("File watch error: {:?}", e),
                }
            })?;

        let watch_dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        watcher
            .watch(watch_dir, RecursiveMode::NonRecursive)
            .wrap_err("Failed to watch config directory")?;

        self._watcher = Some(watcher);
        Ok(())
    }
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    async fn load_config(&self) -> Result<DomainConfig> {
        let path_str = self
            .path
            .to_str()
            .ok_or_else(|| eyre!("Invalid UTF-8 path: {}", self.path.display()))?;
        load_config(path_str).await
    }

    fn watch(&self) -> Result<mpsc::Receiver<()>> {
        self.update_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| eyre!("watch() can only be called once"))
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::File, io::Write};

    use tempfile::tempdir;
    use tokio::time::{Duration, sleep};

    use super::*;

    fn write(path: &Path, body: &str) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(body.as_bytes())?;
        Ok(())
    }

    #[tokio::test]
    async fn test_file_config_provider() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("config.json");

        write(
            &file_path,
            r#"{
                "schema_version": 3,
                "uuid": "1b6f5c3e-7d0a-4f6e-9a53-6f7f2c1d8e90",
                "reality_vision": { "enabled": true, "port": 20443,
                    "private_key": "priv", "public_key": "pub" }
            }"#,
        )?;

        let provider = FileConfigProvider::new(&file_path)?;
        let config = provider.load_config().await?;
        assert_eq!(config.reality_vision.port, 20443);

        let mut rx = provider.watch()?;
        assert!(provider.watch().is_err());

        sleep(Duration::from_millis(100)).await;
        write(
            &file_path,
            r#"{
                "schema_version": 3,
                "uuid": "1b6f5c3e-7d0a-4f6e-9a53-6f7f2c1d8e90",
                "reality_vision": { "enabled": true, "port": 21443,
                    "private_key": "priv", "public_key": "pub" }
            }"#,
        )?;

        let notification = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(notification.is_ok(), "Timed out waiting for config update");
        assert!(
            notification.unwrap().is_some(),
            "Channel closed unexpectedly"
        );

        let config = provider.load_config().await?;
        assert_eq!(config.reality_vision.port, 21443);

        Ok(())
    }

    #[tokio::test]
    async fn invalid_file_fails_to_load() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("config.json");
        write(
            &file_path,
            r#"{ "schema_version": 3, "log": { "level": "loud" } }"#,
        )?;

        let provider = FileConfigProvider::new(&file_path)?;
        assert!(provider.load_config().await.is_err());
        Ok(())
    }
}
