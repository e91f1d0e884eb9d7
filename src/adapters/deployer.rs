use std::path::{Path, PathBuf};

use async_trait::async_trait;
use eyre::{Context, Result};
use tokio::fs;
use tracing::{debug, info};

use crate::{config::models::BackupConfig, core::EngineConfig, ports::EngineDeployer};

const BACKUP_PREFIX: &str = "config-";
/// UTC, millisecond precision; lexical order is chronological
const BACKUP_STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Writes the engine document to disk, replacing the previous one atomically.
pub struct FileDeployer {
    path: PathBuf,
    backup: Option<BackupConfig>,
}

impl FileDeployer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup: None,
        }
    }

    /// Keep copies of replaced documents according to `backup`.
    pub fn with_backup(mut self, backup: BackupConfig) -> Self {
        self.backup = backup.enabled.then_some(backup);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn backup_existing(&self, backup: &BackupConfig) -> Result<()> {
        if fs::metadata(&self.path).await.is_err() {
            return Ok(());
        }
        let dir = Path::new(&backup.dir);
        fs::create_dir_all(dir)
            .await
            .wrap_err_with(|| format!("Failed to create backup directory {}", dir.display()))?;

        let stamp = chrono::Utc::now().format(BACKUP_STAMP_FORMAT);
        let target = dir.join(format!("{BACKUP_PREFIX}{stamp}.json"));
        fs::copy(&self.path, &target)
            .await
            .wrap_err_with(|| format!("Failed to back up {}", self.path.display()))?;
        debug!(backup = %target.display(), "Backed up engine configuration");

        prune_backups(dir, backup.keep as usize).await
    }
}

/// Delete the oldest backups beyond `keep`.
async fn prune_backups(dir: &Path, keep: usize) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .await
        .wrap_err_with(|| format!("Failed to list {}", dir.display()))?;
    let mut backups = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(BACKUP_PREFIX) && name.ends_with(".json") {
            backups.push(entry.path());
        }
    }
    backups.sort();
    let excess = backups.len().saturating_sub(keep);
    for old in backups.into_iter().take(excess) {
        fs::remove_file(&old)
            .await
            .wrap_err_with(|| format!("Failed to remove {}", old.display()))?;
    }
    Ok(())
}

#[async_trait]
impl EngineDeployer for FileDeployer {
    async fn deploy(&self, config: &EngineConfig) -> Result<()> {
        let body = config
            .to_pretty_json()
            .wrap_err("Failed to serialize engine configuration")?;
        tracing::Span::current().record("bytes", body.len());

        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .wrap_err_with(|| format!("Failed to create {}", dir.display()))?;
        }
        if let Some(backup) = &self.backup {
            self.backup_existing(backup).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body.as_bytes())
            .await
            .wrap_err_with(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .wrap_err_with(|| format!("Failed to replace {}", self.path.display()))?;

        info!(
            path = %self.path.display(),
            bytes = body.len(),
            inbounds = config.inbounds.len(),
            "Engine configuration written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::core::engine_config::{DnsBlock, LogBlock, RouteBlock};

    fn document(level: &str) -> EngineConfig {
        EngineConfig {
            log: LogBlock {
                level: level.to_string(),
                timestamp: true,
            },
            dns: DnsBlock {
                servers: vec![],
                rules: vec![],
                final_server: "dns-remote".to_string(),
                strategy: None,
            },
            inbounds: vec![],
            outbounds: vec![],
            route: RouteBlock {
                rule_set: vec![],
                rules: vec![],
                final_outbound: "direct".to_string(),
                auto_detect_interface: true,
                default_domain_resolver: None,
            },
        }
    }

    #[tokio::test]
    async fn writes_pretty_json_and_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sing-box").join("config.json");
        let deployer = FileDeployer::new(&path);

        deployer.deploy(&document("warn")).await.unwrap();
        deployer.deploy(&document("info")).await.unwrap();

        let written: EngineConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.log.level, "info");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn backups_are_pruned_to_keep() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let backup_dir = dir.path().join("backups");
        let deployer = FileDeployer::new(&path).with_backup(BackupConfig {
            enabled: true,
            dir: backup_dir.to_string_lossy().into_owned(),
            keep: 2,
        });

        for level in ["trace", "debug", "info", "warn"] {
            deployer.deploy(&document(level)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let mut names: Vec<String> = std::fs::read_dir(&backup_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);

        // the survivors are the two newest copies: "debug" and "info"
        let newest: EngineConfig =
            serde_json::from_str(&std::fs::read_to_string(backup_dir.join(&names[1])).unwrap())
                .unwrap();
        assert_eq!(newest.log.level, "info");
        let stamp = names[1]
            .strip_prefix(BACKUP_PREFIX)
            .and_then(|n| n.strip_suffix(".json"))
            .unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(stamp, BACKUP_STAMP_FORMAT).is_ok());
    }

    #[test]
    fn disabled_backup_is_ignored() {
        let deployer = FileDeployer::new("/tmp/config.json").with_backup(BackupConfig::default());
        assert!(deployer.backup.is_none());
    }
}
