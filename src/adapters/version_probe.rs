use async_trait::async_trait;
use eyre::{Context, Result, eyre};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

use crate::ports::VersionProbe;

static VERSION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^sing-box version v?(\d+\.\d+(?:\.\d+)?(?:-[0-9A-Za-z.\-]+)?)")
        .expect("invalid version regex")
});

/// Version from `sing-box version` output
pub fn extract_version(output: &str) -> Option<String> {
    VERSION_LINE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Runs `<binary> version` and parses the first line.
pub struct CommandVersionProbe {
    binary: String,
}

impl CommandVersionProbe {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl VersionProbe for CommandVersionProbe {
    async fn probe(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("version")
            .kill_on_drop(true)
            .output()
            .await
            .wrap_err_with(|| format!("Failed to run {} version", self.binary))?;

        if !output.status.success() {
            return Err(eyre!(
                "{} version exited with {}",
                self.binary,
                output.status
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        extract_version(&stdout)
            .ok_or_else(|| eyre!("Unrecognized version output from {}", self.binary))
    }
}

/// Always answers with a fixed version (pinned engines, tests).
pub struct StaticVersionProbe {
    version: String,
}

impl StaticVersionProbe {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

#[async_trait]
impl VersionProbe for StaticVersionProbe {
    async fn probe(&self) -> Result<String> {
        Ok(self.version.clone())
    }
}
