use std::path::Path;

use config::{Config, File, FileFormat};
use eyre::{Context, Result};
use serde_json::Value;

use crate::config::{
    migrate::migrate,
    models::DomainConfig,
    validation::DomainConfigValidator,
};

/// Load, migrate and validate a domain configuration.
/// Supports multiple formats: JSON, YAML, TOML, INI.
pub async fn load_config(config_path: &str) -> Result<DomainConfig> {
    let config = load_config_sync(config_path)?;
    DomainConfigValidator::validate(&config)
        .with_context(|| format!("Invalid configuration in {config_path}"))?;
    Ok(config)
}

/// Load and migrate without structural validation (used by the validate command)
pub fn load_config_sync(config_path: &str) -> Result<DomainConfig> {
    let config_path = Path::new(config_path);

    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Json,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let mut document: Value = settings
        .try_deserialize()
        .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

    migrate(&mut document)
        .with_context(|| format!("Failed to migrate config from {}", config_path.display()))?;

    let domain_config: DomainConfig = serde_json::from_value(document).with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(domain_config)
}

/// Persist a configuration as pretty JSON, replacing the file atomically.
pub fn save_config(config: &DomainConfig, config_path: &Path) -> Result<()> {
    let body = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    let dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let tmp = config_path.with_extension("json.tmp");
    std::fs::write(&tmp, body).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, config_path)
        .with_context(|| format!("Failed to replace {}", config_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::{
        config::models::{CURRENT_SCHEMA_VERSION, CertMode},
        protocol::{PaddingScheme, ProtocolId},
    };

    #[tokio::test]
    async fn test_load_json_config() {
        let json_content = r#"
{
  "schema_version": 3,
  "uuid": "7d0b7e8c-1f0a-4d1e-9b7a-0c9e6f5d4a31",
  "reality_vision": {
    "enabled": true,
    "port": 12345,
    "sni": "www.example.com"
  },
  "hysteria2": {
    "enabled": true,
    "cert_mode": "acme",
    "cert_domain": "hy.example.com"
  }
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.reality_vision.port, 12345);
        assert_eq!(config.hysteria2.cert_mode, CertMode::Acme);
        assert_eq!(
            config.enabled_protocol_ids(),
            vec![ProtocolId::RealityVision, ProtocolId::Hysteria2]
        );
    }

    #[tokio::test]
    async fn test_load_yaml_config_with_migration() {
        let yaml_content = r#"
log_level: debug
uuid: "7d0b7e8c-1f0a-4d1e-9b7a-0c9e6f5d4a31"
anytls:
  enabled: true
  port: 24443
  padding: high_resist
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.anytls.padding_scheme, PaddingScheme::HighResist);
        assert_eq!(config.anytls.port, 24443);
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let toml_content = r#"
schema_version = 3
password = "global-secret"

[tuic]
enabled = true
port = 30443
zero_rtt = true
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert!(config.tuic.enabled);
        assert!(config.tuic.zero_rtt);
        assert_eq!(config.password, "global-secret");
    }

    #[tokio::test]
    async fn test_rejects_future_schema() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, r#"{{ "schema_version": 42 }}"#).unwrap();

        let err = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("newer than the supported"));
    }

    #[tokio::test]
    async fn test_structural_errors_fail_load_but_not_unchecked() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, r#"{{ "tuic": {{ "enabled": true, "port": 80 }} }}"#).unwrap();
        let path = temp_file.path().to_str().unwrap();

        assert!(load_config(path).await.is_err());
        assert_eq!(load_config_sync(path).unwrap().tuic.port, 80);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sbforge.json");
        let config = DomainConfig::generate_default();

        save_config(&config, &path).unwrap();
        let loaded = load_config_sync(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded, config);
    }
}
