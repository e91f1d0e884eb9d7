//! Domain configuration data structures for sbforge.
//!
//! `DomainConfig` is the persisted, user-editable declaration of which
//! protocols run where. These types map directly to JSON (also YAML / TOML)
//! documents; every section carries defaults so minimal documents stay short.
//! The engine document is never stored: it is compiled from this on demand.
use serde::{Deserialize, Serialize};

use crate::{
    config::secrets,
    protocol::{PaddingScheme, ProtocolId, hysteria2::DEFAULT_BANDWIDTH_MBPS, shadowtls},
};

/// Schema version written by this build. Migrations only move forward.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Root of the domain configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DomainConfig {
    pub schema_version: u32,
    /// Shared UUID for VLESS and TUIC users
    pub uuid: String,
    /// Fallback password for protocols that leave their own empty
    pub password: String,
    pub log: LogConfig,
    pub engine: EngineSettings,
    /// Directory holding ACME and self-signed certificate pairs
    pub cert_dir: String,
    pub routing: RoutingConfig,
    pub backup: BackupConfig,
    pub reality_vision: RealityConfig,
    pub reality_grpc: RealityGrpcConfig,
    pub hysteria2: Hysteria2Config,
    pub tuic: TuicConfig,
    pub anytls: AnyTlsConfig,
    pub anytls_reality: AnyTlsRealityConfig,
    pub shadowtls: ShadowTlsConfig,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            uuid: String::new(),
            password: String::new(),
            log: LogConfig::default(),
            engine: EngineSettings::default(),
            cert_dir: "/etc/sing-box/certs".to_string(),
            routing: RoutingConfig::default(),
            backup: BackupConfig::default(),
            reality_vision: RealityConfig::default(),
            reality_grpc: RealityGrpcConfig::default(),
            hysteria2: Hysteria2Config::default(),
            tuic: TuicConfig::default(),
            anytls: AnyTlsConfig::default(),
            anytls_reality: AnyTlsRealityConfig::default(),
            shadowtls: ShadowTlsConfig::default(),
        }
    }
}

impl DomainConfig {
    /// A ready-to-edit configuration with freshly generated credentials.
    ///
    /// All protocols start disabled; Reality key pairs and the Shadowsocks
    /// key are filled in so enabling a protocol needs no extra step.
    pub fn generate_default() -> Self {
        let vision_keys = secrets::reality_keypair();
        let grpc_keys = secrets::reality_keypair();
        let anytls_keys = secrets::reality_keypair();

        let mut config = Self {
            uuid: secrets::uuid(),
            password: secrets::password(),
            ..Self::default()
        };
        config.reality_vision.private_key = vision_keys.private_key;
        config.reality_vision.public_key = vision_keys.public_key;
        config.reality_vision.short_id = secrets::short_id();
        config.reality_grpc.private_key = grpc_keys.private_key;
        config.reality_grpc.public_key = grpc_keys.public_key;
        config.reality_grpc.short_id = secrets::short_id();
        config.anytls_reality.private_key = anytls_keys.private_key;
        config.anytls_reality.public_key = anytls_keys.public_key;
        config.anytls_reality.short_id = secrets::short_id();
        config.shadowtls.ss_password = secrets::shadowsocks_key();
        config
    }

    /// Protocols currently switched on, in their fixed order.
    pub fn enabled_protocol_ids(&self) -> Vec<ProtocolId> {
        ProtocolId::all()
            .iter()
            .copied()
            .filter(|id| self.is_enabled(*id))
            .collect()
    }

    pub fn is_enabled(&self, id: ProtocolId) -> bool {
        match id {
            ProtocolId::RealityVision => self.reality_vision.enabled,
            ProtocolId::RealityGrpc => self.reality_grpc.enabled,
            ProtocolId::Hysteria2 => self.hysteria2.enabled,
            ProtocolId::Tuic => self.tuic.enabled,
            ProtocolId::AnyTls => self.anytls.enabled,
            ProtocolId::AnyTlsReality => self.anytls_reality.enabled,
            ProtocolId::ShadowTls => self.shadowtls.enabled,
        }
    }

    pub fn set_enabled(&mut self, id: ProtocolId, enabled: bool) {
        match id {
            ProtocolId::RealityVision => self.reality_vision.enabled = enabled,
            ProtocolId::RealityGrpc => self.reality_grpc.enabled = enabled,
            ProtocolId::Hysteria2 => self.hysteria2.enabled = enabled,
            ProtocolId::Tuic => self.tuic.enabled = enabled,
            ProtocolId::AnyTls => self.anytls.enabled = enabled,
            ProtocolId::AnyTlsReality => self.anytls_reality.enabled = enabled,
            ProtocolId::ShadowTls => self.shadowtls.enabled = enabled,
        }
    }

    /// Public listen port configured for a protocol
    pub fn port(&self, id: ProtocolId) -> u16 {
        match id {
            ProtocolId::RealityVision => self.reality_vision.port,
            ProtocolId::RealityGrpc => self.reality_grpc.port,
            ProtocolId::Hysteria2 => self.hysteria2.port,
            ProtocolId::Tuic => self.tuic.port,
            ProtocolId::AnyTls => self.anytls.port,
            ProtocolId::AnyTlsReality => self.anytls_reality.port,
            ProtocolId::ShadowTls => self.shadowtls.port,
        }
    }

    /// Resolve a protocol password, falling back to the global one.
    pub fn password_or_global<'a>(&'a self, own: &'a str) -> &'a str {
        if own.trim().is_empty() {
            &self.password
        } else {
            own
        }
    }
}

/// Log settings copied into the engine document
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// One of trace, debug, info, warn, error, fatal, panic
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// How the external engine binary is located and queried.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Engine executable, resolved through PATH when relative
    pub binary: String,
    /// Where the compiled document is written
    pub config_path: String,
    /// Pin the engine version instead of probing the binary
    pub version: Option<String>,
    /// Upper bound for the version probe
    pub probe_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            binary: "sing-box".to_string(),
            config_path: "/etc/sing-box/config.json".to_string(),
            version: None,
            probe_timeout_ms: 3000,
        }
    }
}

/// Certificate acquisition mode for certificate-bearing protocols.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CertMode {
    Acme,
    #[default]
    SelfSigned,
}

impl std::fmt::Display for CertMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertMode::Acme => write!(f, "acme"),
            CertMode::SelfSigned => write!(f, "self_signed"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct RoutingConfig {
    /// Also hijack plain port-53 traffic into the engine resolver
    pub dns_redirect: bool,
    pub dns: DnsSettings,
    pub vpn: VpnEgressConfig,
    pub ipv6: Ipv6SplitConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DnsSettings {
    /// DoH resolver address used for everything outside the CN rule-set
    pub remote: String,
    /// Plain UDP resolver for CN domains
    pub local: String,
    /// Resolution strategy; only emitted for legacy engines
    pub strategy: String,
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            remote: "1.1.1.1".to_string(),
            local: "223.5.5.5".to_string(),
            strategy: "prefer_ipv4".to_string(),
        }
    }
}

/// WireGuard egress used for VPN-style domain routing.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct VpnEgressConfig {
    pub enabled: bool,
    pub server: String,
    pub server_port: u16,
    pub local_address: Vec<String>,
    pub private_key: String,
    pub peer_public_key: String,
    pub reserved: Vec<u8>,
    pub mtu: u16,
    /// Domain suffixes routed through the egress
    pub domains: Vec<String>,
}

impl Default for VpnEgressConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: "162.159.192.1".to_string(),
            server_port: 2408,
            local_address: Vec::new(),
            private_key: String::new(),
            peer_public_key: String::new(),
            reserved: Vec::new(),
            mtu: 1280,
            domains: Vec::new(),
        }
    }
}

/// Domain suffixes forced out over IPv6.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Ipv6SplitConfig {
    pub enabled: bool,
    pub domains: Vec<String>,
}

/// Backup policy. Consumed by the persistence layer, carried here as data.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: bool,
    pub dir: String,
    pub keep: u32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: "/var/backups/sbforge".to_string(),
            keep: 5,
        }
    }
}

fn default_reality_sni() -> String {
    "www.microsoft.com".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RealityConfig {
    pub enabled: bool,
    pub port: u16,
    /// Handshake target impersonated by the listener
    pub sni: String,
    pub private_key: String,
    pub public_key: String,
    pub short_id: String,
}

impl Default for RealityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 20443,
            sni: default_reality_sni(),
            private_key: String::new(),
            public_key: String::new(),
            short_id: String::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RealityGrpcConfig {
    pub enabled: bool,
    pub port: u16,
    pub sni: String,
    pub service_name: String,
    pub private_key: String,
    pub public_key: String,
    pub short_id: String,
}

impl Default for RealityGrpcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 20444,
            sni: default_reality_sni(),
            service_name: "grpc".to_string(),
            private_key: String::new(),
            public_key: String::new(),
            short_id: String::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Hysteria2Config {
    pub enabled: bool,
    pub port: u16,
    pub password: String,
    pub sni: String,
    pub cert_mode: CertMode,
    pub cert_domain: String,
    /// 0 means "use the default"
    pub up_mbps: u32,
    pub down_mbps: u32,
    /// Salamander obfuscation password; empty disables obfuscation
    pub obfs_password: String,
    /// `start-end` UDP range forwarded to the listen port
    pub port_hopping: String,
}

impl Default for Hysteria2Config {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 20445,
            password: String::new(),
            sni: String::new(),
            cert_mode: CertMode::default(),
            cert_domain: String::new(),
            up_mbps: DEFAULT_BANDWIDTH_MBPS,
            down_mbps: DEFAULT_BANDWIDTH_MBPS,
            obfs_password: String::new(),
            port_hopping: String::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TuicConfig {
    pub enabled: bool,
    pub port: u16,
    pub password: String,
    pub sni: String,
    pub cert_mode: CertMode,
    pub cert_domain: String,
    pub congestion_control: String,
    pub zero_rtt: bool,
}

impl Default for TuicConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 20446,
            password: String::new(),
            sni: String::new(),
            cert_mode: CertMode::default(),
            cert_domain: String::new(),
            congestion_control: "bbr".to_string(),
            zero_rtt: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AnyTlsConfig {
    pub enabled: bool,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub sni: String,
    pub cert_mode: CertMode,
    pub cert_domain: String,
    pub padding_scheme: PaddingScheme,
}

impl Default for AnyTlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 20447,
            username: "anytls".to_string(),
            password: String::new(),
            sni: String::new(),
            cert_mode: CertMode::default(),
            cert_domain: String::new(),
            padding_scheme: PaddingScheme::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AnyTlsRealityConfig {
    pub enabled: bool,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub sni: String,
    pub private_key: String,
    pub public_key: String,
    pub short_id: String,
    pub padding_scheme: PaddingScheme,
}

impl Default for AnyTlsRealityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 20448,
            username: "anytls".to_string(),
            password: String::new(),
            sni: default_reality_sni(),
            private_key: String::new(),
            public_key: String::new(),
            short_id: String::new(),
            padding_scheme: PaddingScheme::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ShadowTlsConfig {
    pub enabled: bool,
    pub port: u16,
    pub password: String,
    pub ss_password: String,
    pub ss_method: String,
    pub sni: String,
    pub detour_port: u16,
}

impl Default for ShadowTlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 20449,
            password: String::new(),
            ss_password: String::new(),
            ss_method: shadowtls::DEFAULT_SS_METHOD.to_string(),
            sni: default_reality_sni(),
            detour_port: 20450,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_document_uses_defaults() {
        let config: DomainConfig =
            serde_json::from_str(r#"{ "uuid": "u", "hysteria2": { "enabled": true } }"#).unwrap();
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
        assert!(config.hysteria2.enabled);
        assert_eq!(config.hysteria2.port, 20445);
        assert_eq!(config.hysteria2.cert_mode, CertMode::SelfSigned);
        assert_eq!(config.log.level, "warn");
        assert_eq!(config.enabled_protocol_ids(), vec![ProtocolId::Hysteria2]);
    }

    #[test]
    fn cert_mode_wire_names() {
        let mode: CertMode = serde_json::from_str("\"acme\"").unwrap();
        assert_eq!(mode, CertMode::Acme);
        assert_eq!(
            serde_json::to_string(&CertMode::SelfSigned).unwrap(),
            "\"self_signed\""
        );
    }

    #[test]
    fn toggles_follow_protocol_ids() {
        let mut config = DomainConfig::default();
        for id in ProtocolId::all() {
            config.set_enabled(*id, true);
        }
        assert_eq!(config.enabled_protocol_ids(), ProtocolId::all());

        config.set_enabled(ProtocolId::Tuic, false);
        assert!(!config.enabled_protocol_ids().contains(&ProtocolId::Tuic));
    }

    #[test]
    fn default_ports_are_distinct() {
        let config = DomainConfig::default();
        let mut ports: Vec<u16> = ProtocolId::all().iter().map(|id| config.port(*id)).collect();
        ports.push(config.shadowtls.detour_port);
        let before = ports.len();
        ports.sort_unstable();
        ports.dedup();
        assert_eq!(ports.len(), before);
    }

    #[test]
    fn generated_default_has_credentials() {
        let config = DomainConfig::generate_default();
        assert!(!config.uuid.is_empty());
        assert!(!config.password.is_empty());
        assert!(!config.reality_vision.public_key.is_empty());
        assert_ne!(
            config.reality_vision.private_key,
            config.reality_grpc.private_key
        );
        assert!(config.enabled_protocol_ids().is_empty());
    }

    #[test]
    fn password_falls_back_to_global() {
        let config = DomainConfig {
            password: "global".to_string(),
            ..DomainConfig::default()
        };
        assert_eq!(config.password_or_global(""), "global");
        assert_eq!(config.password_or_global("own"), "own");
    }
}
