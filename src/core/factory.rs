use std::{path::Path, sync::Arc};

use tracing::{debug, warn};

use crate::{
    config::models::{CertMode, DomainConfig},
    ports::CertificateResolver,
    protocol::{
        AnyProtocol, AnyTls, AnyTlsReality, Hysteria2, Obfs, ProtocolId, RealityGrpc, RealityKeys,
        RealityVision, ShadowTls, Tuic, hysteria2::DEFAULT_BANDWIDTH_MBPS,
    },
};

/// SNI used when neither the protocol nor any ACME block names a domain.
pub const DEFAULT_SNI: &str = "www.bing.com";

/// Resolved certificate material for one protocol
#[derive(Debug, Default)]
struct ResolvedCert {
    cert_path: String,
    key_path: String,
    self_signed: bool,
}

/// Whether building may create certificate files or only compute their paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CertAccess {
    Resolve,
    Locate,
}

/// Factory for turning a domain configuration into protocol instances
#[derive(Clone)]
pub struct ProtocolFactory {
    certs: Arc<dyn CertificateResolver>,
}

impl ProtocolFactory {
    pub fn new(certs: Arc<dyn CertificateResolver>) -> Self {
        Self { certs }
    }

    /// One instance per enabled protocol, in the fixed protocol order.
    /// Missing self-signed pairs are generated, so this blocks on file I/O.
    pub fn from_config(&self, config: &DomainConfig) -> Vec<AnyProtocol> {
        self.build_enabled(config, CertAccess::Resolve)
    }

    /// Same as [`from_config`](Self::from_config) but never writes certificates.
    /// Used for listings and checks that must not leave files behind.
    pub fn preview(&self, config: &DomainConfig) -> Vec<AnyProtocol> {
        self.build_enabled(config, CertAccess::Locate)
    }

    /// Build a single protocol regardless of its enabled flag.
    pub fn build_one(&self, config: &DomainConfig, id: ProtocolId) -> AnyProtocol {
        self.build(config, id, CertAccess::Resolve)
    }

    /// [`build_one`](Self::build_one) without certificate generation.
    pub fn preview_one(&self, config: &DomainConfig, id: ProtocolId) -> AnyProtocol {
        self.build(config, id, CertAccess::Locate)
    }

    fn build_enabled(&self, config: &DomainConfig, access: CertAccess) -> Vec<AnyProtocol> {
        config
            .enabled_protocol_ids()
            .into_iter()
            .map(|id| self.build(config, id, access))
            .collect()
    }

    fn build(&self, config: &DomainConfig, id: ProtocolId, access: CertAccess) -> AnyProtocol {
        let protocol: AnyProtocol = match id {
            ProtocolId::RealityVision => {
                let c = &config.reality_vision;
                RealityVision {
                    port: c.port,
                    enabled: c.enabled,
                    uuid: config.uuid.clone(),
                    sni: c.sni.clone(),
                    keys: RealityKeys {
                        private_key: c.private_key.clone(),
                        public_key: c.public_key.clone(),
                        short_id: c.short_id.clone(),
                    },
                }
                .into()
            }
            ProtocolId::RealityGrpc => {
                let c = &config.reality_grpc;
                RealityGrpc {
                    port: c.port,
                    enabled: c.enabled,
                    uuid: config.uuid.clone(),
                    sni: c.sni.clone(),
                    service_name: c.service_name.clone(),
                    keys: RealityKeys {
                        private_key: c.private_key.clone(),
                        public_key: c.public_key.clone(),
                        short_id: c.short_id.clone(),
                    },
                }
                .into()
            }
            ProtocolId::Hysteria2 => {
                let c = &config.hysteria2;
                let sni = resolve_sni(config, c.cert_mode, &c.cert_domain, &c.sni);
                let cert = self.resolve_cert(config, id, access, c.cert_mode, &c.cert_domain, &sni);
                Hysteria2 {
                    port: c.port,
                    enabled: c.enabled,
                    password: config.password_or_global(&c.password).to_string(),
                    sni,
                    cert_path: cert.cert_path,
                    key_path: cert.key_path,
                    up_mbps: bandwidth_or_default(c.up_mbps),
                    down_mbps: bandwidth_or_default(c.down_mbps),
                    obfs: (!c.obfs_password.trim().is_empty()).then(|| Obfs {
                        password: c.obfs_password.clone(),
                    }),
                    port_hopping: c.port_hopping.clone(),
                    insecure: cert.self_signed,
                }
                .into()
            }
            ProtocolId::Tuic => {
                let c = &config.tuic;
                let sni = resolve_sni(config, c.cert_mode, &c.cert_domain, &c.sni);
                let cert = self.resolve_cert(config, id, access, c.cert_mode, &c.cert_domain, &sni);
                Tuic {
                    port: c.port,
                    enabled: c.enabled,
                    uuid: config.uuid.clone(),
                    password: config.password_or_global(&c.password).to_string(),
                    sni,
                    cert_path: cert.cert_path,
                    key_path: cert.key_path,
                    congestion_control: c.congestion_control.clone(),
                    zero_rtt: c.zero_rtt,
                    insecure: cert.self_signed,
                }
                .into()
            }
            ProtocolId::AnyTls => {
                let c = &config.anytls;
                let sni = resolve_sni(config, c.cert_mode, &c.cert_domain, &c.sni);
                let cert = self.resolve_cert(config, id, access, c.cert_mode, &c.cert_domain, &sni);
                AnyTls {
                    port: c.port,
                    enabled: c.enabled,
                    username: c.username.clone(),
                    password: config.password_or_global(&c.password).to_string(),
                    sni,
                    cert_path: cert.cert_path,
                    key_path: cert.key_path,
                    padding: c.padding_scheme,
                    insecure: cert.self_signed,
                }
                .into()
            }
            ProtocolId::AnyTlsReality => {
                let c = &config.anytls_reality;
                AnyTlsReality {
                    port: c.port,
                    enabled: c.enabled,
                    username: c.username.clone(),
                    password: config.password_or_global(&c.password).to_string(),
                    sni: c.sni.clone(),
                    padding: c.padding_scheme,
                    keys: RealityKeys {
                        private_key: c.private_key.clone(),
                        public_key: c.public_key.clone(),
                        short_id: c.short_id.clone(),
                    },
                }
                .into()
            }
            ProtocolId::ShadowTls => {
                let c = &config.shadowtls;
                ShadowTls {
                    port: c.port,
                    enabled: c.enabled,
                    password: config.password_or_global(&c.password).to_string(),
                    ss_password: c.ss_password.clone(),
                    ss_method: c.ss_method.clone(),
                    sni: c.sni.clone(),
                    detour_port: c.detour_port,
                }
                .into()
            }
        };
        debug!(protocol = %id, "Built protocol instance");
        protocol
    }

    /// ACME pairs are named after the cert domain; the self-signed pair is
    /// issued for the resolved SNI. A failed resolution leaves the paths
    /// empty so validation skips the protocol.
    fn resolve_cert(
        &self,
        config: &DomainConfig,
        id: ProtocolId,
        access: CertAccess,
        mode: CertMode,
        cert_domain: &str,
        sni: &str,
    ) -> ResolvedCert {
        let domain = match mode {
            CertMode::Acme => cert_domain.trim(),
            CertMode::SelfSigned => sni,
        };
        let cert_dir = Path::new(&config.cert_dir);
        let resolved = match access {
            CertAccess::Resolve => self.certs.resolve(id, cert_dir, mode, domain),
            CertAccess::Locate => self.certs.locate(id, cert_dir, mode, domain),
        };
        match resolved {
            Ok(paths) => ResolvedCert {
                cert_path: paths.cert_path.display().to_string(),
                key_path: paths.key_path.display().to_string(),
                self_signed: paths.self_signed,
            },
            Err(e) => {
                warn!(protocol = %id, error = %e, "Certificate resolution failed");
                ResolvedCert::default()
            }
        }
    }
}

/// SNI precedence for certificate-bearing protocols:
/// ACME domain, then the protocol's own SNI, then [`fallback_sni`].
pub fn resolve_sni(config: &DomainConfig, mode: CertMode, cert_domain: &str, own: &str) -> String {
    if mode == CertMode::Acme && !cert_domain.trim().is_empty() {
        return cert_domain.trim().to_string();
    }
    if !own.trim().is_empty() {
        return own.trim().to_string();
    }
    fallback_sni(config)
}

/// First ACME domain among Hysteria2, TUIC and AnyTLS, else [`DEFAULT_SNI`].
pub fn fallback_sni(config: &DomainConfig) -> String {
    [
        (config.hysteria2.cert_mode, &config.hysteria2.cert_domain),
        (config.tuic.cert_mode, &config.tuic.cert_domain),
        (config.anytls.cert_mode, &config.anytls.cert_domain),
    ]
    .into_iter()
    .find(|(mode, domain)| *mode == CertMode::Acme && !domain.trim().is_empty())
    .map(|(_, domain)| domain.trim().to_string())
    .unwrap_or_else(|| DEFAULT_SNI.to_string())
}

fn bandwidth_or_default(mbps: u32) -> u32 {
    if mbps == 0 { DEFAULT_BANDWIDTH_MBPS } else { mbps }
}
