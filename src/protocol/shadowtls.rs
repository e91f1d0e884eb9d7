//! ShadowTLS v3 chained in front of a loopback-only Shadowsocks listener.
//!
//! Inbound chain: public ShadowTLS listener -> `detour` -> Shadowsocks on
//! `127.0.0.1:detour_port`. Outbound chain is the mirror image: a Shadowsocks
//! outbound whose `detour` points at the ShadowTLS outbound.

use serde_json::json;

use super::{
    ConfigMap, InboundBuilder, LISTEN_ANY, LOOPBACK, OutboundBuilder, Protocol, ProtocolId,
    ProtocolResult, UTLS_FINGERPRINT, checks, reality::HANDSHAKE_PORT,
};

pub const SHADOWTLS_VERSION: u8 = 3;
pub const DEFAULT_SS_METHOD: &str = "2022-blake3-aes-128-gcm";
pub const DETOUR_INBOUND_TAG: &str = "shadowtls-ss-in";
pub const DETOUR_OUTBOUND_TAG: &str = "shadowtls-ss-out";

#[derive(Debug, Clone, Default)]
pub struct ShadowTls {
    pub port: u16,
    pub enabled: bool,
    /// ShadowTLS handshake password
    pub password: String,
    /// Companion Shadowsocks password
    pub ss_password: String,
    pub ss_method: String,
    pub sni: String,
    /// Loopback port of the companion Shadowsocks listener
    pub detour_port: u16,
}

impl ShadowTls {
    /// Loopback-only Shadowsocks listener the public listener forwards into.
    pub fn to_detour_inbound(&self) -> ProtocolResult<ConfigMap> {
        self.validate()?;
        Ok(
            InboundBuilder::new("shadowsocks", DETOUR_INBOUND_TAG, LOOPBACK, self.detour_port)
                .set("method", self.ss_method.as_str())
                .set("password", self.ss_password.as_str())
                .build(),
        )
    }

    /// ShadowTLS client the Shadowsocks outbound detours through.
    pub fn to_detour_outbound(&self) -> ProtocolResult<ConfigMap> {
        self.validate()?;
        Ok(OutboundBuilder::new(
            self.protocol_type(),
            &self.id().outbound_tag(),
            LOOPBACK,
            self.port,
        )
        .set("version", SHADOWTLS_VERSION)
        .set("password", self.password.as_str())
        .tls(json!({
            "enabled": true,
            "server_name": self.sni,
            "utls": {
                "enabled": true,
                "fingerprint": UTLS_FINGERPRINT,
            },
        }))
        .build())
    }
}

impl Protocol for ShadowTls {
    fn id(&self) -> ProtocolId {
        ProtocolId::ShadowTls
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn validate(&self) -> ProtocolResult<()> {
        let name = self.name();
        checks::listen_port(name, self.port)?;
        checks::detour_port(name, self.port, self.detour_port)?;
        checks::non_empty(name, "password", &self.password)?;
        checks::non_empty(name, "shadowsocks password", &self.ss_password)?;
        checks::non_empty(name, "shadowsocks method", &self.ss_method)?;
        checks::non_empty(name, "sni", &self.sni)?;
        Ok(())
    }

    fn to_inbound(&self) -> ProtocolResult<ConfigMap> {
        self.validate()?;
        Ok(InboundBuilder::new(
            self.protocol_type(),
            &self.id().inbound_tag(),
            LISTEN_ANY,
            self.port,
        )
        .set("version", SHADOWTLS_VERSION)
        .users(vec![json!({ "name": "shadowtls", "password": self.password })])
        .set(
            "handshake",
            json!({
                "server": self.sni,
                "server_port": HANDSHAKE_PORT,
            }),
        )
        .set("strict_mode", true)
        .set("detour", DETOUR_INBOUND_TAG)
        .build())
    }

    /// Entry point of the client chain: Shadowsocks detouring through ShadowTLS.
    fn to_outbound(&self) -> ProtocolResult<ConfigMap> {
        self.validate()?;
        Ok(
            OutboundBuilder::new("shadowsocks", DETOUR_OUTBOUND_TAG, LOOPBACK, self.port)
                .set("method", self.ss_method.as_str())
                .set("password", self.ss_password.as_str())
                .set("detour", self.id().outbound_tag())
                .build(),
        )
    }
}
