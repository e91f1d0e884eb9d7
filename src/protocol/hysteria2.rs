use std::ops::RangeInclusive;

use serde_json::{Value, json};

use super::{
    ConfigMap, InboundBuilder, LISTEN_ANY, LOOPBACK, OutboundBuilder, Protocol, ProtocolError,
    ProtocolId, ProtocolResult, checks,
};

/// Bandwidth hint applied when the configuration leaves it at zero.
pub const DEFAULT_BANDWIDTH_MBPS: u32 = 100;
/// How often a hopping client rotates its destination port.
pub const HOP_INTERVAL: &str = "30s";

/// Salamander obfuscation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obfs {
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct Hysteria2 {
    pub port: u16,
    pub enabled: bool,
    pub password: String,
    pub sni: String,
    pub cert_path: String,
    pub key_path: String,
    pub up_mbps: u32,
    pub down_mbps: u32,
    pub obfs: Option<Obfs>,
    /// `start-end`, empty when hopping is off
    pub port_hopping: String,
    /// Client definitions skip verification (self-signed certificates)
    pub insecure: bool,
}

impl Hysteria2 {
    /// Parsed hopping range, `None` when hopping is off.
    pub fn hopping_range(&self) -> ProtocolResult<Option<RangeInclusive<u16>>> {
        checks::port_hopping(self.name(), &self.port_hopping)
    }

    fn obfs_block(&self) -> Option<Value> {
        self.obfs.as_ref().map(|obfs| {
            json!({
                "type": "salamander",
                "password": obfs.password,
            })
        })
    }
}

impl Protocol for Hysteria2 {
    fn id(&self) -> ProtocolId {
        ProtocolId::Hysteria2
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
        checks::non_empty(name, "password", &self.password)?;
        if self.enabled {
            checks::non_empty(name, "sni", &self.sni)?;
            checks::non_empty(name, "certificate path", &self.cert_path)?;
            checks::non_empty(name, "key path", &self.key_path)?;
        }
        if self.up_mbps == 0 {
            return Err(ProtocolError::InvalidBandwidth {
                protocol: name,
                field: "up_mbps",
            });
        }
        if self.down_mbps == 0 {
            return Err(ProtocolError::InvalidBandwidth {
                protocol: name,
                field: "down_mbps",
            });
        }
        if let Some(obfs) = &self.obfs {
            checks::non_empty(name, "obfs password", &obfs.password)?;
        }
        self.hopping_range()?;
        Ok(())
    }

    fn to_inbound(&self) -> ProtocolResult<ConfigMap> {
        self.validate()?;
        let mut builder = InboundBuilder::new(
            self.protocol_type(),
            &self.id().inbound_tag(),
            LISTEN_ANY,
            self.port,
        )
        .set("up_mbps", self.up_mbps)
        .set("down_mbps", self.down_mbps)
        .users(vec![json!({ "password": self.password })])
        .tls(json!({
            "enabled": true,
            "server_name": self.sni,
            "alpn": ["h3"],
            "certificate_path": self.cert_path,
            "key_path": self.key_path,
        }));
        if let Some(obfs) = self.obfs_block() {
            builder = builder.set("obfs", obfs);
        }
        Ok(builder.build())
    }

    fn to_outbound(&self) -> ProtocolResult<ConfigMap> {
        self.validate()?;
        let mut builder = OutboundBuilder::new(
            self.protocol_type(),
            &self.id().outbound_tag(),
            LOOPBACK,
            self.port,
        )
        .set("password", self.password.as_str())
        .set("up_mbps", self.up_mbps)
        .set("down_mbps", self.down_mbps)
        .tls(json!({
            "enabled": true,
            "server_name": self.sni,
            "insecure": self.insecure,
            "alpn": ["h3"],
        }));
        if let Some(obfs) = self.obfs_block() {
            builder = builder.set("obfs", obfs);
        }
        if let Some(range) = self.hopping_range()? {
            builder = builder
                .set(
                    "server_ports",
                    json!([format!("{}:{}", range.start(), range.end())]),
                )
                .set("hop_interval", HOP_INTERVAL);
        }
        Ok(builder.build())
    }
}
