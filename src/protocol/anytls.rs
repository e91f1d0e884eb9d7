//! AnyTLS with certificate TLS or Reality, plus the padding scheme presets.
//!
//! Padding presets are a wire contract with client apps: the exact line
//! order and values must match what clients expect for each named preset.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{
    ConfigMap, InboundBuilder, LISTEN_ANY, LOOPBACK, OutboundBuilder, Protocol, ProtocolId,
    ProtocolResult, RealityKeys, UTLS_FINGERPRINT, checks,
};

const PADDING_OFFICIAL: &[&str] = &[
    "stop=8",
    "0=30-30",
    "1=100-400",
    "2=400-500,c,500-1000,c,500-1000,c,500-1000,c,500-1000",
    "3=9-9,500-1000",
    "4=500-1000",
    "5=500-1000",
    "6=500-1000",
    "7=500-1000",
];

const PADDING_BALANCED: &[&str] = &[
    "stop=5",
    "0=30-30",
    "1=100-400",
    "2=400-500,c,500-1000",
    "3=9-9,500-1000",
    "4=500-1000",
];

const PADDING_MINIMAL: &[&str] = &["stop=3", "0=30-30", "1=100-200", "2=200-400"];

const PADDING_HIGH_RESIST: &[&str] = &[
    "stop=10",
    "0=30-30",
    "1=100-400",
    "2=400-500,c,500-1000,c,500-1000,c,500-1000,c,500-1000",
    "3=9-9,500-1000",
    "4=500-1000,c,500-1000",
    "5=500-1000,c,500-1000",
    "6=500-1000",
    "7=500-1000",
    "8=500-1000",
    "9=500-1000",
];

const PADDING_VIDEO: &[&str] = &[
    "stop=6",
    "0=30-30",
    "1=800-1200",
    "2=1000-1400,c,1000-1400",
    "3=1000-1400,c,1000-1400",
    "4=1200-1400",
    "5=1200-1400",
];

/// Named padding presets selectable per AnyTLS listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingScheme {
    Balanced,
    Minimal,
    HighResist,
    Video,
    #[default]
    #[serde(alias = "default")]
    Official,
}

impl PaddingScheme {
    pub fn lines(self) -> &'static [&'static str] {
        match self {
            PaddingScheme::Balanced => PADDING_BALANCED,
            PaddingScheme::Minimal => PADDING_MINIMAL,
            PaddingScheme::HighResist => PADDING_HIGH_RESIST,
            PaddingScheme::Video => PADDING_VIDEO,
            PaddingScheme::Official => PADDING_OFFICIAL,
        }
    }

    fn to_value(self) -> Value {
        json!(self.lines())
    }
}

fn validate_credentials(
    name: &'static str,
    username: &str,
    password: &str,
    sni: &str,
) -> ProtocolResult<()> {
    checks::non_empty(name, "username", username)?;
    checks::non_empty(name, "password", password)?;
    checks::non_empty(name, "sni", sni)?;
    Ok(())
}

/// AnyTLS terminated with a certificate pair.
#[derive(Debug, Clone, Default)]
pub struct AnyTls {
    pub port: u16,
    pub enabled: bool,
    pub username: String,
    pub password: String,
    pub sni: String,
    pub cert_path: String,
    pub key_path: String,
    pub padding: PaddingScheme,
    pub insecure: bool,
}

impl Protocol for AnyTls {
    fn id(&self) -> ProtocolId {
        ProtocolId::AnyTls
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
        validate_credentials(name, &self.username, &self.password, &self.sni)?;
        if self.enabled {
            checks::non_empty(name, "certificate path", &self.cert_path)?;
            checks::non_empty(name, "key path", &self.key_path)?;
        }
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
        .users(vec![json!({ "name": self.username, "password": self.password })])
        .set("padding_scheme", self.padding.to_value())
        .tls(json!({
            "enabled": true,
            "server_name": self.sni,
            "certificate_path": self.cert_path,
            "key_path": self.key_path,
        }))
        .build())
    }

    fn to_outbound(&self) -> ProtocolResult<ConfigMap> {
        self.validate()?;
        Ok(OutboundBuilder::new(
            self.protocol_type(),
            &self.id().outbound_tag(),
            LOOPBACK,
            self.port,
        )
        .set("password", self.password.as_str())
        .tls(json!({
            "enabled": true,
            "server_name": self.sni,
            "insecure": self.insecure,
            "utls": {
                "enabled": true,
                "fingerprint": UTLS_FINGERPRINT,
            },
        }))
        .build())
    }
}

/// AnyTLS camouflaged behind a Reality handshake.
#[derive(Debug, Clone, Default)]
pub struct AnyTlsReality {
    pub port: u16,
    pub enabled: bool,
    pub username: String,
    pub password: String,
    pub sni: String,
    pub padding: PaddingScheme,
    pub keys: RealityKeys,
}

impl Protocol for AnyTlsReality {
    fn id(&self) -> ProtocolId {
        ProtocolId::AnyTlsReality
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
        validate_credentials(name, &self.username, &self.password, &self.sni)?;
        self.keys.validate(name, self.enabled, false)
    }

    fn to_inbound(&self) -> ProtocolResult<ConfigMap> {
        self.validate()?;
        Ok(InboundBuilder::new(
            self.protocol_type(),
            &self.id().inbound_tag(),
            LISTEN_ANY,
            self.port,
        )
        .users(vec![json!({ "name": self.username, "password": self.password })])
        .set("padding_scheme", self.padding.to_value())
        .tls(self.keys.server_tls(&self.sni))
        .build())
    }

    fn to_outbound(&self) -> ProtocolResult<ConfigMap> {
        self.validate()?;
        Ok(OutboundBuilder::new(
            self.protocol_type(),
            &self.id().outbound_tag(),
            LOOPBACK,
            self.port,
        )
        .set("password", self.password.as_str())
        .tls(self.keys.client_tls(&self.sni))
        .build())
    }
}
