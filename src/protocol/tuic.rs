use serde_json::json;

use super::{
    ConfigMap, InboundBuilder, LISTEN_ANY, LOOPBACK, OutboundBuilder, Protocol, ProtocolId,
    ProtocolResult, checks,
};

pub const HEARTBEAT: &str = "10s";
pub const UDP_RELAY_MODE: &str = "native";

/// TUIC v5 over QUIC.
#[derive(Debug, Clone, Default)]
pub struct Tuic {
    pub port: u16,
    pub enabled: bool,
    pub uuid: String,
    pub password: String,
    pub sni: String,
    pub cert_path: String,
    pub key_path: String,
    /// Passed through to the engine unchanged (`bbr`, `cubic`, `new_reno`)
    pub congestion_control: String,
    pub zero_rtt: bool,
    pub insecure: bool,
}

impl Protocol for Tuic {
    fn id(&self) -> ProtocolId {
        ProtocolId::Tuic
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
        checks::non_empty(name, "uuid", &self.uuid)?;
        checks::non_empty(name, "password", &self.password)?;
        checks::non_empty(name, "sni", &self.sni)?;
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
        .users(vec![json!({ "uuid": self.uuid, "password": self.password })])
        .set("congestion_control", self.congestion_control.as_str())
        .set("zero_rtt_handshake", self.zero_rtt)
        .set("heartbeat", HEARTBEAT)
        .tls(json!({
            "enabled": true,
            "server_name": self.sni,
            "alpn": ["h3"],
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
        .set("uuid", self.uuid.as_str())
        .set("password", self.password.as_str())
        .set("congestion_control", self.congestion_control.as_str())
        .set("zero_rtt_handshake", self.zero_rtt)
        .set("udp_relay_mode", UDP_RELAY_MODE)
        .set("heartbeat", HEARTBEAT)
        .tls(json!({
            "enabled": true,
            "server_name": self.sni,
            "insecure": self.insecure,
            "alpn": ["h3"],
        }))
        .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuic() -> Tuic {
        Tuic {
            port: 9443,
            enabled: true,
            uuid: "7d0b7e8c-1f0a-4d1e-9b7a-0c9e6f5d4a31".to_string(),
            password: "tuic-secret".to_string(),
            sni: "tuic.example.com".to_string(),
            cert_path: "/certs/self_signed.crt".to_string(),
            key_path: "/certs/self_signed.key".to_string(),
            congestion_control: "bbr".to_string(),
            zero_rtt: false,
            insecure: true,
        }
    }

    #[test]
    fn inbound_has_fixed_extras() {
        let inbound = tuic().to_inbound().unwrap();
        assert_eq!(inbound["type"], "tuic");
        assert_eq!(inbound["heartbeat"], "10s");
        assert_eq!(inbound["congestion_control"], "bbr");
        assert_eq!(inbound["zero_rtt_handshake"], false);
        assert_eq!(inbound["tls"]["alpn"], json!(["h3"]));
    }

    #[test]
    fn outbound_uses_native_relay() {
        let outbound = tuic().to_outbound().unwrap();
        assert_eq!(outbound["udp_relay_mode"], "native");
        assert_eq!(outbound["tls"]["insecure"], true);
    }

    #[test]
    fn requires_credentials_and_sni() {
        for field in ["uuid", "password", "sni"] {
            let mut p = tuic();
            match field {
                "uuid" => p.uuid.clear(),
                "password" => p.password.clear(),
                _ => p.sni.clear(),
            }
            assert_eq!(p.validate().unwrap_err().code(), "missing_field");
        }
    }
}
