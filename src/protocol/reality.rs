//! VLESS over Reality TLS, raw TCP (Vision flow) and gRPC flavors.

use serde_json::{Value, json};

use super::{
    ConfigMap, InboundBuilder, LISTEN_ANY, LOOPBACK, OutboundBuilder, Protocol, ProtocolId,
    ProtocolResult, UTLS_FINGERPRINT, checks,
};

/// Port the Reality handshake target is contacted on.
pub const HANDSHAKE_PORT: u16 = 443;
/// Flow used by the raw TCP flavor.
pub const VISION_FLOW: &str = "xtls-rprx-vision";

/// X25519 key pair and short-id used by Reality listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealityKeys {
    pub private_key: String,
    pub public_key: String,
    pub short_id: String,
}

impl RealityKeys {
    /// Public key is always required; the private half and the short-id only
    /// matter once the listener is live.
    pub fn validate(
        &self,
        protocol: &'static str,
        enabled: bool,
        require_short_id: bool,
    ) -> ProtocolResult<()> {
        checks::reality_key(protocol, "public key", &self.public_key)?;
        if enabled {
            checks::reality_key(protocol, "private key", &self.private_key)?;
            if require_short_id {
                checks::reality_key(protocol, "short id", &self.short_id)?;
            }
        }
        Ok(())
    }

    /// Listener-side TLS block impersonating `sni`.
    pub fn server_tls(&self, sni: &str) -> Value {
        let mut reality = json!({
            "enabled": true,
            "handshake": {
                "server": sni,
                "server_port": HANDSHAKE_PORT,
            },
            "private_key": self.private_key,
        });
        if !self.short_id.is_empty() {
            reality["short_id"] = json!([self.short_id]);
        }

        json!({
            "enabled": true,
            "server_name": sni,
            "reality": reality,
        })
    }

    /// Client-side TLS block.
    pub fn client_tls(&self, sni: &str) -> Value {
        let mut reality = json!({
            "enabled": true,
            "public_key": self.public_key,
        });
        if !self.short_id.is_empty() {
            reality["short_id"] = json!(self.short_id);
        }

        json!({
            "enabled": true,
            "server_name": sni,
            "utls": {
                "enabled": true,
                "fingerprint": UTLS_FINGERPRINT,
            },
            "reality": reality,
        })
    }
}

fn validate_vless(
    id: ProtocolId,
    port: u16,
    enabled: bool,
    uuid: &str,
    sni: &str,
    keys: &RealityKeys,
) -> ProtocolResult<()> {
    let name = id.display_name();
    checks::listen_port(name, port)?;
    keys.validate(name, enabled, true)?;
    if enabled {
        checks::non_empty(name, "uuid", uuid)?;
        checks::non_empty(name, "sni", sni)?;
    }
    Ok(())
}

/// VLESS + Reality over raw TCP with the Vision flow.
#[derive(Debug, Clone, Default)]
pub struct RealityVision {
    pub port: u16,
    pub enabled: bool,
    pub uuid: String,
    pub sni: String,
    pub keys: RealityKeys,
}

impl Protocol for RealityVision {
    fn id(&self) -> ProtocolId {
        ProtocolId::RealityVision
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn validate(&self) -> ProtocolResult<()> {
        validate_vless(
            self.id(),
            self.port,
            self.enabled,
            &self.uuid,
            &self.sni,
            &self.keys,
        )
    }

    fn to_inbound(&self) -> ProtocolResult<ConfigMap> {
        self.validate()?;
        Ok(InboundBuilder::new(
            self.protocol_type(),
            &self.id().inbound_tag(),
            LISTEN_ANY,
            self.port,
        )
        .users(vec![json!({ "uuid": self.uuid, "flow": VISION_FLOW })])
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
        .set("uuid", self.uuid.as_str())
        .set("flow", VISION_FLOW)
        .tls(self.keys.client_tls(&self.sni))
        .build())
    }
}

/// VLESS + Reality carried over a gRPC transport.
#[derive(Debug, Clone, Default)]
pub struct RealityGrpc {
    pub port: u16,
    pub enabled: bool,
    pub uuid: String,
    pub sni: String,
    pub service_name: String,
    pub keys: RealityKeys,
}

impl RealityGrpc {
    fn transport_block(&self) -> Value {
        json!({
            "type": "grpc",
            "service_name": self.service_name,
        })
    }
}

impl Protocol for RealityGrpc {
    fn id(&self) -> ProtocolId {
        ProtocolId::RealityGrpc
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn validate(&self) -> ProtocolResult<()> {
        validate_vless(
            self.id(),
            self.port,
            self.enabled,
            &self.uuid,
            &self.sni,
            &self.keys,
        )?;
        if self.enabled {
            checks::non_empty(self.name(), "service name", &self.service_name)?;
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
        .users(vec![json!({ "uuid": self.uuid })])
        .tls(self.keys.server_tls(&self.sni))
        .transport(self.transport_block())
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
        .tls(self.keys.client_tls(&self.sni))
        .transport(self.transport_block())
        .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> RealityKeys {
        RealityKeys {
            private_key: "cFJ2ySMpGmZqXp0mB8ePa7W0sSJ7nTqgd6vB0pmyJ2A".to_string(),
            public_key: "Q5c0s8nbqJ0Kz3dW0n2Ew8fX2k3Zr1mQjR8iP7fH5lc".to_string(),
            short_id: "0123abcd".to_string(),
        }
    }

    fn vision() -> RealityVision {
        RealityVision {
            port: 12345,
            enabled: true,
            uuid: "2b1f3c1e-6a4e-4a59-9d7e-3f5c1b6e8a90".to_string(),
            sni: "www.example.com".to_string(),
            keys: keys(),
        }
    }

    #[test]
    fn vision_inbound_shape() {
        let inbound = vision().to_inbound().unwrap();
        assert_eq!(inbound["type"], "vless");
        assert_eq!(inbound["tag"], "vless-reality-vision-in");
        assert_eq!(inbound["listen_port"], 12345);
        assert_eq!(inbound["users"][0]["flow"], VISION_FLOW);
        let reality = &inbound["tls"]["reality"];
        assert_eq!(reality["enabled"], true);
        assert_eq!(reality["handshake"]["server"], "www.example.com");
        assert_eq!(reality["handshake"]["server_port"], 443);
        assert_eq!(reality["short_id"][0], "0123abcd");
    }

    #[test]
    fn vision_outbound_targets_loopback() {
        let outbound = vision().to_outbound().unwrap();
        assert_eq!(outbound["server"], LOOPBACK);
        assert_eq!(outbound["tls"]["reality"]["public_key"], keys().public_key);
        assert_eq!(outbound["tls"]["utls"]["fingerprint"], UTLS_FINGERPRINT);
    }

    #[test]
    fn public_key_required_even_when_disabled() {
        let mut p = vision();
        p.enabled = false;
        p.keys.public_key.clear();
        let err = p.validate().unwrap_err();
        assert_eq!(err.code(), "missing_reality_key");
    }

    #[test]
    fn private_key_and_short_id_only_required_when_enabled() {
        let mut p = vision();
        p.keys.private_key.clear();
        p.keys.short_id.clear();
        assert!(p.validate().is_err());

        p.enabled = false;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn to_inbound_propagates_validation_error() {
        let mut p = vision();
        p.uuid.clear();
        let expected = p.validate().unwrap_err();
        assert_eq!(p.to_inbound().unwrap_err(), expected);
        assert_eq!(p.to_outbound().unwrap_err(), expected);
    }

    #[test]
    fn grpc_carries_service_name() {
        let p = RealityGrpc {
            port: 12346,
            enabled: true,
            uuid: "2b1f3c1e-6a4e-4a59-9d7e-3f5c1b6e8a90".to_string(),
            sni: "www.example.com".to_string(),
            service_name: "grpc-svc".to_string(),
            keys: keys(),
        };
        let inbound = p.to_inbound().unwrap();
        assert_eq!(inbound["transport"]["type"], "grpc");
        assert_eq!(inbound["transport"]["service_name"], "grpc-svc");
        assert!(inbound["users"][0].get("flow").is_none());

        let mut missing = p.clone();
        missing.service_name.clear();
        assert!(missing.validate().is_err());
    }
}
