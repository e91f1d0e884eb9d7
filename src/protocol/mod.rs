//! Protocol abstraction layer.
//!
//! Each supported transport/security combination is a concrete type that owns
//! its fields, validation and wire encoding. All of them implement [`Protocol`];
//! [`AnyProtocol`] closes the set so downstream code (generator expansion,
//! firewall port extraction) can pattern-match on the variant instead of
//! inspecting the untyped output maps.
//!
//! Instances are projections of the domain configuration: built fresh for each
//! compilation pass by the factory and dropped once the engine document exists.

pub mod anytls;
pub mod builder;
pub mod checks;
pub mod error;
pub mod hysteria2;
pub mod reality;
pub mod shadowtls;
pub mod tuic;

use std::{fmt, ops::RangeInclusive};

pub use anytls::{AnyTls, AnyTlsReality, PaddingScheme};
pub use builder::{ConfigMap, InboundBuilder, OutboundBuilder};
pub use error::{ProtocolError, ProtocolResult};
pub use hysteria2::{Hysteria2, Obfs};
pub use reality::{RealityGrpc, RealityKeys, RealityVision};
pub use shadowtls::ShadowTls;
pub use tuic::Tuic;

/// Bind address for public listeners (dual stack).
pub const LISTEN_ANY: &str = "::";
/// Address used by companion listeners and local sanity outbounds.
pub const LOOPBACK: &str = "127.0.0.1";
/// uTLS fingerprint presented by generated client definitions.
pub const UTLS_FINGERPRINT: &str = "chrome";

/// Stable identity of a supported protocol.
///
/// Discriminants are persisted by UI selections and port tables; never reorder them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ProtocolId {
    RealityVision = 1,
    RealityGrpc = 2,
    Hysteria2 = 3,
    Tuic = 4,
    AnyTls = 5,
    AnyTlsReality = 6,
    ShadowTls = 7,
}

impl ProtocolId {
    const ALL: [ProtocolId; 7] = [
        ProtocolId::RealityVision,
        ProtocolId::RealityGrpc,
        ProtocolId::Hysteria2,
        ProtocolId::Tuic,
        ProtocolId::AnyTls,
        ProtocolId::AnyTlsReality,
        ProtocolId::ShadowTls,
    ];

    /// Every protocol in its fixed order.
    pub fn all() -> &'static [ProtocolId] {
        &Self::ALL
    }

    /// Whether a raw integer names a protocol.
    pub fn is_valid(raw: i64) -> bool {
        (1..=Self::ALL.len() as i64).contains(&raw)
    }

    /// Human-readable name shown in menus and logs
    pub fn display_name(self) -> &'static str {
        match self {
            ProtocolId::RealityVision => "VLESS Reality Vision",
            ProtocolId::RealityGrpc => "VLESS Reality gRPC",
            ProtocolId::Hysteria2 => "Hysteria2",
            ProtocolId::Tuic => "TUIC v5",
            ProtocolId::AnyTls => "AnyTLS",
            ProtocolId::AnyTlsReality => "AnyTLS Reality",
            ProtocolId::ShadowTls => "ShadowTLS v3",
        }
    }

    /// Engine `type` value of the primary listener
    pub fn type_tag(self) -> &'static str {
        match self {
            ProtocolId::RealityVision | ProtocolId::RealityGrpc => "vless",
            ProtocolId::Hysteria2 => "hysteria2",
            ProtocolId::Tuic => "tuic",
            ProtocolId::AnyTls | ProtocolId::AnyTlsReality => "anytls",
            ProtocolId::ShadowTls => "shadowtls",
        }
    }

    /// Slug used to derive inbound/outbound tags and CLI names
    pub fn slug(self) -> &'static str {
        match self {
            ProtocolId::RealityVision => "vless-reality-vision",
            ProtocolId::RealityGrpc => "vless-reality-grpc",
            ProtocolId::Hysteria2 => "hysteria2",
            ProtocolId::Tuic => "tuic",
            ProtocolId::AnyTls => "anytls",
            ProtocolId::AnyTlsReality => "anytls-reality",
            ProtocolId::ShadowTls => "shadowtls",
        }
    }

    pub fn inbound_tag(self) -> String {
        format!("{}-in", self.slug())
    }

    pub fn outbound_tag(self) -> String {
        format!("{}-out", self.slug())
    }

    /// Transport the public listener binds
    pub fn transport(self) -> Transport {
        match self {
            ProtocolId::Hysteria2 | ProtocolId::Tuic => Transport::Udp,
            _ => Transport::Tcp,
        }
    }

    /// Look a protocol up by its slug
    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.slug() == slug)
    }
}

impl TryFrom<i64> for ProtocolId {
    type Error = i64;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        if Self::is_valid(raw) {
            Ok(Self::ALL[(raw - 1) as usize])
        } else {
            Err(raw)
        }
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Transport layer of a listener, used for firewall rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Tcp,
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => write!(f, "tcp"),
            Transport::Udp => write!(f, "udp"),
        }
    }
}

/// A port (or port range) a protocol needs opened on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenPort {
    pub protocol: ProtocolId,
    pub ports: RangeInclusive<u16>,
    pub transport: Transport,
}

/// Capability set shared by every protocol variant.
pub trait Protocol: Send + Sync + fmt::Debug {
    fn id(&self) -> ProtocolId;

    /// Public listen port
    fn port(&self) -> u16;

    fn enabled(&self) -> bool;

    /// Check ports, credentials and key material.
    fn validate(&self) -> ProtocolResult<()>;

    /// Server-side listener definition. Validates first.
    fn to_inbound(&self) -> ProtocolResult<ConfigMap>;

    /// Client-side definition targeting the loopback address. Validates first.
    fn to_outbound(&self) -> ProtocolResult<ConfigMap>;

    /// Engine `type` value
    fn protocol_type(&self) -> &'static str {
        self.id().type_tag()
    }

    fn name(&self) -> &'static str {
        self.id().display_name()
    }
}

/// Closed set of protocol instances produced by the factory.
#[derive(Debug, Clone)]
pub enum AnyProtocol {
    RealityVision(RealityVision),
    RealityGrpc(RealityGrpc),
    Hysteria2(Hysteria2),
    Tuic(Tuic),
    AnyTls(AnyTls),
    AnyTlsReality(AnyTlsReality),
    ShadowTls(ShadowTls),
}

impl AnyProtocol {
    pub fn as_protocol(&self) -> &dyn Protocol {
        match self {
            AnyProtocol::RealityVision(p) => p,
            AnyProtocol::RealityGrpc(p) => p,
            AnyProtocol::Hysteria2(p) => p,
            AnyProtocol::Tuic(p) => p,
            AnyProtocol::AnyTls(p) => p,
            AnyProtocol::AnyTlsReality(p) => p,
            AnyProtocol::ShadowTls(p) => p,
        }
    }

    /// All listener entries this protocol contributes.
    ///
    /// ShadowTLS yields its public listener followed by the loopback
    /// Shadowsocks companion; every other protocol yields one entry.
    pub fn inbounds(&self) -> ProtocolResult<Vec<ConfigMap>> {
        match self {
            AnyProtocol::ShadowTls(p) => Ok(vec![p.to_inbound()?, p.to_detour_inbound()?]),
            other => Ok(vec![other.to_inbound()?]),
        }
    }

    /// All client entries, entry point first.
    ///
    /// For ShadowTLS the chain reverses: the Shadowsocks outbound detours
    /// through the ShadowTLS outbound.
    pub fn outbounds(&self) -> ProtocolResult<Vec<ConfigMap>> {
        match self {
            AnyProtocol::ShadowTls(p) => Ok(vec![p.to_outbound()?, p.to_detour_outbound()?]),
            other => Ok(vec![other.to_outbound()?]),
        }
    }

    /// Host ports this protocol needs reachable.
    pub fn listen_ports(&self) -> Vec<ListenPort> {
        let id = self.id();
        let mut ports = vec![ListenPort {
            protocol: id,
            ports: self.port()..=self.port(),
            transport: id.transport(),
        }];

        if let AnyProtocol::Hysteria2(p) = self {
            if let Ok(Some(range)) = p.hopping_range() {
                ports.push(ListenPort {
                    protocol: id,
                    ports: range,
                    transport: Transport::Udp,
                });
            }
        }

        ports
    }
}

impl Protocol for AnyProtocol {
    fn id(&self) -> ProtocolId {
        self.as_protocol().id()
    }

    fn port(&self) -> u16 {
        self.as_protocol().port()
    }

    fn enabled(&self) -> bool {
        self.as_protocol().enabled()
    }

    fn validate(&self) -> ProtocolResult<()> {
        self.as_protocol().validate()
    }

    fn to_inbound(&self) -> ProtocolResult<ConfigMap> {
        self.as_protocol().to_inbound()
    }

    fn to_outbound(&self) -> ProtocolResult<ConfigMap> {
        self.as_protocol().to_outbound()
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for AnyProtocol {
                fn from(p: $variant) -> Self {
                    AnyProtocol::$variant(p)
                }
            }
        )*
    };
}

impl_from_variant!(
    RealityVision,
    RealityGrpc,
    Hysteria2,
    Tuic,
    AnyTls,
    AnyTlsReality,
    ShadowTls,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_ids_in_fixed_order() {
        let ids: Vec<u8> = ProtocolId::all().iter().map(|id| *id as u8).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn ids_round_trip_through_is_valid() {
        for id in ProtocolId::all() {
            let raw = *id as i64;
            assert!(ProtocolId::is_valid(raw));
            assert_eq!(ProtocolId::try_from(raw), Ok(*id));
        }
        for raw in [-1, 0, 8, 42, i64::MAX] {
            assert!(!ProtocolId::is_valid(raw));
            assert!(ProtocolId::try_from(raw).is_err());
        }
    }

    #[test]
    fn slugs_are_unique_and_resolvable() {
        for id in ProtocolId::all() {
            assert_eq!(ProtocolId::from_slug(id.slug()), Some(*id));
        }
        assert_eq!(ProtocolId::from_slug("trojan"), None);
        assert_eq!(ProtocolId::Tuic.inbound_tag(), "tuic-in");
        assert_eq!(ProtocolId::ShadowTls.outbound_tag(), "shadowtls-out");
    }

    #[test]
    fn transports() {
        assert_eq!(ProtocolId::Hysteria2.transport(), Transport::Udp);
        assert_eq!(ProtocolId::Tuic.transport(), Transport::Udp);
        assert_eq!(ProtocolId::AnyTls.transport(), Transport::Tcp);
    }
}
