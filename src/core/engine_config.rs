//! Typed skeleton of the engine document.
//!
//! The top-level blocks are typed; inbound and outbound bodies stay untyped
//! maps since their shape differs per protocol and per engine release.
use serde::{Deserialize, Serialize};

use crate::protocol::ConfigMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub log: LogBlock,
    pub dns: DnsBlock,
    pub inbounds: Vec<ConfigMap>,
    pub outbounds: Vec<ConfigMap>,
    pub route: RouteBlock,
}

impl EngineConfig {
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Tags of every outbound, in order
    pub fn outbound_tags(&self) -> Vec<&str> {
        self.outbounds
            .iter()
            .filter_map(|o| o.get("tag").and_then(|t| t.as_str()))
            .collect()
    }

    pub fn has_outbound(&self, tag: &str) -> bool {
        self.outbound_tags().contains(&tag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogBlock {
    pub level: String,
    pub timestamp: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsBlock {
    pub servers: Vec<DnsServer>,
    pub rules: Vec<DnsRule>,
    #[serde(rename = "final")]
    pub final_server: String,
    /// Legacy engines only
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub strategy: Option<String>,
}

/// A resolver entry. Legacy engines use `address`; current ones use `type` + `server`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsServer {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub address: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub server: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRule {
    pub rule_set: Vec<String>,
    pub server: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteBlock {
    pub rule_set: Vec<RuleSet>,
    pub rules: Vec<RouteRule>,
    #[serde(rename = "final")]
    pub final_outbound: String,
    pub auto_detect_interface: bool,
    /// Current engines only
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_domain_resolver: Option<String>,
}

/// Remote binary rule-set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub tag: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub format: String,
    pub url: String,
    pub download_detour: String,
}

/// One route rule. Matchers are optional; exactly one of `outbound` or
/// `action` is set depending on the engine dialect.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteRule {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rule_set: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub domain_suffix: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub outbound: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub action: Option<String>,
}

impl RouteRule {
    pub fn to_outbound(outbound: &str) -> Self {
        Self {
            outbound: Some(outbound.to_string()),
            ..Self::default()
        }
    }

    pub fn with_action(action: &str) -> Self {
        Self {
            action: Some(action.to_string()),
            ..Self::default()
        }
    }

    pub fn protocol(mut self, protocol: &str) -> Self {
        self.protocol = Some(protocol.to_string());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn rule_sets(mut self, tags: &[&str]) -> Self {
        self.rule_set = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn domain_suffix(mut self, domains: Vec<String>) -> Self {
        self.domain_suffix = Some(domains);
        self
    }
}
