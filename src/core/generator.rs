//! Version-aware compiler from `DomainConfig` to the engine document.
//!
//! The document is rebuilt from scratch on every call. Protocol failures are
//! recorded and skipped; DNS, outbound and route failures abort the call.
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
    config::{models::DomainConfig, validation::is_valid_domain},
    core::{
        engine_config::{
            DnsBlock, DnsRule, DnsServer, EngineConfig, LogBlock, RouteBlock, RouteRule, RuleSet,
        },
        factory::ProtocolFactory,
        version::Dialect,
    },
    ports::VersionProbe,
    protocol::{AnyProtocol, ConfigMap, OutboundBuilder, Protocol, ProtocolError, ProtocolId},
    tracing_setup::create_compile_span,
};

pub const DIRECT_TAG: &str = "direct";
pub const BLOCK_TAG: &str = "block";
pub const DNS_OUT_TAG: &str = "dns-out";
pub const DIRECT_IPV6_TAG: &str = "direct-ipv6";
pub const WARP_TAG: &str = "warp";
pub const DNS_REMOTE_TAG: &str = "dns-remote";
pub const DNS_LOCAL_TAG: &str = "dns-local";

const GEOSITE_CN: &str = "geosite-cn";
const GEOIP_CN: &str = "geoip-cn";
const GEOSITE_ADS: &str = "geosite-ads";

const RULE_SETS: &[(&str, &str)] = &[
    (
        GEOSITE_CN,
        "https://raw.githubusercontent.com/SagerNet/sing-geosite/rule-set/geosite-cn.srs",
    ),
    (
        GEOIP_CN,
        "https://raw.githubusercontent.com/SagerNet/sing-geoip/rule-set/geoip-cn.srs",
    ),
    (
        GEOSITE_ADS,
        "https://raw.githubusercontent.com/SagerNet/sing-geosite/rule-set/geosite-category-ads-all.srs",
    ),
];

/// Stage-tagged failure that aborts a whole compilation
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum GenerateError {
    #[error("dns stage failed: {0}")]
    Dns(String),

    #[error("inbound stage failed: {0}")]
    Inbound(String),

    #[error("outbound stage failed: {0}")]
    Outbound(String),

    #[error("route stage failed: {0}")]
    Route(String),
}

impl GenerateError {
    pub fn stage(&self) -> &'static str {
        match self {
            GenerateError::Dns(_) => "dns",
            GenerateError::Inbound(_) => "inbound",
            GenerateError::Outbound(_) => "outbound",
            GenerateError::Route(_) => "route",
        }
    }
}

/// A protocol left out of the document, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedProtocol {
    pub protocol: ProtocolId,
    pub error: ProtocolError,
}

/// Result of one compilation pass
#[derive(Debug, Clone)]
pub struct Compilation {
    pub config: EngineConfig,
    pub skipped: Vec<SkippedProtocol>,
    pub dialect: Dialect,
    pub engine_version: Option<String>,
}

pub struct SingboxGenerator {
    factory: ProtocolFactory,
    probe: Arc<dyn VersionProbe>,
    version: Mutex<Option<String>>,
    probe_timeout: Duration,
}

impl SingboxGenerator {
    pub fn new(
        factory: ProtocolFactory,
        probe: Arc<dyn VersionProbe>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            probe,
            version: Mutex::new(None),
            probe_timeout,
        }
    }

    /// Seed the version cache so no probe runs.
    pub fn with_fixed_version(self, version: impl Into<String>) -> Self {
        self.set_version(Some(version.into()));
        self
    }

    pub fn factory(&self) -> &ProtocolFactory {
        &self.factory
    }

    fn cached_version(&self) -> Option<String> {
        self.version
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_version(&self, version: Option<String>) {
        *self
            .version
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = version;
    }

    /// Cached engine version, probing once if nothing is cached yet.
    ///
    /// The cache lock is never held across the probe. Probe failures and
    /// timeouts leave the cache unchanged.
    pub async fn engine_version(&self) -> Option<String> {
        if let Some(version) = self.cached_version() {
            return Some(version);
        }

        match tokio::time::timeout(self.probe_timeout, self.probe.probe()).await {
            Ok(Ok(version)) => {
                let mut cache = self
                    .version
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                // another caller may have filled it meanwhile
                Some(cache.get_or_insert(version).clone())
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Engine version probe failed");
                self.cached_version()
            }
            Err(_) => {
                debug!(
                    timeout_ms = self.probe_timeout.as_millis() as u64,
                    "Engine version probe timed out"
                );
                self.cached_version()
            }
        }
    }

    /// Compile against the detected engine version.
    ///
    /// Protocol instances are built on the blocking pool since certificate
    /// resolution may read, generate and write key material.
    pub async fn compile(&self, config: &DomainConfig) -> Result<Compilation, GenerateError> {
        let version = self.engine_version().await;
        let dialect = Dialect::from_version(version.as_deref());

        let factory = self.factory.clone();
        let owned = config.clone();
        let protocols = tokio::task::spawn_blocking(move || factory.from_config(&owned))
            .await
            .map_err(|e| GenerateError::Inbound(format!("protocol build task failed: {e}")))?;

        let mut compilation = self.assemble(config, dialect, protocols)?;
        compilation.engine_version = version;
        Ok(compilation)
    }

    pub async fn generate(&self, config: &DomainConfig) -> Result<EngineConfig, GenerateError> {
        Ok(self.compile(config).await?.config)
    }

    /// Compile for an explicit dialect without touching the version cache.
    /// Runs certificate resolution on the calling thread.
    pub fn compile_with_dialect(
        &self,
        config: &DomainConfig,
        dialect: Dialect,
    ) -> Result<Compilation, GenerateError> {
        let protocols = self.factory.from_config(config);
        self.assemble(config, dialect, protocols)
    }

    fn assemble(
        &self,
        config: &DomainConfig,
        dialect: Dialect,
        protocols: Vec<AnyProtocol>,
    ) -> Result<Compilation, GenerateError> {
        let span = create_compile_span(&self.cached_version().unwrap_or_default());
        span.record("engine.dialect", tracing::field::display(dialect));
        let _enter = span.enter();

        let log = LogBlock {
            level: config.log.level.clone(),
            timestamp: true,
        };
        let dns = build_dns(config, dialect)?;
        let (inbounds, skipped) = build_inbounds(protocols, dialect);
        let outbounds = build_outbounds(config, dialect)?;
        let route = build_route(config, dialect)?;

        span.record("inbounds", inbounds.len());
        span.record("skipped", skipped.len());
        info!(
            dialect = %dialect,
            inbounds = inbounds.len(),
            outbounds = outbounds.len(),
            skipped = skipped.len(),
            "Compiled engine configuration"
        );

        Ok(Compilation {
            config: EngineConfig {
                log,
                dns,
                inbounds,
                outbounds,
                route,
            },
            skipped,
            dialect,
            engine_version: self.cached_version(),
        })
    }

}

fn build_inbounds(
    protocols: Vec<AnyProtocol>,
    dialect: Dialect,
) -> (Vec<ConfigMap>, Vec<SkippedProtocol>) {
    let mut inbounds = Vec::new();
    let mut skipped = Vec::new();

    for protocol in protocols {
        match protocol.inbounds() {
            Ok(entries) => {
                for mut entry in entries {
                    if dialect.is_legacy() {
                        entry.insert("sniff".to_string(), Value::Bool(true));
                    }
                    inbounds.push(entry);
                }
            }
            Err(error) => {
                warn!(
                    protocol = protocol.name(),
                    code = error.code(),
                    error = %error,
                    "Skipping protocol"
                );
                skipped.push(SkippedProtocol {
                    protocol: protocol.id(),
                    error,
                });
            }
        }
    }
    (inbounds, skipped)
}

/// Host part of a DoH resolver given as `1.1.1.1` or `https://host/dns-query`.
pub(crate) fn doh_host(remote: &str) -> &str {
    let host = remote.strip_prefix("https://").unwrap_or(remote);
    host.split('/').next().unwrap_or(host)
}

fn build_dns(config: &DomainConfig, dialect: Dialect) -> Result<DnsBlock, GenerateError> {
    let dns = &config.routing.dns;
    let remote = dns.remote.trim();
    let local = dns.local.trim();
    if remote.is_empty() || doh_host(remote).is_empty() {
        return Err(GenerateError::Dns("remote resolver is empty".to_string()));
    }
    if local.is_empty() {
        return Err(GenerateError::Dns("local resolver is empty".to_string()));
    }

    let (servers, strategy) = match dialect {
        Dialect::Legacy => (
            vec![
                DnsServer {
                    tag: DNS_REMOTE_TAG.to_string(),
                    address: Some(format!("https://{}/dns-query", doh_host(remote))),
                    kind: None,
                    server: None,
                },
                DnsServer {
                    tag: DNS_LOCAL_TAG.to_string(),
                    address: Some(local.to_string()),
                    kind: None,
                    server: None,
                },
            ],
            Some(if dns.strategy.trim().is_empty() {
                "prefer_ipv4".to_string()
            } else {
                dns.strategy.trim().to_string()
            }),
        ),
        Dialect::Current => (
            vec![
                DnsServer {
                    tag: DNS_REMOTE_TAG.to_string(),
                    address: None,
                    kind: Some("https".to_string()),
                    server: Some(doh_host(remote).to_string()),
                },
                DnsServer {
                    tag: DNS_LOCAL_TAG.to_string(),
                    address: None,
                    kind: Some("udp".to_string()),
                    server: Some(local.to_string()),
                },
            ],
            None,
        ),
    };

    Ok(DnsBlock {
        servers,
        rules: vec![DnsRule {
            rule_set: vec![GEOSITE_CN.to_string()],
            server: DNS_LOCAL_TAG.to_string(),
        }],
        final_server: DNS_REMOTE_TAG.to_string(),
        strategy,
    })
}

fn tagged(kind: &str, tag: &str) -> ConfigMap {
    let mut map = ConfigMap::new();
    map.insert("type".to_string(), json!(kind));
    map.insert("tag".to_string(), json!(tag));
    map
}

fn build_outbounds(
    config: &DomainConfig,
    dialect: Dialect,
) -> Result<Vec<ConfigMap>, GenerateError> {
    let routing = &config.routing;
    let mut outbounds = vec![tagged("direct", DIRECT_TAG)];

    if dialect.is_legacy() {
        outbounds.push(tagged("block", BLOCK_TAG));
        outbounds.push(tagged("dns", DNS_OUT_TAG));
    }

    if routing.ipv6.enabled {
        let mut direct6 = tagged("direct", DIRECT_IPV6_TAG);
        match dialect {
            Dialect::Legacy => {
                direct6.insert("domain_strategy".to_string(), json!("ipv6_only"));
            }
            Dialect::Current => {
                direct6.insert(
                    "domain_resolver".to_string(),
                    json!({ "server": DNS_REMOTE_TAG, "strategy": "ipv6_only" }),
                );
            }
        }
        outbounds.push(direct6);
    }

    if routing.vpn.enabled {
        let vpn = &routing.vpn;
        for (value, field) in [
            (&vpn.server, "server"),
            (&vpn.private_key, "private_key"),
            (&vpn.peer_public_key, "peer_public_key"),
        ] {
            if value.trim().is_empty() {
                return Err(GenerateError::Outbound(format!(
                    "VPN egress is enabled but {field} is empty"
                )));
            }
        }
        if vpn.local_address.is_empty() {
            return Err(GenerateError::Outbound(
                "VPN egress is enabled but local_address is empty".to_string(),
            ));
        }

        let mut warp = OutboundBuilder::new("wireguard", WARP_TAG, &vpn.server, vpn.server_port)
            .set("local_address", json!(vpn.local_address))
            .set("private_key", vpn.private_key.as_str())
            .set("peer_public_key", vpn.peer_public_key.as_str())
            .set("mtu", vpn.mtu);
        if !vpn.reserved.is_empty() {
            warp = warp.set("reserved", json!(vpn.reserved));
        }
        outbounds.push(warp.build());
    }

    Ok(outbounds)
}

/// Either `outbound: <legacy>` or `action: <current>`.
fn dialect_rule(dialect: Dialect, legacy_outbound: &str, action: &str) -> RouteRule {
    match dialect {
        Dialect::Legacy => RouteRule::to_outbound(legacy_outbound),
        Dialect::Current => RouteRule::with_action(action),
    }
}

fn domain_rule(
    domains: &[String],
    outbound: &str,
    field: &str,
) -> Result<Option<RouteRule>, GenerateError> {
    if let Some(bad) = domains.iter().find(|d| !is_valid_domain(d)) {
        return Err(GenerateError::Route(format!("invalid domain '{bad}' in {field}")));
    }
    if domains.is_empty() {
        return Ok(None);
    }
    Ok(Some(RouteRule::to_outbound(outbound).domain_suffix(domains.to_vec())))
}

fn build_route(config: &DomainConfig, dialect: Dialect) -> Result<RouteBlock, GenerateError> {
    let routing = &config.routing;

    let rule_set = RULE_SETS
        .iter()
        .map(|(tag, url)| RuleSet {
            tag: tag.to_string(),
            kind: "remote".to_string(),
            format: "binary".to_string(),
            url: url.to_string(),
            download_detour: DIRECT_TAG.to_string(),
        })
        .collect();

    let mut rules = Vec::new();
    if dialect == Dialect::Current {
        rules.push(RouteRule::with_action("sniff"));
    }
    rules.push(dialect_rule(dialect, DNS_OUT_TAG, "hijack-dns").protocol("dns"));
    if routing.dns_redirect {
        rules.push(dialect_rule(dialect, DNS_OUT_TAG, "hijack-dns").port(53));
    }
    rules.push(dialect_rule(dialect, BLOCK_TAG, "reject").rule_sets(&[GEOSITE_ADS]));

    if routing.vpn.enabled {
        rules.extend(domain_rule(&routing.vpn.domains, WARP_TAG, "routing.vpn.domains")?);
    }
    if routing.ipv6.enabled {
        rules.extend(domain_rule(
            &routing.ipv6.domains,
            DIRECT_IPV6_TAG,
            "routing.ipv6.domains",
        )?);
    }
    rules.push(RouteRule::to_outbound(DIRECT_TAG).rule_sets(&[GEOSITE_CN, GEOIP_CN]));

    Ok(RouteBlock {
        rule_set,
        rules,
        final_outbound: DIRECT_TAG.to_string(),
        auto_detect_interface: true,
        default_domain_resolver: (dialect == Dialect::Current).then(|| DNS_REMOTE_TAG.to_string()),
    })
}
