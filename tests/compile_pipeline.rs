use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use sbforge::{
    ConfigPipeline, DomainConfig, FsCertificateResolver, ProtocolFactory, ProtocolId,
    SingboxGenerator, StaticVersionProbe,
    core::{Dialect, EngineConfig, PipelineError},
    ports::EngineDeployer,
    protocol::Transport,
};
use tempfile::TempDir;

/// Keeps every deployed document in memory.
#[derive(Default)]
struct MemoryDeployer {
    deployed: Mutex<Vec<EngineConfig>>,
}

impl MemoryDeployer {
    fn count(&self) -> usize {
        self.deployed.lock().unwrap().len()
    }

    fn last(&self) -> Option<EngineConfig> {
        self.deployed.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl EngineDeployer for MemoryDeployer {
    async fn deploy(&self, config: &EngineConfig) -> eyre::Result<()> {
        self.deployed.lock().unwrap().push(config.clone());
        Ok(())
    }
}

fn generator(version: &str) -> SingboxGenerator {
    SingboxGenerator::new(
        ProtocolFactory::new(Arc::new(FsCertificateResolver::new())),
        Arc::new(StaticVersionProbe::new(version)),
        Duration::from_secs(1),
    )
}

fn base_config(certs: &TempDir) -> DomainConfig {
    let mut config = DomainConfig::generate_default();
    config.cert_dir = certs.path().to_string_lossy().into_owned();
    config
}

#[tokio::test]
async fn reality_vision_on_current_engine() {
    let certs = TempDir::new().unwrap();
    let mut config = base_config(&certs);
    config.reality_vision.enabled = true;
    config.reality_vision.port = 12345;

    let compilation = generator("1.12.0").compile(&config).await.unwrap();
    assert_eq!(compilation.dialect, Dialect::Current);
    assert_eq!(compilation.engine_version.as_deref(), Some("1.12.0"));
    assert!(compilation.skipped.is_empty());

    let doc = compilation.config;
    assert_eq!(doc.inbounds.len(), 1);
    let inbound = &doc.inbounds[0];
    assert_eq!(inbound["type"], "vless");
    assert_eq!(inbound["listen_port"], 12345);
    assert_eq!(inbound["tls"]["reality"]["enabled"], true);
    assert!(!doc.has_outbound("dns-out"));
    assert!(!doc.has_outbound("block"));
    assert_eq!(doc.route.rules[0].action.as_deref(), Some("sniff"));
}

#[tokio::test]
async fn legacy_engine_gets_special_outbounds() {
    let certs = TempDir::new().unwrap();
    let mut config = base_config(&certs);
    config.reality_vision.enabled = true;

    let compilation = generator("1.11.0").compile(&config).await.unwrap();
    assert_eq!(compilation.dialect, Dialect::Legacy);

    let doc = compilation.config;
    assert!(doc.has_outbound("block"));
    assert!(doc.has_outbound("dns-out"));
    assert_eq!(doc.inbounds[0]["sniff"], true);
    assert!(doc.route.rules.iter().all(|r| r.action.is_none()));
}

#[tokio::test]
async fn self_signed_protocols_share_generated_pair() {
    let certs = TempDir::new().unwrap();
    let mut config = base_config(&certs);
    config.hysteria2.enabled = true;
    config.tuic.enabled = true;

    let doc = generator("1.12.0").generate(&config).await.unwrap();
    assert_eq!(doc.inbounds.len(), 2);
    let hy2 = &doc.inbounds[0]["tls"];
    let tuic = &doc.inbounds[1]["tls"];
    assert_eq!(hy2["certificate_path"], tuic["certificate_path"]);
    assert!(certs.path().join("self_signed.crt").exists());
    assert!(certs.path().join("self_signed.key").exists());
}

#[tokio::test]
async fn enabling_invalid_protocol_fails_loudly() {
    let certs = TempDir::new().unwrap();
    let mut config = base_config(&certs);
    config.password = String::new();
    let deployer = Arc::new(MemoryDeployer::default());
    let pipeline = ConfigPipeline::new(config, generator("1.12.0"), deployer.clone());

    let err = pipeline
        .set_protocol_enabled(ProtocolId::Tuic, true)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Protocol(ref e) if e.code() == "missing_field"));
    assert!(!pipeline.snapshot().tuic.enabled);
    assert_eq!(deployer.count(), 0);
    // a refused toggle leaves no key material behind
    assert!(!certs.path().join("self_signed.crt").exists());
    assert!(!certs.path().join("self_signed.key").exists());

    pipeline
        .apply(|config| {
            config.tuic.password = "tuic-secret".to_string();
            Ok(())
        })
        .await
        .unwrap();
    let compilation = pipeline
        .set_protocol_enabled(ProtocolId::Tuic, true)
        .await
        .unwrap();
    assert_eq!(compilation.config.inbounds.len(), 1);
    assert!(pipeline.snapshot().tuic.enabled);
    assert_eq!(deployer.count(), 2);
    assert_eq!(deployer.last().unwrap().inbounds[0]["type"], "tuic");
}

#[tokio::test]
async fn invalid_update_keeps_previous_snapshot() {
    let certs = TempDir::new().unwrap();
    let mut config = base_config(&certs);
    config.anytls.enabled = true;
    let deployer = Arc::new(MemoryDeployer::default());
    let pipeline = ConfigPipeline::new(config, generator("1.12.0"), deployer.clone());
    let before = pipeline.snapshot();

    let err = pipeline
        .apply(|config| {
            config.reality_vision.enabled = true;
            config.reality_vision.port = config.anytls.port;
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(Arc::ptr_eq(&before, &pipeline.snapshot()));

    let err = pipeline
        .apply(|_| Err(eyre::eyre!("operator cancelled")))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Rejected(_)));
    assert_eq!(deployer.count(), 0);
}

#[tokio::test]
async fn listen_ports_follow_protocol_order() {
    let certs = TempDir::new().unwrap();
    let mut config = base_config(&certs);
    config.shadowtls.enabled = true;
    config.hysteria2.enabled = true;
    config.hysteria2.port_hopping = "30000-30100".to_string();
    config.reality_grpc.enabled = true;
    let pipeline = ConfigPipeline::new(
        config.clone(),
        generator("1.12.0"),
        Arc::new(MemoryDeployer::default()),
    );

    let ports = pipeline.listen_ports();
    let summary: Vec<_> = ports
        .iter()
        .map(|p| (p.protocol, *p.ports.start(), *p.ports.end(), p.transport))
        .collect();
    assert_eq!(
        summary,
        vec![
            (
                ProtocolId::RealityGrpc,
                config.reality_grpc.port,
                config.reality_grpc.port,
                Transport::Tcp
            ),
            (
                ProtocolId::Hysteria2,
                config.hysteria2.port,
                config.hysteria2.port,
                Transport::Udp
            ),
            (ProtocolId::Hysteria2, 30000, 30100, Transport::Udp),
            (
                ProtocolId::ShadowTls,
                config.shadowtls.port,
                config.shadowtls.port,
                Transport::Tcp
            ),
        ]
    );
}

#[tokio::test]
async fn reload_replaces_configuration() {
    let certs = TempDir::new().unwrap();
    let config = base_config(&certs);
    let deployer = Arc::new(MemoryDeployer::default());
    let pipeline = ConfigPipeline::new(config.clone(), generator("1.12.0"), deployer.clone());

    let mut next = config;
    next.anytls_reality.enabled = true;
    let compilation = pipeline.reload(next).await.unwrap();

    assert_eq!(compilation.config.inbounds.len(), 1);
    assert!(pipeline.snapshot().is_enabled(ProtocolId::AnyTlsReality));
    assert_eq!(deployer.count(), 1);
}

#[tokio::test]
async fn reload_without_vpn_address_keeps_old_snapshot() {
    let certs = TempDir::new().unwrap();
    let mut config = base_config(&certs);
    config.reality_vision.enabled = true;
    let deployer = Arc::new(MemoryDeployer::default());
    let pipeline = ConfigPipeline::new(config.clone(), generator("1.12.0"), deployer.clone());
    let before = pipeline.snapshot();

    let mut next = config;
    next.routing.vpn.enabled = true;
    next.routing.vpn.private_key = "wg-private".to_string();
    next.routing.vpn.peer_public_key = "wg-peer".to_string();
    next.routing.vpn.domains = vec!["openai.com".to_string()];
    let err = pipeline.reload(next.clone()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(err.to_string().contains("routing.vpn.local_address"));
    assert!(Arc::ptr_eq(&before, &pipeline.snapshot()));
    assert!(!pipeline.snapshot().routing.vpn.enabled);
    assert_eq!(deployer.count(), 0);

    next.routing.vpn.local_address = vec!["172.16.0.2/32".to_string()];
    let compilation = pipeline.reload(next).await.unwrap();
    assert!(compilation.config.has_outbound("warp"));
    assert_eq!(deployer.count(), 1);
}
