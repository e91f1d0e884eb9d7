use std::{path::Path, sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use sbforge::{
    ConfigPipeline, DomainConfig, Protocol, ProtocolFactory, SingboxGenerator,
    adapters::{
        CommandVersionProbe, FileConfigProvider, FileDeployer, FsCertificateResolver,
        StaticVersionProbe,
    },
    config::{
        DomainConfigValidator, load_config, load_config_sync, save_config, secrets,
        validation::config_section,
    },
    core::{Compilation, PipelineError},
    ports::{ConfigProvider, EngineDeployer, VersionProbe},
    tracing_setup,
};
use tracing::Instrument;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.json")]
    config: String,

    /// Log filter (RUST_LOG syntax); RUST_LOG wins when set
    #[clap(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit JSON logs
    #[clap(long, global = true)]
    json: bool,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Compile the engine document (default)
    Generate {
        #[clap(short, long, default_value = "config.json")]
        config: String,
        /// Write the document here instead of stdout
        #[clap(short, long)]
        output: Option<String>,
        /// Compile for this engine version instead of probing the binary
        #[clap(long)]
        engine_version: Option<String>,
    },
    /// Validate configuration file
    Validate {
        #[clap(short, long, default_value = "config.json")]
        config: String,
    },
    /// Initialize a new configuration file with fresh credentials
    Init {
        #[clap(short, long, default_value = "config.json")]
        config: String,
    },
    /// List the host ports the enabled protocols listen on
    Ports {
        #[clap(short, long, default_value = "config.json")]
        config: String,
    },
    /// Print a fresh Reality key pair and short id
    Keygen,
    /// Deploy, then redeploy whenever the configuration file changes
    Watch {
        #[clap(short, long, default_value = "config.json")]
        config: String,
    },
}

fn create_version_probe(config: &DomainConfig, pinned: Option<String>) -> Arc<dyn VersionProbe> {
    match pinned.or_else(|| config.engine.version.clone()) {
        Some(version) => Arc::new(StaticVersionProbe::new(version)),
        None => Arc::new(CommandVersionProbe::new(config.engine.binary.clone())),
    }
}

fn create_generator(config: &DomainConfig, pinned: Option<String>) -> SingboxGenerator {
    let factory = ProtocolFactory::new(Arc::new(FsCertificateResolver::new()));
    SingboxGenerator::new(
        factory,
        create_version_probe(config, pinned),
        Duration::from_millis(config.engine.probe_timeout_ms),
    )
}

/// A rejected update leaves the old snapshot live; a compile or deploy
/// failure happens after the new snapshot was published.
fn report_reload_failure(error: &PipelineError) {
    match error {
        PipelineError::Rejected(_) | PipelineError::Validation(_) | PipelineError::Protocol(_) => {
            tracing::error!("Reload rejected: {error}. Keeping old configuration.")
        }
        PipelineError::Generate(_) | PipelineError::Deploy(_) => tracing::error!(
            "Configuration reloaded but not deployed: {error}. The engine keeps its previous document."
        ),
    }
}

fn report_skipped(compilation: &Compilation) {
    for skipped in &compilation.skipped {
        eprintln!(
            "⚠️  Skipped {} [{}]: {}",
            skipped.protocol,
            skipped.error.code(),
            skipped.error
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone());
    tracing_setup::init_tracing_with_config(&filter, args.json, args.json)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    match args.command {
        Some(Commands::Generate {
            config,
            output,
            engine_version,
        }) => generate_command(&config, output, engine_version).await,
        None => generate_command(&args.config, None, None).await,
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Ports { config }) => ports_command(&config).await,
        Some(Commands::Keygen) => keygen_command(),
        Some(Commands::Watch { config }) => watch_command(&config).await,
    }
}

/// Compile the configuration and print or write the engine document
async fn generate_command(
    config_path: &str,
    output: Option<String>,
    engine_version: Option<String>,
) -> Result<()> {
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    let generator = create_generator(&config, engine_version);

    let compilation = generator
        .compile(&config)
        .await
        .context("Failed to compile engine configuration")?;
    report_skipped(&compilation);

    match output {
        Some(path) => {
            FileDeployer::new(&path)
                .deploy(&compilation.config)
                .await
                .with_context(|| format!("Failed to write {path}"))?;
            eprintln!(
                "✅ Wrote {} inbound(s) for sing-box {} ({} dialect) to {path}",
                compilation.config.inbounds.len(),
                compilation.engine_version.as_deref().unwrap_or("unknown"),
                compilation.dialect
            );
        }
        None => println!("{}", compilation.config.to_pretty_json()?),
    }
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config_sync(config_path) {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    let mut failed = false;
    match DomainConfigValidator::validate(&config) {
        Ok(()) => println!("✅ Structural validation: OK"),
        Err(e) => {
            eprintln!("❌ Structural validation failed:");
            eprintln!("{e}");
            failed = true;
        }
    }

    // Loud per-protocol checks, the same ones an interactive enable runs.
    // Certificate paths are computed, never generated.
    let factory = ProtocolFactory::new(Arc::new(FsCertificateResolver::new()));
    for protocol in factory.preview(&config) {
        let section = config_section(protocol.id());
        match protocol.validate() {
            Ok(()) => println!("✅ {} ({section}): OK", protocol.name()),
            Err(e) => {
                eprintln!("❌ {} ({section}) [{}]: {e}", protocol.name(), e.code());
                failed = true;
            }
        }
    }

    if failed {
        println!();
        println!("💡 Common fixes:");
        println!("   • Run 'sbforge keygen' for missing Reality keys");
        println!("   • Give every enabled protocol its own port per transport");
        println!("   • Set cert_domain on protocols using ACME certificates");
        std::process::exit(1);
    }

    println!();
    println!("📋 Configuration Summary:");
    println!("   • Schema version: {}", config.schema_version);
    println!("   • Enabled protocols: {}", config.enabled_protocol_ids().len());
    println!("   • WireGuard egress: {}", config.routing.vpn.enabled);
    println!("   • IPv6 split: {}", config.routing.ipv6.enabled);
    println!();
    println!("🎉 Configuration is valid and ready to use!");
    Ok(())
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let config = DomainConfig::generate_default();
    save_config(&config, path).context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   All protocols start disabled; enable them, then run");
    println!("   'sbforge generate --config {config_path}'");
    Ok(())
}

/// Print one line per host port (or range) to open
async fn ports_command(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    let factory = ProtocolFactory::new(Arc::new(FsCertificateResolver::new()));

    for protocol in factory.preview(&config) {
        for port in protocol.listen_ports() {
            let (start, end) = (*port.ports.start(), *port.ports.end());
            if start == end {
                println!("{}\t{start}\t{}", port.transport, port.protocol);
            } else {
                println!("{}\t{start}:{end}\t{}", port.transport, port.protocol);
            }
        }
    }
    Ok(())
}

fn keygen_command() -> Result<()> {
    let keys = secrets::reality_keypair();
    println!("PrivateKey: {}", keys.private_key);
    println!("PublicKey: {}", keys.public_key);
    println!("ShortId: {}", secrets::short_id());
    Ok(())
}

/// Hot reload: redeploy on every valid change, keep the last good snapshot otherwise
async fn watch_command(config_path: &str) -> Result<()> {
    let provider = FileConfigProvider::new(config_path)
        .with_context(|| format!("Failed to watch {config_path}"))?;
    let initial = provider
        .load_config()
        .await
        .with_context(|| format!("Failed to load initial config from {config_path}"))?;

    let deployer =
        FileDeployer::new(&initial.engine.config_path).with_backup(initial.backup.clone());
    let generator = create_generator(&initial, None);
    let pipeline = ConfigPipeline::new(initial, generator, Arc::new(deployer));

    let compilation = pipeline.deploy().await?;
    tracing::info!(
        inbounds = compilation.config.inbounds.len(),
        dialect = %compilation.dialect,
        "Initial engine configuration deployed"
    );

    let mut notify_rx = provider.watch()?;
    let debounce_duration = Duration::from_millis(500);
    let span = tracing_setup::configure_component_tracing("watcher");

    let watcher = async {
        tracing::info!("Config watcher started for {config_path}");
        while notify_rx.recv().await.is_some() {
            // Editors emit bursts of events for one save
            tokio::time::sleep(debounce_duration).await;
            while notify_rx.try_recv().is_ok() {}

            match provider.load_config().await {
                Ok(config) => match pipeline.reload(config).await {
                    Ok(compilation) => tracing::info!(
                        inbounds = compilation.config.inbounds.len(),
                        skipped = compilation.skipped.len(),
                        "Configuration reloaded and deployed"
                    ),
                    Err(e) => report_reload_failure(&e),
                },
                Err(e) => tracing::error!(
                    "Failed to reload configuration: {e:#}. Keeping old configuration."
                ),
            }
        }
        tracing::info!("Config watcher is shutting down.");
    }
    .instrument(span);

    tokio::select! {
        _ = watcher => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    }
}
