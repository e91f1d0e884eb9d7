//! sbforge - compiles a declarative multi-protocol proxy server configuration
//! into sing-box engine documents.
//!
//! The crate follows a **hexagonal architecture**: the domain model and its loading live in
//! [`config`], the seven protocol variants in [`protocol`], compilation logic in [`core`],
//! collaborator traits in [`ports`] and their filesystem/process implementations in
//! [`adapters`].
//!
//! # Supported protocols
//! - VLESS + Reality (Vision flow, gRPC transport)
//! - Hysteria2 (optional Salamander obfuscation and port hopping)
//! - TUIC v5
//! - AnyTLS (certificate or Reality)
//! - ShadowTLS v3 chained to a loopback Shadowsocks-2022 listener
//!
//! # Quick Example
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use sbforge::{
//!     ProtocolFactory, SingboxGenerator,
//!     adapters::{FsCertificateResolver, StaticVersionProbe},
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = sbforge::config::load_config("config.json").await?;
//! let factory = ProtocolFactory::new(Arc::new(FsCertificateResolver::new()));
//! let probe = Arc::new(StaticVersionProbe::new("1.12.0"));
//! let generator = SingboxGenerator::new(factory, probe, Duration::from_secs(3));
//! let compilation = generator.compile(&config).await?;
//! println!("{}", compilation.config.to_pretty_json()?);
//! # Ok(()) }
//! ```
//!
//! # Engine dialects
//! sing-box 1.12 replaced the special `block`/`dns` outbounds with route actions and
//! changed the DNS server format. The generator detects the engine version once, caches it
//! and emits the matching [`core::Dialect`]. An unknown version compiles for the current
//! dialect.
//!
//! # Error Handling
//! Domain errors are `thiserror` enums ([`protocol::ProtocolError`],
//! [`config::ValidationError`], [`core::GenerateError`]); IO boundaries return
//! `eyre::Result<T>` with `WrapErr` context.
//!
//! # Concurrency
//! The live configuration sits in a copy-on-write [`core::AtomicConfig`]: readers take
//! `Arc` snapshots without locking, writers are serialized and only publish values that
//! validate.
pub mod config;
pub mod ports;
pub mod protocol;
pub mod tracing_setup;

pub mod adapters;
pub mod core;

// Re-export the types the binary crate wires together
pub use crate::{
    adapters::{
        CommandVersionProbe, FileConfigProvider, FileDeployer, FsCertificateResolver,
        StaticVersionProbe,
    },
    config::DomainConfig,
    core::{AtomicConfig, ConfigPipeline, ProtocolFactory, SingboxGenerator},
    protocol::{AnyProtocol, Protocol, ProtocolId},
};
