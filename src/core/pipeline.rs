use std::{sync::Arc, time::Instant};

use tracing::{Instrument, info, warn};

use crate::{
    config::{models::DomainConfig, validation::ValidationError},
    core::{
        atomic_config::{AtomicConfig, UpdateError},
        generator::{Compilation, GenerateError, SingboxGenerator},
    },
    ports::EngineDeployer,
    protocol::{ListenPort, Protocol, ProtocolError, ProtocolId},
    tracing_setup::create_deploy_span,
};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("update rejected: {0:#}")]
    Rejected(eyre::Report),

    #[error("{0}")]
    Protocol(ProtocolError),

    #[error(transparent)]
    Validation(ValidationError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("deploy failed: {0:#}")]
    Deploy(eyre::Report),
}

impl From<UpdateError<eyre::Report, ValidationError>> for PipelineError {
    fn from(err: UpdateError<eyre::Report, ValidationError>) -> Self {
        match err {
            UpdateError::Mutator(e) => PipelineError::Rejected(e),
            UpdateError::Validation(e) => PipelineError::Validation(e),
        }
    }
}

impl From<UpdateError<ProtocolError, ValidationError>> for PipelineError {
    fn from(err: UpdateError<ProtocolError, ValidationError>) -> Self {
        match err {
            UpdateError::Mutator(e) => PipelineError::Protocol(e),
            UpdateError::Validation(e) => PipelineError::Validation(e),
        }
    }
}

/// Binds the configuration container, the generator and the deployer.
///
/// Updates go through the container first; compilation and deployment run
/// only after a snapshot has been published.
pub struct ConfigPipeline {
    config: AtomicConfig<DomainConfig>,
    generator: SingboxGenerator,
    deployer: Arc<dyn EngineDeployer>,
}

impl ConfigPipeline {
    pub fn new(
        initial: DomainConfig,
        generator: SingboxGenerator,
        deployer: Arc<dyn EngineDeployer>,
    ) -> Self {
        Self {
            config: AtomicConfig::new(initial),
            generator,
            deployer,
        }
    }

    pub fn snapshot(&self) -> Arc<DomainConfig> {
        self.config.get()
    }

    /// Compile the current snapshot without deploying it.
    pub async fn compile(&self) -> Result<Compilation, GenerateError> {
        let snapshot = self.snapshot();
        self.generator.compile(&snapshot).await
    }

    /// Compile the current snapshot and hand it to the deployer.
    ///
    /// One snapshot is read for the whole call so a concurrent update
    /// cannot mix two configurations.
    pub async fn deploy(&self) -> Result<Compilation, PipelineError> {
        let snapshot = self.snapshot();
        let compilation = self.generator.compile(&snapshot).await?;
        let span = create_deploy_span(&snapshot.engine.config_path);
        let started = Instant::now();

        self.deployer
            .deploy(&compilation.config)
            .instrument(span.clone())
            .await
            .map_err(PipelineError::Deploy)?;

        span.record("duration_ms", started.elapsed().as_millis() as u64);
        for skipped in &compilation.skipped {
            warn!(
                protocol = %skipped.protocol,
                code = skipped.error.code(),
                "Deployed without protocol"
            );
        }
        Ok(compilation)
    }

    /// Update the configuration, then compile and deploy the new snapshot.
    pub async fn apply<F>(&self, mutator: F) -> Result<Compilation, PipelineError>
    where
        F: FnOnce(&mut DomainConfig) -> eyre::Result<()>,
    {
        self.config.update(mutator)?;
        self.deploy().await
    }

    /// Swap in a freshly loaded configuration (hot reload).
    pub async fn reload(&self, config: DomainConfig) -> Result<Compilation, PipelineError> {
        self.apply(|current| {
            *current = config;
            Ok(())
        })
        .await
    }

    /// Interactive toggle. Enabling validates the single protocol and fails
    /// loudly; the snapshot is unchanged on any error.
    ///
    /// Validation runs under the writer lock against certificate paths only;
    /// missing self-signed pairs are generated by the deploy that follows.
    pub async fn set_protocol_enabled(
        &self,
        id: ProtocolId,
        enabled: bool,
    ) -> Result<Compilation, PipelineError> {
        let factory = self.generator.factory();
        self.config.update(|config| {
            config.set_enabled(id, enabled);
            if enabled {
                factory.preview_one(config, id).validate()?;
            }
            Ok::<_, ProtocolError>(())
        })?;
        info!(protocol = %id, enabled, "Protocol toggled");
        self.deploy().await
    }

    /// Host ports the enabled protocols need, in protocol order.
    pub fn listen_ports(&self) -> Vec<ListenPort> {
        let snapshot = self.snapshot();
        self.generator
            .factory()
            .preview(&snapshot)
            .iter()
            .flat_map(|protocol| protocol.listen_ports())
            .collect()
    }
}
