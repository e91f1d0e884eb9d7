use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{config::models::CertMode, protocol::ProtocolId};

/// Error type for certificate resolution
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CertificateError {
    /// ACME mode without a domain to name the certificate after
    #[error("{protocol}: ACME certificate mode requires a domain")]
    MissingDomain { protocol: ProtocolId },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to generate self-signed certificate: {0}")]
    Generate(#[from] rcgen::Error),
}

/// Result type for certificate operations
pub type CertResult<T> = Result<T, CertificateError>;

/// Certificate and key file locations handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Clients cannot verify the chain
    pub self_signed: bool,
}

/// CertificateResolver defines the port for locating (and lazily creating)
/// certificate pairs. Acquisition and renewal live outside this crate.
pub trait CertificateResolver: Send + Sync + 'static {
    /// Where the certificate pair a protocol should use lives. Touches nothing on disk.
    ///
    /// # Arguments
    /// * `protocol` - The protocol asking, for error context
    /// * `cert_dir` - Directory holding certificate pairs
    /// * `mode` - ACME or self-signed
    /// * `domain` - Certificate domain (required for ACME)
    fn locate(
        &self,
        protocol: ProtocolId,
        cert_dir: &Path,
        mode: CertMode,
        domain: &str,
    ) -> CertResult<CertPaths>;

    /// Like [`locate`](Self::locate), but also creates a missing self-signed pair.
    fn resolve(
        &self,
        protocol: ProtocolId,
        cert_dir: &Path,
        mode: CertMode,
        domain: &str,
    ) -> CertResult<CertPaths> {
        self.locate(protocol, cert_dir, mode, domain)
    }
}
