use std::{fs, path::Path, sync::Mutex};

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use tracing::info;

use crate::{
    config::models::CertMode,
    ports::cert_resolver::{CertPaths, CertResult, CertificateError, CertificateResolver},
    protocol::ProtocolId,
};

const SELF_SIGNED_STEM: &str = "self_signed";

/// Resolves certificate pairs inside a directory; self-signed pairs are
/// generated with `rcgen` the first time they are needed.
#[derive(Default)]
pub struct FsCertificateResolver {
    // Serializes self-signed generation across concurrent compilations
    generate_lock: Mutex<()>,
}

impl FsCertificateResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_self_signed(
        &self,
        cert_path: &Path,
        key_path: &Path,
        domain: &str,
    ) -> CertResult<()> {
        let _guard = self
            .generate_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if cert_path.exists() && key_path.exists() {
            return Ok(());
        }

        let (cert_pem, key_pem) = generate_self_signed(domain)?;
        if let Some(dir) = cert_path.parent() {
            fs::create_dir_all(dir).map_err(|source| CertificateError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        write_file(key_path, &key_pem)?;
        write_file(cert_path, &cert_pem)?;
        info!(cert = %cert_path.display(), domain, "Generated self-signed certificate");
        Ok(())
    }
}

fn write_file(path: &Path, contents: &str) -> CertResult<()> {
    fs::write(path, contents).map_err(|source| CertificateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// PEM-encoded certificate and private key for `domain`.
pub fn generate_self_signed(domain: &str) -> CertResult<(String, String)> {
    let domain = match domain.trim() {
        "" => "localhost",
        trimmed => trimmed,
    };
    let key_pair = KeyPair::generate()?;
    let mut params = CertificateParams::new(vec![domain.to_string()])?;
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, domain);
    params.distinguished_name = name;

    let cert = params.self_signed(&key_pair)?;
    Ok((cert.pem(), key_pair.serialize_pem()))
}

impl CertificateResolver for FsCertificateResolver {
    fn locate(
        &self,
        protocol: ProtocolId,
        cert_dir: &Path,
        mode: CertMode,
        domain: &str,
    ) -> CertResult<CertPaths> {
        let (stem, self_signed) = match mode {
            CertMode::Acme => {
                let domain = domain.trim();
                if domain.is_empty() {
                    return Err(CertificateError::MissingDomain { protocol });
                }
                (domain, false)
            }
            CertMode::SelfSigned => (SELF_SIGNED_STEM, true),
        };
        Ok(CertPaths {
            cert_path: cert_dir.join(format!("{stem}.crt")),
            key_path: cert_dir.join(format!("{stem}.key")),
            self_signed,
        })
    }

    fn resolve(
        &self,
        protocol: ProtocolId,
        cert_dir: &Path,
        mode: CertMode,
        domain: &str,
    ) -> CertResult<CertPaths> {
        let paths = self.locate(protocol, cert_dir, mode, domain)?;
        // ACME pairs are managed elsewhere
        if paths.self_signed {
            self.ensure_self_signed(&paths.cert_path, &paths.key_path, domain)?;
        }
        Ok(paths)
    }
}
