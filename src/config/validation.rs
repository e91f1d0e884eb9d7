use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    config::models::{CURRENT_SCHEMA_VERSION, CertMode, DomainConfig},
    core::{Validate, generator::doh_host},
    protocol::{ProtocolId, Transport, checks},
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "fatal", "panic"];

static DOMAIN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?)*$")
        .expect("invalid domain regex")
});

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Port conflict on {transport} {port}: {message}")]
    PortConflict {
        port: u16,
        transport: Transport,
        message: String,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Whether `domain` is usable as a routing domain suffix.
pub fn is_valid_domain(domain: &str) -> bool {
    let domain = domain.strip_prefix('.').unwrap_or(domain);
    !domain.is_empty() && domain.len() <= 253 && DOMAIN_REGEX.is_match(domain)
}

/// Structural validator for the domain configuration.
///
/// Per-protocol secrets are not checked here; see `Protocol::validate`.
pub struct DomainConfigValidator;

impl DomainConfigValidator {
    /// Validate the entire domain configuration, collecting every error.
    pub fn validate(config: &DomainConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if config.schema_version == 0 || config.schema_version > CURRENT_SCHEMA_VERSION {
            errors.push(ValidationError::InvalidField {
                field: "schema_version".to_string(),
                message: format!(
                    "Must be between 1 and {CURRENT_SCHEMA_VERSION}, got {}",
                    config.schema_version
                ),
            });
        }

        if !LOG_LEVELS.contains(&config.log.level.as_str()) {
            errors.push(ValidationError::InvalidField {
                field: "log.level".to_string(),
                message: format!(
                    "Unknown level '{}', expected one of {}",
                    config.log.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }

        if config.cert_dir.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "cert_dir".to_string(),
            });
        }

        errors.extend(Self::validate_ports(config));
        errors.extend(Self::validate_cert_modes(config));
        errors.extend(Self::validate_routing(config));

        if config.backup.enabled && config.backup.keep == 0 {
            errors.push(ValidationError::InvalidField {
                field: "backup.keep".to_string(),
                message: "Must be greater than 0 when backups are enabled".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Port ranges and per-transport uniqueness across enabled protocols.
    fn validate_ports(config: &DomainConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut taken: HashMap<(Transport, u16), String> = HashMap::new();

        let mut claim = |errors: &mut Vec<ValidationError>,
                         transport: Transport,
                         port: u16,
                         owner: String| {
            if let Some(previous) = taken.get(&(transport, port)) {
                errors.push(ValidationError::PortConflict {
                    port,
                    transport,
                    message: format!("{owner} and {previous} both listen on it"),
                });
            } else {
                taken.insert((transport, port), owner);
            }
        };

        for id in config.enabled_protocol_ids() {
            let port = config.port(id);
            if let Err(e) = checks::listen_port(id.display_name(), port) {
                errors.push(ValidationError::InvalidField {
                    field: format!("{}.port", config_section(id)),
                    message: e.to_string(),
                });
                continue;
            }
            claim(&mut errors, id.transport(), port, id.display_name().to_string());
        }

        if config.shadowtls.enabled {
            let stls = &config.shadowtls;
            let name = ProtocolId::ShadowTls.display_name();
            match checks::detour_port(name, stls.port, stls.detour_port) {
                Ok(()) => claim(
                    &mut errors,
                    Transport::Tcp,
                    stls.detour_port,
                    "ShadowTLS companion listener".to_string(),
                ),
                Err(e) => errors.push(ValidationError::InvalidField {
                    field: "shadowtls.detour_port".to_string(),
                    message: e.to_string(),
                }),
            }
        }

        if config.hysteria2.enabled {
            match checks::port_hopping(
                ProtocolId::Hysteria2.display_name(),
                &config.hysteria2.port_hopping,
            ) {
                Ok(Some(range)) => {
                    for (&(transport, port), owner) in &taken {
                        if transport == Transport::Udp
                            && range.contains(&port)
                            && port != config.hysteria2.port
                        {
                            errors.push(ValidationError::PortConflict {
                                port,
                                transport,
                                message: format!(
                                    "{owner} lies inside the Hysteria2 hopping range {}",
                                    config.hysteria2.port_hopping
                                ),
                            });
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => errors.push(ValidationError::InvalidField {
                    field: "hysteria2.port_hopping".to_string(),
                    message: e.to_string(),
                }),
            }
        }

        errors
    }

    fn validate_cert_modes(config: &DomainConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let blocks = [
            (
                config.hysteria2.enabled,
                config.hysteria2.cert_mode,
                &config.hysteria2.cert_domain,
                "hysteria2",
            ),
            (
                config.tuic.enabled,
                config.tuic.cert_mode,
                &config.tuic.cert_domain,
                "tuic",
            ),
            (
                config.anytls.enabled,
                config.anytls.cert_mode,
                &config.anytls.cert_domain,
                "anytls",
            ),
        ];

        for (enabled, mode, domain, section) in blocks {
            if !enabled || mode != CertMode::Acme {
                continue;
            }
            if domain.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: format!("{section}.cert_domain"),
                });
            } else if !is_valid_domain(domain) {
                errors.push(ValidationError::InvalidField {
                    field: format!("{section}.cert_domain"),
                    message: format!("Invalid domain format: '{domain}'"),
                });
            }
        }
        errors
    }

    fn validate_routing(config: &DomainConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let routing = &config.routing;

        let lists = [
            (routing.vpn.enabled, &routing.vpn.domains, "routing.vpn.domains"),
            (routing.ipv6.enabled, &routing.ipv6.domains, "routing.ipv6.domains"),
        ];
        for (enabled, domains, field) in lists {
            if !enabled {
                continue;
            }
            for domain in domains.iter().filter(|d| !is_valid_domain(d)) {
                errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: format!("Invalid domain format: '{domain}'"),
                });
            }
        }

        if routing.vpn.enabled {
            let vpn = &routing.vpn;
            for (value, field) in [
                (&vpn.server, "routing.vpn.server"),
                (&vpn.private_key, "routing.vpn.private_key"),
                (&vpn.peer_public_key, "routing.vpn.peer_public_key"),
            ] {
                if value.trim().is_empty() {
                    errors.push(ValidationError::MissingField {
                        field: field.to_string(),
                    });
                }
            }
            if vpn.local_address.is_empty() {
                errors.push(ValidationError::MissingField {
                    field: "routing.vpn.local_address".to_string(),
                });
            } else if vpn.local_address.iter().any(|a| a.trim().is_empty()) {
                errors.push(ValidationError::InvalidField {
                    field: "routing.vpn.local_address".to_string(),
                    message: "Addresses must not be blank".to_string(),
                });
            }
            if vpn.server_port == 0 {
                errors.push(ValidationError::InvalidField {
                    field: "routing.vpn.server_port".to_string(),
                    message: "Must be greater than 0".to_string(),
                });
            }
        }

        let remote = routing.dns.remote.trim();
        if remote.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routing.dns.remote".to_string(),
            });
        } else if doh_host(remote).is_empty() {
            errors.push(ValidationError::InvalidField {
                field: "routing.dns.remote".to_string(),
                message: format!("No resolver host in '{remote}'"),
            });
        }
        if routing.dns.local.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routing.dns.local".to_string(),
            });
        }
        errors
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

/// Name of the configuration block owning a protocol
pub fn config_section(id: ProtocolId) -> &'static str {
    match id {
        ProtocolId::RealityVision => "reality_vision",
        ProtocolId::RealityGrpc => "reality_grpc",
        ProtocolId::Hysteria2 => "hysteria2",
        ProtocolId::Tuic => "tuic",
        ProtocolId::AnyTls => "anytls",
        ProtocolId::AnyTlsReality => "anytls_reality",
        ProtocolId::ShadowTls => "shadowtls",
    }
}

impl Validate for DomainConfig {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        DomainConfigValidator::validate(self)
    }
}
