use thiserror::Error;

/// Result type for protocol validation and wire encoding
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Validation failures raised by a single protocol.
///
/// Every variant carries the display name of the protocol that produced it so
/// a compile report can attribute skipped listeners without extra context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Primary or companion port outside its allowed range
    #[error("{protocol}: {field} {port} is outside the allowed range {min}-{max}")]
    PortOutOfRange {
        protocol: &'static str,
        field: &'static str,
        port: u16,
        min: u16,
        max: u16,
    },

    /// Companion listener would collide with the public listener
    #[error("{protocol}: detour port {port} must differ from the listen port")]
    PortConflict { protocol: &'static str, port: u16 },

    /// Required credential, SNI or path is empty
    #[error("{protocol}: {field} must not be empty")]
    MissingField {
        protocol: &'static str,
        field: &'static str,
    },

    /// Reality key material or short-id is absent
    #[error("{protocol}: reality {field} must not be empty")]
    MissingRealityKey {
        protocol: &'static str,
        field: &'static str,
    },

    /// Port hopping range is not `start-end` within 1024-65535 with start < end
    #[error("{protocol}: invalid port hopping range '{range}': {reason}")]
    InvalidPortHopping {
        protocol: &'static str,
        range: String,
        reason: &'static str,
    },

    /// Bandwidth hint must be positive
    #[error("{protocol}: {field} must be greater than 0")]
    InvalidBandwidth {
        protocol: &'static str,
        field: &'static str,
    },
}

impl ProtocolError {
    /// Stable short code for logs, reports and UI mapping.
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::PortOutOfRange { .. } => "invalid_port",
            ProtocolError::PortConflict { .. } => "port_conflict",
            ProtocolError::MissingField { .. } => "missing_field",
            ProtocolError::MissingRealityKey { .. } => "missing_reality_key",
            ProtocolError::InvalidPortHopping { .. } => "invalid_port_hopping",
            ProtocolError::InvalidBandwidth { .. } => "invalid_bandwidth",
        }
    }

    /// Display name of the protocol that failed validation.
    pub fn protocol(&self) -> &'static str {
        match self {
            ProtocolError::PortOutOfRange { protocol, .. }
            | ProtocolError::PortConflict { protocol, .. }
            | ProtocolError::MissingField { protocol, .. }
            | ProtocolError::MissingRealityKey { protocol, .. }
            | ProtocolError::InvalidPortHopping { protocol, .. }
            | ProtocolError::InvalidBandwidth { protocol, .. } => protocol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = ProtocolError::MissingField {
            protocol: "TUIC v5",
            field: "password",
        };
        assert_eq!(err.code(), "missing_field");
        assert_eq!(err.protocol(), "TUIC v5");
        assert_eq!(err.to_string(), "TUIC v5: password must not be empty");

        let err = ProtocolError::PortConflict {
            protocol: "ShadowTLS v3",
            port: 8443,
        };
        assert_eq!(err.code(), "port_conflict");
    }
}
