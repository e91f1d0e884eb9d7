//! Field checks shared by every protocol variant.

use std::ops::RangeInclusive;

use super::error::{ProtocolError, ProtocolResult};

/// Lowest port a public listener may bind.
pub const MIN_LISTEN_PORT: u16 = 1024;
/// Highest valid port number.
pub const MAX_PORT: u16 = 65535;

/// Public listener ports must stay out of the privileged range.
pub fn listen_port(protocol: &'static str, port: u16) -> ProtocolResult<()> {
    if port < MIN_LISTEN_PORT {
        return Err(ProtocolError::PortOutOfRange {
            protocol,
            field: "port",
            port,
            min: MIN_LISTEN_PORT,
            max: MAX_PORT,
        });
    }
    Ok(())
}

/// Companion (detour) ports may use 1-65535 but never the public port.
pub fn detour_port(protocol: &'static str, port: u16, detour: u16) -> ProtocolResult<()> {
    if detour == 0 {
        return Err(ProtocolError::PortOutOfRange {
            protocol,
            field: "detour port",
            port: detour,
            min: 1,
            max: MAX_PORT,
        });
    }
    if detour == port {
        return Err(ProtocolError::PortConflict {
            protocol,
            port: detour,
        });
    }
    Ok(())
}

pub fn non_empty(protocol: &'static str, field: &'static str, value: &str) -> ProtocolResult<()> {
    if value.trim().is_empty() {
        return Err(ProtocolError::MissingField { protocol, field });
    }
    Ok(())
}

pub fn reality_key(protocol: &'static str, field: &'static str, value: &str) -> ProtocolResult<()> {
    if value.trim().is_empty() {
        return Err(ProtocolError::MissingRealityKey { protocol, field });
    }
    Ok(())
}

/// Parse a `start-end` port hopping range.
///
/// An empty string means hopping is off and yields `Ok(None)`.
pub fn port_hopping(
    protocol: &'static str,
    range: &str,
) -> ProtocolResult<Option<RangeInclusive<u16>>> {
    if range.is_empty() {
        return Ok(None);
    }

    let invalid = |reason: &'static str| ProtocolError::InvalidPortHopping {
        protocol,
        range: range.to_string(),
        reason,
    };

    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| invalid("expected 'start-end'"))?;
    let start = port_number(start).ok_or_else(|| invalid("start is not a number"))?;
    let end = port_number(end).ok_or_else(|| invalid("end is not a number"))?;

    let bounds = u32::from(MIN_LISTEN_PORT)..=u32::from(MAX_PORT);
    if !bounds.contains(&start) || !bounds.contains(&end) {
        return Err(invalid("ports must be within 1024-65535"));
    }
    if start >= end {
        return Err(invalid("start must be lower than end"));
    }

    // Both bounds were checked against u16 limits above.
    Ok(Some(start as u16..=end as u16))
}

/// Plain decimal digits only; `parse` alone would accept a sign.
fn port_number(raw: &str) -> Option<u32> {
    if raw.is_empty() || raw.len() > 5 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Boolean form of [`port_hopping`] used by UI and config validation.
pub fn is_valid_port_hopping(range: &str) -> bool {
    port_hopping("port hopping", range).is_ok()
}
