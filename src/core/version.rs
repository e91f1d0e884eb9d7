use std::fmt;

use semver::Version;

/// Engine schema dialect selected by the engine's own version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// 1.x below 1.12: `block`/`dns` outbounds, DNS `strategy`, inbound sniffing
    Legacy,
    /// Route actions, typed DNS servers, default domain resolver
    #[default]
    Current,
}

impl Dialect {
    /// Legacy iff the version parses with major 1 and minor below 12.
    /// Missing or unparsable versions select [`Dialect::Current`].
    pub fn from_version(version: Option<&str>) -> Self {
        match version.and_then(parse_version) {
            Some(v) if v.major == 1 && v.minor < 12 => Dialect::Legacy,
            _ => Dialect::Current,
        }
    }

    pub fn is_legacy(self) -> bool {
        self == Dialect::Legacy
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Legacy => write!(f, "legacy"),
            Dialect::Current => write!(f, "current"),
        }
    }
}

/// Lenient semver parse: accepts a leading `v` and missing minor/patch parts.
pub fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    let raw = raw.strip_prefix('v').unwrap_or(raw);
    if raw.is_empty() {
        return None;
    }
    if let Ok(v) = Version::parse(raw) {
        return Some(v);
    }

    // "1.11" or "1" style, possibly with a pre-release suffix
    let (core, suffix) = match raw.find(['-', '+']) {
        Some(idx) => raw.split_at(idx),
        None => (raw, ""),
    };
    let padded = match core.split('.').count() {
        1 => format!("{core}.0.0{suffix}"),
        2 => format!("{core}.0{suffix}"),
        _ => return None,
    };
    Version::parse(&padded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_boundary() {
        assert_eq!(Dialect::from_version(Some("1.11.0")), Dialect::Legacy);
        assert_eq!(Dialect::from_version(Some("1.11.15")), Dialect::Legacy);
        assert_eq!(Dialect::from_version(Some("1.8.0")), Dialect::Legacy);
        assert_eq!(Dialect::from_version(Some("1.12.0")), Dialect::Current);
        assert_eq!(Dialect::from_version(Some("1.13.2")), Dialect::Current);
        assert_eq!(Dialect::from_version(Some("2.0.0")), Dialect::Current);
    }

    #[test]
    fn unknown_versions_are_current() {
        assert_eq!(Dialect::from_version(None), Dialect::Current);
        assert_eq!(Dialect::from_version(Some("")), Dialect::Current);
        assert_eq!(Dialect::from_version(Some("unknown")), Dialect::Current);
    }

    #[test]
    fn lenient_parsing() {
        assert_eq!(parse_version("v1.11.4"), Some(Version::new(1, 11, 4)));
        assert_eq!(parse_version("1.11"), Some(Version::new(1, 11, 0)));
        assert_eq!(parse_version(" 1 "), Some(Version::new(1, 0, 0)));
        let beta = parse_version("1.12.0-beta.3").unwrap();
        assert_eq!((beta.major, beta.minor), (1, 12));
        assert_eq!(Dialect::from_version(Some("1.11-rc.1")), Dialect::Legacy);
        assert!(parse_version("1.2.3.4").is_none());
    }
}
