//! Lenient version parsing for tool and daemon version strings.

use crate::RuntimeError;
pub use semver::Version;

/// Parse the leading dotted-numeric part of `raw`. A leading `v` is ignored,
/// missing minor/patch components are zero, and any suffix after the numeric
/// part (`-desktop.1`, `+build`, `-ce`) is dropped.
pub fn parse_version(raw: &str) -> Result<Version, RuntimeError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let numeric: &str = trimmed
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .next()
        .unwrap_or_default()
        .trim_end_matches('.');
    if numeric.is_empty() {
        return Err(RuntimeError::Version(raw.trim().to_owned()));
    }

    let mut parts = [0u64; 3];
    for (slot, piece) in parts.iter_mut().zip(numeric.split('.')) {
        *slot = piece
            .parse()
            .map_err(|_| RuntimeError::Version(raw.trim().to_owned()))?;
    }
    Ok(Version::new(parts[0], parts[1], parts[2]))
}

/// `true` when `installed` is at least `minimum`.
pub fn meets_minimum(installed: &Version, minimum: &str) -> Result<bool, RuntimeError> {
    Ok(*installed >= parse_version(minimum)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_prefixed() {
        assert_eq!(parse_version("1.25.0").unwrap(), Version::new(1, 25, 0));
        assert_eq!(parse_version("v2.24.6\n").unwrap(), Version::new(2, 24, 6));
    }

    #[test]
    fn pads_and_truncates() {
        assert_eq!(parse_version("20.10").unwrap(), Version::new(20, 10, 0));
        assert_eq!(parse_version("24").unwrap(), Version::new(24, 0, 0));
        assert_eq!(parse_version("1.2.3.4").unwrap(), Version::new(1, 2, 3));
    }

    #[test]
    fn drops_suffixes() {
        assert_eq!(
            parse_version("2.23.3-desktop.2").unwrap(),
            Version::new(2, 23, 3)
        );
        assert_eq!(parse_version("19.03.8-ce").unwrap(), Version::new(19, 3, 8));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_version("").is_err());
        assert!(parse_version("docker").is_err());
    }

    #[test]
    fn minimum_comparison() {
        let v = parse_version("1.24.0").unwrap();
        assert!(!meets_minimum(&v, "1.25.0").unwrap());
        assert!(meets_minimum(&v, "1.24").unwrap());
    }
}
