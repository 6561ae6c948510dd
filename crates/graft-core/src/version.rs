//! Package version parsing and ordering.
//!
//! Versions have up to four numeric parts followed by an optional prerelease
//! label and optional build metadata: `major.minor[.patch[.revision]][-pre][+meta]`.
//!
//! - Missing numeric parts are zero, so `1.0` equals `1.0.0.0`
//! - A release sorts above every prerelease of the same numbers
//! - Prerelease labels follow SemVer precedence and compare case-insensitively
//! - Build metadata never takes part in ordering, equality or hashing

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use graft_util::errors::GraftError;
use semver::Prerelease;

/// A parsed package version.
#[derive(Debug, Clone)]
pub struct Version {
    release: [u64; 4],
    pre: Prerelease,
    metadata: Option<String>,
}

impl Version {
    /// Build a release version from its numeric parts.
    pub fn new(major: u64, minor: u64, patch: u64, revision: u64) -> Self {
        Self {
            release: [major, minor, patch, revision],
            pre: Prerelease::EMPTY,
            metadata: None,
        }
    }

    pub fn parse(input: &str) -> miette::Result<Self> {
        let s = input.trim();
        let invalid = |reason: String| GraftError::InvalidVersion {
            input: input.to_string(),
            reason,
        };
        if s.is_empty() {
            return Err(invalid("empty version".to_string()).into());
        }

        let (rest, metadata) = match s.split_once('+') {
            Some((rest, meta)) => (rest, Some(meta.to_string())),
            None => (s, None),
        };
        let (numbers, label) = match rest.split_once('-') {
            Some((numbers, label)) => (numbers, Some(label)),
            None => (rest, None),
        };

        let mut release = [0u64; 4];
        let mut parts = 0;
        for token in numbers.split('.') {
            if parts == 4 {
                return Err(invalid("more than four numeric parts".to_string()).into());
            }
            release[parts] = token
                .parse::<u64>()
                .map_err(|_| invalid(format!("non-numeric part '{token}'")))?;
            parts += 1;
        }

        let pre = match label {
            Some(label) => Prerelease::new(&label.to_ascii_lowercase())
                .map_err(|e| invalid(format!("bad prerelease label: {e}")))?,
            None => Prerelease::EMPTY,
        };
        if label.is_some() && pre.is_empty() {
            return Err(invalid("empty prerelease label".to_string()).into());
        }

        Ok(Self {
            release,
            pre,
            metadata,
        })
    }

    /// Same numbers with the given prerelease label (lowercased).
    pub fn with_prerelease(&self, label: &str) -> miette::Result<Self> {
        let pre = Prerelease::new(&label.to_ascii_lowercase()).map_err(|e| {
            GraftError::InvalidVersion {
                input: format!("{}-{label}", self.release_string()),
                reason: format!("bad prerelease label: {e}"),
            }
        })?;
        Ok(Self {
            pre,
            metadata: None,
            ..self.clone()
        })
    }

    pub fn major(&self) -> u64 {
        self.release[0]
    }

    pub fn minor(&self) -> u64 {
        self.release[1]
    }

    pub fn patch(&self) -> u64 {
        self.release[2]
    }

    pub fn revision(&self) -> u64 {
        self.release[3]
    }

    /// All four numeric parts, zero-filled.
    pub fn release(&self) -> [u64; 4] {
        self.release
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// The lowercased prerelease label, empty for releases.
    pub fn prerelease(&self) -> &str {
        self.pre.as_str()
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    /// The same numbers without prerelease label or metadata.
    pub fn to_release(&self) -> Self {
        Self {
            pre: Prerelease::EMPTY,
            metadata: None,
            ..self.clone()
        }
    }

    /// Numeric part in normalized form: at least three parts, the fourth
    /// only when it is non-zero.
    fn release_string(&self) -> String {
        let [major, minor, patch, revision] = self.release;
        if revision != 0 {
            format!("{major}.{minor}.{patch}.{revision}")
        } else {
            format!("{major}.{minor}.{patch}")
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.release_string())?;
        if self.is_prerelease() {
            write!(f, "-{}", self.pre)?;
        }
        Ok(())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.release.hash(state);
        self.pre.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.release
            .cmp(&other.release)
            .then_with(|| self.pre.cmp(&other.pre))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::str::FromStr for Version {
    type Err = miette::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn basic_ordering() {
        assert!(v("1.0") < v("2.0"));
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("1.0.1") < v("1.1.0"));
        assert!(v("1.1.0") < v("1.1.0.1"));
    }

    #[test]
    fn trailing_zeros_equal() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1.0.0"), v("1.0.0.0"));
        assert_eq!(v("1"), v("1.0.0"));
    }

    #[test]
    fn prerelease_before_release() {
        assert!(v("1.0.0-beta") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
        assert!(v("1.0.0-beta.2") < v("1.0.0-beta.11"));
        assert!(v("1.0.0-rc.1") > v("1.0.0-beta.9"));
    }

    #[test]
    fn prerelease_case_insensitive() {
        assert_eq!(v("1.0.0-Beta"), v("1.0.0-beta"));
        assert_eq!(v("1.0.0-BETA").prerelease(), "beta");
    }

    #[test]
    fn metadata_ignored() {
        assert_eq!(v("1.0.0+abc"), v("1.0.0+def"));
        assert_eq!(v("1.0.0+abc").metadata(), Some("abc"));
    }

    #[test]
    fn display_normalized() {
        assert_eq!(v("1.0").to_string(), "1.0.0");
        assert_eq!(v("1.2.3.4").to_string(), "1.2.3.4");
        assert_eq!(v("1.2.3.0").to_string(), "1.2.3");
        assert_eq!(v("2.0-RC.1+build").to_string(), "2.0.0-rc.1");
    }

    #[test]
    fn accessors() {
        let ver = v("4.7.2.1");
        assert_eq!(ver.major(), 4);
        assert_eq!(ver.minor(), 7);
        assert_eq!(ver.patch(), 2);
        assert_eq!(ver.revision(), 1);
        assert!(!ver.is_prerelease());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1.x").is_err());
        assert!(Version::parse("1.2.3.4.5").is_err());
        assert!(Version::parse("1.0-").is_err());
        assert!(Version::parse(".1").is_err());
    }

    #[test]
    fn with_prerelease_keeps_numbers() {
        let ver = v("1.2.3").with_prerelease("Beta").unwrap();
        assert_eq!(ver.to_string(), "1.2.3-beta");
        assert_eq!(ver.to_release(), v("1.2.3"));
    }
}
