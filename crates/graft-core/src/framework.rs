//! Target framework identifiers.
//!
//! Frameworks are parsed from short folder names (`net8.0`, `netstandard2.0`,
//! `net472`, `net8.0-windows`) into a family plus a version, with an optional
//! platform suffix.

use std::fmt;

use graft_util::errors::GraftError;

use crate::version::Version;

pub const NET_CORE_APP: &str = ".NETCoreApp";
pub const NET_STANDARD: &str = ".NETStandard";
pub const NET_FRAMEWORK: &str = ".NETFramework";
pub const ANY: &str = "Any";

/// A normalized target framework.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Framework {
    family: String,
    version: Version,
    platform: Option<String>,
}

impl Framework {
    /// The framework that every other framework is compatible with.
    pub fn any() -> Self {
        Self {
            family: ANY.to_string(),
            version: Version::new(0, 0, 0, 0),
            platform: None,
        }
    }

    /// Parse a short folder name.
    pub fn parse(input: &str) -> miette::Result<Self> {
        let invalid = || GraftError::InvalidFramework {
            input: input.to_string(),
        };
        let s = input.trim().to_ascii_lowercase();
        if s == "any" {
            return Ok(Self::any());
        }

        let (moniker, platform) = match s.split_once('-') {
            Some((moniker, platform)) if !platform.is_empty() => {
                (moniker.to_string(), Some(platform.to_string()))
            }
            Some(_) => return Err(invalid().into()),
            None => (s.clone(), None),
        };

        let split = moniker
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (prefix, digits) = moniker.split_at(split);
        if prefix.is_empty() {
            return Err(invalid().into());
        }

        let (family, version) = match prefix {
            "netstandard" => (NET_STANDARD.to_string(), parse_dotted(digits)?),
            "netcoreapp" => (NET_CORE_APP.to_string(), parse_dotted(digits)?),
            "net" if digits.contains('.') => {
                let version = parse_dotted(digits)?;
                if version.major() < 5 {
                    return Err(invalid().into());
                }
                (NET_CORE_APP.to_string(), version)
            }
            "net" => (NET_FRAMEWORK.to_string(), parse_compact(digits).ok_or_else(invalid)?),
            other => (other.to_string(), parse_dotted(digits)?),
        };

        Ok(Self {
            family,
            version,
            platform,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn is_any(&self) -> bool {
        self.family == ANY
    }

    /// Whether assets built for `candidate` can be consumed by a project
    /// targeting `self`.
    pub fn is_compatible_with(&self, candidate: &Framework) -> bool {
        if candidate.is_any() {
            return true;
        }
        if candidate.platform.is_some() && candidate.platform != self.platform {
            return false;
        }
        if self.family == candidate.family {
            return candidate.version <= self.version;
        }
        if candidate.family == NET_STANDARD {
            let max_standard = match self.family.as_str() {
                NET_CORE_APP if self.version >= Version::new(3, 0, 0, 0) => {
                    Some(Version::new(2, 1, 0, 0))
                }
                NET_CORE_APP if self.version >= Version::new(2, 0, 0, 0) => {
                    Some(Version::new(2, 0, 0, 0))
                }
                NET_FRAMEWORK if self.version >= Version::new(4, 6, 1, 0) => {
                    Some(Version::new(2, 0, 0, 0))
                }
                _ => None,
            };
            return max_standard.is_some_and(|max| candidate.version <= max);
        }
        false
    }
}

/// `8.0` style versions.
fn parse_dotted(digits: &str) -> miette::Result<Version> {
    Version::parse(digits)
}

/// `472` style versions: one digit per part.
fn parse_compact(digits: &str) -> Option<Version> {
    if digits.is_empty() || digits.len() > 4 {
        return None;
    }
    let mut parts = [0u64; 4];
    for (i, c) in digits.chars().enumerate() {
        parts[i] = c.to_digit(10)? as u64;
    }
    Some(Version::new(parts[0], parts[1], parts[2], parts[3]))
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = &self.version;
        match self.family.as_str() {
            ANY => return f.write_str("any"),
            NET_CORE_APP if v.major() >= 5 => write!(f, "net{}.{}", v.major(), v.minor())?,
            NET_CORE_APP => write!(f, "netcoreapp{}.{}", v.major(), v.minor())?,
            NET_STANDARD => write!(f, "netstandard{}.{}", v.major(), v.minor())?,
            NET_FRAMEWORK => {
                let [a, b, c, d] = v.release();
                let mut digits = format!("{a}{b}");
                if c != 0 || d != 0 {
                    digits.push_str(&c.to_string());
                }
                if d != 0 {
                    digits.push_str(&d.to_string());
                }
                write!(f, "net{digits}")?
            }
            other => write!(f, "{other}{}.{}", v.major(), v.minor())?,
        }
        if let Some(ref platform) = self.platform {
            write!(f, "-{platform}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Framework {
    type Err = miette::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fw(s: &str) -> Framework {
        Framework::parse(s).unwrap()
    }

    #[test]
    fn parses_modern_net() {
        let f = fw("net8.0");
        assert_eq!(f.family(), NET_CORE_APP);
        assert_eq!(f.version(), &Version::new(8, 0, 0, 0));
        assert_eq!(f.to_string(), "net8.0");
    }

    #[test]
    fn parses_legacy_monikers() {
        assert_eq!(fw("netcoreapp3.1").family(), NET_CORE_APP);
        assert_eq!(fw("netcoreapp3.1").to_string(), "netcoreapp3.1");
        assert_eq!(fw("netstandard2.0").family(), NET_STANDARD);
        let classic = fw("net472");
        assert_eq!(classic.family(), NET_FRAMEWORK);
        assert_eq!(classic.version(), &Version::new(4, 7, 2, 0));
        assert_eq!(classic.to_string(), "net472");
        assert_eq!(fw("net48").to_string(), "net48");
    }

    #[test]
    fn case_insensitive_equality() {
        assert_eq!(fw("NET8.0"), fw("net8.0"));
        assert_eq!(fw("NetStandard2.0"), fw("netstandard2.0"));
        assert_ne!(fw("net8.0"), fw("net7.0"));
    }

    #[test]
    fn platform_suffix() {
        let f = fw("net8.0-windows");
        assert_eq!(f.platform(), Some("windows"));
        assert_ne!(f, fw("net8.0"));
        assert_eq!(f.to_string(), "net8.0-windows");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Framework::parse("").is_err());
        assert!(Framework::parse("8.0").is_err());
        assert!(Framework::parse("net").is_err());
        assert!(Framework::parse("net4.5").is_err());
        assert!(Framework::parse("net8.0-").is_err());
    }

    #[test]
    fn compatibility() {
        let net8 = fw("net8.0");
        assert!(net8.is_compatible_with(&fw("net6.0")));
        assert!(!net8.is_compatible_with(&fw("net9.0")));
        assert!(net8.is_compatible_with(&fw("netstandard2.1")));
        assert!(net8.is_compatible_with(&Framework::any()));
        assert!(!net8.is_compatible_with(&fw("net472")));
        assert!(fw("net472").is_compatible_with(&fw("netstandard2.0")));
        assert!(!fw("net472").is_compatible_with(&fw("netstandard2.1")));
        assert!(!fw("net45").is_compatible_with(&fw("netstandard2.0")));
        assert!(!net8.is_compatible_with(&fw("net8.0-windows")));
        assert!(fw("net8.0-windows").is_compatible_with(&net8));
    }
}
