//! Version ranges, floating selectors, and best-match selection.
//!
//! Supported range syntax:
//! - `1.0` means `>= 1.0` (inclusive minimum)
//! - `[1.0]` exact, `[1.0,2.0)`, `(1.0,)`, `(,2.0]` intervals
//! - floating: `*`, `1.*`, `1.2.*`, `1.2.3.*`, `1.0.0-*`, `1.0.0-beta*`,
//!   `1.*-*`, `1.2.*-*`, `1.2.3.*-*` and `*-*`

use std::fmt;

use graft_util::errors::GraftError;

use crate::version::Version;

/// Which part of a version floats to the highest available value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatBehavior {
    /// `1.0.0-beta*`: highest prerelease with the given label prefix.
    Prerelease,
    /// `1.2.3.*`
    Revision,
    /// `1.2.*`
    Patch,
    /// `1.*`
    Minor,
    /// `*`
    Major,
    /// `1.2.3.*-*`: like `Revision` but prereleases are candidates too.
    PrereleaseRevision,
    /// `1.2.*-*`
    PrereleasePatch,
    /// `1.*-*`
    PrereleaseMinor,
    /// `*-*`: the highest version of all, prereleases included.
    AbsoluteLatest,
}

impl FloatBehavior {
    pub fn includes_prerelease(self) -> bool {
        matches!(
            self,
            Self::Prerelease
                | Self::PrereleaseRevision
                | Self::PrereleasePatch
                | Self::PrereleaseMinor
                | Self::AbsoluteLatest
        )
    }

    /// Number of leading numeric parts pinned by the pattern, `None` when the
    /// pattern pins the whole release (`Prerelease`).
    fn fixed_parts(self) -> Option<usize> {
        match self {
            Self::Major | Self::AbsoluteLatest => Some(0),
            Self::Minor | Self::PrereleaseMinor => Some(1),
            Self::Patch | Self::PrereleasePatch => Some(2),
            Self::Revision | Self::PrereleaseRevision => Some(3),
            Self::Prerelease => None,
        }
    }
}

/// A floating selector: the pattern prefix plus its behavior.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FloatRange {
    behavior: FloatBehavior,
    min_version: Version,
    label_prefix: String,
}

impl FloatRange {
    pub fn behavior(&self) -> FloatBehavior {
        self.behavior
    }

    /// The lowest version the pattern can match.
    pub fn min_version(&self) -> &Version {
        &self.min_version
    }

    /// Whether `version` shares the prefix pinned by this pattern.
    pub fn satisfies(&self, version: &Version) -> bool {
        if version.is_prerelease() && !self.behavior.includes_prerelease() {
            return false;
        }
        match self.behavior.fixed_parts() {
            Some(n) => version.release()[..n] == self.min_version.release()[..n],
            None => {
                version.release() == self.min_version.release()
                    && version.prerelease().starts_with(&self.label_prefix)
            }
        }
    }

    fn parse(input: &str) -> miette::Result<Self> {
        let s = input.trim();
        let invalid = |reason: &str| GraftError::InvalidRange {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let lowest_prerelease = |v: Version| v.with_prerelease("0");

        if s == "*" {
            return Ok(Self {
                behavior: FloatBehavior::Major,
                min_version: Version::new(0, 0, 0, 0),
                label_prefix: String::new(),
            });
        }
        if s == "*-*" {
            return Ok(Self {
                behavior: FloatBehavior::AbsoluteLatest,
                min_version: lowest_prerelease(Version::new(0, 0, 0, 0))?,
                label_prefix: String::new(),
            });
        }

        if let Some(release) = s.strip_suffix("-*") {
            if let Some(fixed) = release.strip_suffix(".*") {
                let (behavior, min) = float_release(fixed, true).ok_or_else(|| {
                    invalid("floating release must pin one to three numeric parts")
                })?;
                return Ok(Self {
                    behavior,
                    min_version: lowest_prerelease(min)?,
                    label_prefix: String::new(),
                });
            }
        }

        if let Some((release, label)) = s.split_once('-') {
            let prefix = label
                .strip_suffix('*')
                .filter(|p| !p.contains('*'))
                .ok_or_else(|| invalid("prerelease float must end in a single '*'"))?;
            if release.contains('*') {
                return Err(invalid("release part of a prerelease float must be fixed").into());
            }
            let base = Version::parse(release)?;
            let prefix = prefix.to_ascii_lowercase();
            let trimmed = prefix.trim_end_matches(['.', '-']);
            let min_version = if trimmed.is_empty() {
                lowest_prerelease(base)?
            } else {
                base.with_prerelease(trimmed)?
            };
            return Ok(Self {
                behavior: FloatBehavior::Prerelease,
                min_version,
                label_prefix: prefix,
            });
        }

        let fixed = s
            .strip_suffix(".*")
            .ok_or_else(|| invalid("'*' may only replace the last numeric part"))?;
        let (behavior, min_version) = float_release(fixed, false)
            .ok_or_else(|| invalid("floating release must pin one to three numeric parts"))?;
        Ok(Self {
            behavior,
            min_version,
            label_prefix: String::new(),
        })
    }
}

/// Parse the pinned numeric prefix of `1.*`, `1.2.*` or `1.2.3.*`.
fn float_release(fixed: &str, prerelease: bool) -> Option<(FloatBehavior, Version)> {
    let mut parts = [0u64; 4];
    let mut count = 0;
    for token in fixed.split('.') {
        if count == 3 {
            return None;
        }
        parts[count] = token.parse().ok()?;
        count += 1;
    }
    let behavior = match (count, prerelease) {
        (1, false) => FloatBehavior::Minor,
        (2, false) => FloatBehavior::Patch,
        (3, false) => FloatBehavior::Revision,
        (1, true) => FloatBehavior::PrereleaseMinor,
        (2, true) => FloatBehavior::PrereleasePatch,
        (3, true) => FloatBehavior::PrereleaseRevision,
        _ => return None,
    };
    Some((behavior, Version::new(parts[0], parts[1], parts[2], parts[3])))
}

impl fmt::Display for FloatRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, patch, _] = self.min_version.release();
        match self.behavior {
            FloatBehavior::Major => write!(f, "*"),
            FloatBehavior::AbsoluteLatest => write!(f, "*-*"),
            FloatBehavior::Minor => write!(f, "{major}.*"),
            FloatBehavior::Patch => write!(f, "{major}.{minor}.*"),
            FloatBehavior::Revision => write!(f, "{major}.{minor}.{patch}.*"),
            FloatBehavior::PrereleaseMinor => write!(f, "{major}.*-*"),
            FloatBehavior::PrereleasePatch => write!(f, "{major}.{minor}.*-*"),
            FloatBehavior::PrereleaseRevision => write!(f, "{major}.{minor}.{patch}.*-*"),
            FloatBehavior::Prerelease => {
                write!(f, "{}-{}*", self.min_version.to_release(), self.label_prefix)
            }
        }
    }
}

/// An allowed set of versions.
///
/// Equality is structural over all fields, so `[1.0, )` and `1.*` are
/// different ranges even though both admit `1.5.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    min: Option<Version>,
    include_min: bool,
    max: Option<Version>,
    include_max: bool,
    float: Option<FloatRange>,
}

impl VersionRange {
    /// Build a bounded range, rejecting empty intervals.
    pub fn new(
        min: Option<Version>,
        include_min: bool,
        max: Option<Version>,
        include_max: bool,
    ) -> miette::Result<Self> {
        let range = Self {
            include_min: min.is_some() && include_min,
            include_max: max.is_some() && include_max,
            min,
            max,
            float: None,
        };
        if let (Some(min), Some(max)) = (&range.min, &range.max) {
            let empty = min > max || (min == max && !(range.include_min && range.include_max));
            if empty {
                return Err(GraftError::InvalidRange {
                    input: range.to_string(),
                    reason: "range admits no versions".to_string(),
                }
                .into());
            }
        }
        Ok(range)
    }

    /// Any version; the lowest available is selected.
    pub fn all() -> Self {
        Self {
            min: None,
            include_min: false,
            max: None,
            include_max: false,
            float: None,
        }
    }

    /// `>= version`
    pub fn at_least(version: Version) -> Self {
        Self {
            min: Some(version),
            include_min: true,
            max: None,
            include_max: false,
            float: None,
        }
    }

    /// `[version]`
    pub fn exact(version: Version) -> Self {
        Self {
            min: Some(version.clone()),
            include_min: true,
            max: Some(version),
            include_max: true,
            float: None,
        }
    }

    /// Parse a range expression.
    pub fn parse(input: &str) -> miette::Result<Self> {
        let s = input.trim();
        let invalid = |reason: &str| GraftError::InvalidRange {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        if s.is_empty() {
            return Err(invalid("empty range").into());
        }

        if !s.starts_with('[') && !s.starts_with('(') {
            if s.contains('*') {
                let float = FloatRange::parse(s)?;
                return Ok(Self {
                    min: Some(float.min_version.clone()),
                    include_min: true,
                    max: None,
                    include_max: false,
                    float: Some(float),
                });
            }
            return Ok(Self::at_least(Version::parse(s)?));
        }

        if s.len() < 2 || !(s.ends_with(']') || s.ends_with(')')) {
            return Err(invalid("missing closing ']' or ')'").into());
        }
        if s.contains('*') {
            return Err(invalid("floating versions are not allowed inside brackets").into());
        }
        let include_min = s.starts_with('[');
        let include_max = s.ends_with(']');
        let inner = &s[1..s.len() - 1];

        let bound = |text: &str| -> miette::Result<Option<Version>> {
            let text = text.trim();
            if text.is_empty() {
                Ok(None)
            } else {
                Version::parse(text).map(Some)
            }
        };

        match inner.split_once(',') {
            Some((lower, upper)) => {
                if upper.contains(',') {
                    return Err(invalid("too many ',' separators").into());
                }
                Self::new(bound(lower)?, include_min, bound(upper)?, include_max)
            }
            None => {
                if !(include_min && include_max) {
                    return Err(invalid("exact versions must use '[' and ']'").into());
                }
                let version = bound(inner)?.ok_or_else(|| invalid("empty exact version"))?;
                Ok(Self::exact(version))
            }
        }
    }

    pub fn min(&self) -> Option<&Version> {
        self.min.as_ref()
    }

    pub fn max(&self) -> Option<&Version> {
        self.max.as_ref()
    }

    pub fn is_min_inclusive(&self) -> bool {
        self.include_min
    }

    pub fn is_max_inclusive(&self) -> bool {
        self.include_max
    }

    pub fn float(&self) -> Option<&FloatRange> {
        self.float.as_ref()
    }

    pub fn is_floating(&self) -> bool {
        self.float.is_some()
    }

    /// Prereleases are admitted only when a bound or the float asks for them.
    pub fn allows_prerelease(&self) -> bool {
        self.min.as_ref().is_some_and(Version::is_prerelease)
            || self.max.as_ref().is_some_and(Version::is_prerelease)
            || self
                .float
                .as_ref()
                .is_some_and(|f| f.behavior.includes_prerelease())
    }

    /// Check the bounds (not the float pattern) against a version.
    pub fn satisfies(&self, version: &Version) -> bool {
        if version.is_prerelease() && !self.allows_prerelease() {
            return false;
        }
        if let Some(ref min) = self.min {
            if self.include_min {
                if version < min {
                    return false;
                }
            } else if version <= min {
                return false;
            }
        }
        if let Some(ref max) = self.max {
            if self.include_max {
                if version > max {
                    return false;
                }
            } else if version >= max {
                return false;
            }
        }
        true
    }

    /// Pick the best available version for this range.
    ///
    /// Fixed ranges take the lowest satisfying version. Floating ranges take
    /// the highest version matching the float pattern, falling back to the
    /// lowest satisfying version when nothing matches the pattern.
    pub fn select_best<'a, I>(&self, available: I) -> Option<Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        let candidates = available.into_iter().filter(|v| self.satisfies(v));
        match self.float {
            None => candidates.min().cloned(),
            Some(ref float) => {
                let mut lowest: Option<&Version> = None;
                let mut floated: Option<&Version> = None;
                for v in candidates {
                    if lowest.map_or(true, |l| v < l) {
                        lowest = Some(v);
                    }
                    if float.satisfies(v) && floated.map_or(true, |f| v > f) {
                        floated = Some(v);
                    }
                }
                floated.or(lowest).cloned()
            }
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref float) = self.float {
            return write!(f, "{float}");
        }
        if let (Some(min), Some(max)) = (&self.min, &self.max) {
            if min == max && self.include_min && self.include_max {
                return write!(f, "[{min}]");
            }
        }
        f.write_str(if self.include_min { "[" } else { "(" })?;
        if let Some(ref min) = self.min {
            write!(f, "{min}")?;
        }
        f.write_str(", ")?;
        if let Some(ref max) = self.max {
            write!(f, "{max}")?;
        }
        f.write_str(if self.include_max { "]" } else { ")" })
    }
}

impl std::str::FromStr for VersionRange {
    type Err = miette::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
