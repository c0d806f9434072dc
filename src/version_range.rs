//! Version range parsing and overlap checks.
//!
//! Coordinates may carry either a concrete version or a range expression. Two
//! coordinates for the same package are considered equivalent when their version
//! expressions overlap, so this module turns each expression into a union of
//! intervals over [`semver::Version`] and intersects them.
//!
//! Supported syntaxes:
//!
//! | Expression | Meaning |
//! |------------|---------|
//! | `1.2.3`, `v1.2`, `1.0-SNAPSHOT` | exactly that version (missing components are zero) |
//! | `*`, `1.x`, `1.2.*` | wildcard |
//! | `>=1.0 <2.0`, `>=1.0, <2.0` | comparator set (all must hold) |
//! | `^1.2.3`, `~1.2` | caret / tilde ranges |
//! | `1.0 - 2.0` | inclusive hyphen range |
//! | `^1 \|\| ^3` | disjunction |
//! | `[1.0,2.0)`, `(,1.0]`, `[1.2]`, `[1,2),[3,)` | Maven interval notation |
//!
//! # Example
//!
//! ```
//! use ossaudit::version_range::VersionRange;
//!
//! let range = VersionRange::parse("[1.0,2.0)").unwrap();
//! let exact = VersionRange::parse("1.2.3").unwrap();
//! assert!(range.intersects(&exact));
//! ```

use semver::{BuildMetadata, Prerelease, Version};
use thiserror::Error;
use tracing::warn;

/// A version expression that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version range '{expr}': {reason}")]
pub struct RangeParseError {
    pub expr: String,
    pub reason: String,
}

impl RangeParseError {
    fn new(expr: &str, reason: impl Into<String>) -> Self {
        Self {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: Version,
    inclusive: bool,
}

/// A contiguous set of versions. `None` on either side means unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Interval {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl Interval {
    fn any() -> Self {
        Self {
            lower: None,
            upper: None,
        }
    }

    fn exact(version: Version) -> Self {
        Self::between(version.clone(), true, version, true)
    }

    fn at_least(version: Version, inclusive: bool) -> Self {
        Self {
            lower: Some(Bound { version, inclusive }),
            upper: None,
        }
    }

    fn at_most(version: Version, inclusive: bool) -> Self {
        Self {
            lower: None,
            upper: Some(Bound { version, inclusive }),
        }
    }

    fn between(low: Version, low_inclusive: bool, high: Version, high_inclusive: bool) -> Self {
        Self {
            lower: Some(Bound {
                version: low,
                inclusive: low_inclusive,
            }),
            upper: Some(Bound {
                version: high,
                inclusive: high_inclusive,
            }),
        }
    }

    fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(low), Some(high)) => {
                low.version > high.version
                    || (low.version == high.version && !(low.inclusive && high.inclusive))
            }
            _ => false,
        }
    }

    /// Returns the overlap of both intervals, or `None` when they are disjoint.
    fn intersect(&self, other: &Interval) -> Option<Interval> {
        let lower = match (&self.lower, &other.lower) {
            (None, None) => None,
            (Some(bound), None) | (None, Some(bound)) => Some(bound.clone()),
            (Some(left), Some(right)) => Some(max_lower_bound(left, right)),
        };
        let upper = match (&self.upper, &other.upper) {
            (None, None) => None,
            (Some(bound), None) | (None, Some(bound)) => Some(bound.clone()),
            (Some(left), Some(right)) => Some(min_upper_bound(left, right)),
        };

        let interval = Interval { lower, upper };
        if interval.is_empty() {
            None
        } else {
            Some(interval)
        }
    }

    fn contains(&self, version: &Version) -> bool {
        let above = match &self.lower {
            None => true,
            Some(b) if b.inclusive => version >= &b.version,
            Some(b) => version > &b.version,
        };
        let below = match &self.upper {
            None => true,
            Some(b) if b.inclusive => version <= &b.version,
            Some(b) => version < &b.version,
        };
        above && below
    }
}

fn max_lower_bound(left: &Bound, right: &Bound) -> Bound {
    if left.version > right.version {
        left.clone()
    } else if right.version > left.version {
        right.clone()
    } else {
        Bound {
            version: left.version.clone(),
            inclusive: left.inclusive && right.inclusive,
        }
    }
}

fn min_upper_bound(left: &Bound, right: &Bound) -> Bound {
    if left.version < right.version {
        left.clone()
    } else if right.version < left.version {
        right.clone()
    } else {
        Bound {
            version: left.version.clone(),
            inclusive: left.inclusive && right.inclusive,
        }
    }
}

/// A parsed version expression: a union of intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    intervals: Vec<Interval>,
}

impl VersionRange {
    /// Parses a version or range expression.
    ///
    /// # Errors
    ///
    /// Returns [`RangeParseError`] when the expression uses an unknown syntax or
    /// contains a version without any numeric component.
    pub fn parse(expr: &str) -> Result<Self, RangeParseError> {
        let trimmed = expr.trim();

        let intervals = if trimmed.starts_with('[') || trimmed.starts_with('(') {
            parse_maven_intervals(trimmed).map_err(|reason| RangeParseError::new(expr, reason))?
        } else {
            let mut intervals = Vec::new();
            for alternative in trimmed.split("||") {
                let interval = parse_comparator_set(alternative.trim())
                    .map_err(|reason| RangeParseError::new(expr, reason))?;
                if let Some(interval) = interval {
                    intervals.push(interval);
                }
            }
            intervals
        };

        Ok(Self { intervals })
    }

    /// Returns true when at least one version satisfies both ranges.
    pub fn intersects(&self, other: &VersionRange) -> bool {
        self.intervals.iter().any(|left| {
            other
                .intervals
                .iter()
                .any(|right| left.intersect(right).is_some())
        })
    }

    /// Returns true when the version lies inside this range.
    pub fn contains(&self, version: &Version) -> bool {
        self.intervals.iter().any(|interval| interval.contains(version))
    }

    /// Returns true when no version can satisfy this range.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

/// Checks whether two version expressions overlap.
///
/// Identical strings always overlap, even when they cannot be parsed. A parse
/// failure on either side is logged and treated as "no overlap".
pub fn versions_overlap(left: &str, right: &str) -> bool {
    if left.trim() == right.trim() {
        return true;
    }

    match (VersionRange::parse(left), VersionRange::parse(right)) {
        (Ok(l), Ok(r)) => l.intersects(&r),
        (Err(err), _) | (_, Err(err)) => {
            warn!(error = %err, left, right, "cannot compare versions, treating as non-overlapping");
            false
        }
    }
}

/// Parses a single version leniently.
///
/// Accepts strict semver as well as the shapes found in Maven and other
/// ecosystems: `1`, `1.2`, `v1.2.3`, `1.0-SNAPSHOT` (pre-release),
/// `1.2.3.RELEASE` and `1.2.3.4` (build metadata).
pub fn parse_version(raw: &str) -> Result<Version, RangeParseError> {
    let partial = parse_partial(raw).map_err(|reason| RangeParseError::new(raw, reason))?;
    if partial.wildcard {
        return Err(RangeParseError::new(raw, "wildcards are not a single version"));
    }
    Ok(partial.version)
}

/// A possibly incomplete version such as `1.2` or `1.x`.
#[derive(Debug)]
struct Partial {
    version: Version,
    /// Number of numeric components written before any wildcard (0..=3).
    given: usize,
    wildcard: bool,
}

impl Partial {
    /// The first version past the wildcard, e.g. `1.2.x` -> `1.3.0`.
    fn next(&self) -> Option<Version> {
        let v = &self.version;
        match self.given {
            0 => None,
            1 => Some(Version::new(v.major + 1, 0, 0)),
            2 => Some(Version::new(v.major, v.minor + 1, 0)),
            _ => Some(Version::new(v.major, v.minor, v.patch + 1)),
        }
    }

    /// The interval a bare (operator-less) version denotes.
    fn as_interval(&self) -> Interval {
        if !self.wildcard {
            return Interval::exact(self.version.clone());
        }
        match self.next() {
            Some(next) => Interval::between(self.version.clone(), true, next, false),
            None => Interval::any(),
        }
    }
}

fn parse_partial(raw: &str) -> Result<Partial, String> {
    let s = raw.trim().trim_start_matches(['v', 'V']);
    if s.is_empty() {
        return Err("empty version".to_string());
    }
    if matches!(s, "*" | "x" | "X") {
        return Ok(Partial {
            version: Version::new(0, 0, 0),
            given: 0,
            wildcard: true,
        });
    }
    if let Ok(version) = Version::parse(s) {
        return Ok(Partial {
            version,
            given: 3,
            wildcard: false,
        });
    }

    let segments: Vec<&str> = s.split('.').collect();
    let mut numbers: Vec<u64> = Vec::new();
    let mut wildcard = false;
    let mut qualifier = String::new();
    let mut prerelease = false;

    for (i, segment) in segments.iter().enumerate() {
        if matches!(*segment, "x" | "X" | "*") {
            wildcard = true;
            break;
        }
        let digits = segment
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(segment.len());
        if digits == 0 {
            qualifier = segments[i..].join(".");
            break;
        }
        let number = segment[..digits]
            .parse::<u64>()
            .map_err(|e| format!("bad numeric component '{}': {}", segment, e))?;
        numbers.push(number);
        if digits < segment.len() {
            let tail = &segment[digits..];
            prerelease = tail.starts_with('-');
            let mut rest = vec![tail];
            rest.extend_from_slice(&segments[i + 1..]);
            qualifier = rest.join(".");
            break;
        }
    }

    if numbers.is_empty() {
        return Err("no numeric version component".to_string());
    }

    let given = numbers.len().min(3);
    let mut version = Version::new(
        numbers[0],
        numbers.get(1).copied().unwrap_or(0),
        numbers.get(2).copied().unwrap_or(0),
    );
    if wildcard {
        return Ok(Partial {
            version,
            given,
            wildcard,
        });
    }

    let qualifier = sanitize_identifiers(&qualifier);
    let mut build: Vec<String> = numbers.iter().skip(3).map(|n| n.to_string()).collect();
    if !qualifier.is_empty() {
        if prerelease {
            version.pre = Prerelease::new(&qualifier)
                .map_err(|e| format!("bad pre-release '{}': {}", qualifier, e))?;
        } else {
            build.push(qualifier);
        }
    }
    if !build.is_empty() {
        let joined = build.join(".");
        version.build = BuildMetadata::new(&joined)
            .map_err(|e| format!("bad qualifier '{}': {}", joined, e))?;
    }

    Ok(Partial {
        version,
        given,
        wildcard,
    })
}

/// Maps a free-form qualifier onto semver identifier characters.
fn sanitize_identifiers(qualifier: &str) -> String {
    let cleaned: String = qualifier
        .trim_start_matches(['-', '_', '.', '+'])
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    cleaned
        .split('.')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Parses one `||` alternative. `Ok(None)` means the comparators contradict each other.
fn parse_comparator_set(s: &str) -> Result<Option<Interval>, String> {
    if s.is_empty() || matches!(s, "*" | "x" | "X" | "latest") {
        return Ok(Some(Interval::any()));
    }

    if let Some((low, high)) = s.split_once(" - ") {
        let low = parse_partial(low)?;
        let high = parse_partial(high)?;
        let upper = if high.wildcard {
            match high.next() {
                Some(next) => Interval::at_most(next, false),
                None => Interval::any(),
            }
        } else {
            Interval::at_most(high.version, true)
        };
        return Ok(Interval::at_least(low.version, true).intersect(&upper));
    }

    let mut acc = Interval::any();
    let mut pending_op = String::new();
    for token in s
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if token.chars().all(|c| "<>=^~".contains(c)) {
            pending_op.push_str(token);
            continue;
        }
        let comparator = format!("{}{}", pending_op, token);
        pending_op.clear();

        let interval = parse_comparator(&comparator)?;
        match acc.intersect(&interval) {
            Some(next) => acc = next,
            None => return Ok(None),
        }
    }
    if !pending_op.is_empty() {
        return Err(format!("operator '{}' has no version", pending_op));
    }

    Ok(Some(acc))
}

fn parse_comparator(comparator: &str) -> Result<Interval, String> {
    const OPERATORS: [&str; 8] = [">=", "<=", "==", ">", "<", "=", "^", "~"];

    let (op, rest) = OPERATORS
        .iter()
        .find_map(|op| comparator.strip_prefix(*op).map(|rest| (*op, rest)))
        .unwrap_or(("", comparator));
    let partial = parse_partial(rest)?;
    if partial.given == 0 {
        return Ok(Interval::any());
    }
    let version = partial.version.clone();

    let interval = match op {
        "" | "=" | "==" => partial.as_interval(),
        ">=" => Interval::at_least(version, true),
        ">" => match (partial.wildcard, partial.next()) {
            (true, Some(next)) => Interval::at_least(next, true),
            _ => Interval::at_least(version, false),
        },
        "<" => Interval::at_most(version, false),
        "<=" => match (partial.wildcard, partial.next()) {
            (true, Some(next)) => Interval::at_most(next, false),
            _ => Interval::at_most(version, true),
        },
        "^" => {
            let upper = caret_upper_bound(&version);
            Interval::between(version, true, upper, false)
        }
        "~" => {
            let upper = if partial.given >= 2 {
                Version::new(version.major, version.minor + 1, 0)
            } else {
                Version::new(version.major + 1, 0, 0)
            };
            Interval::between(version, true, upper, false)
        }
        other => return Err(format!("unsupported operator '{}'", other)),
    };

    Ok(interval)
}

fn caret_upper_bound(version: &Version) -> Version {
    if version.major > 0 {
        Version::new(version.major + 1, 0, 0)
    } else if version.minor > 0 {
        Version::new(0, version.minor + 1, 0)
    } else {
        Version::new(0, 0, version.patch + 1)
    }
}

fn parse_maven_intervals(expr: &str) -> Result<Vec<Interval>, String> {
    let mut intervals = Vec::new();
    let mut rest = expr.trim();

    while !rest.is_empty() {
        let lower_inclusive = if rest.starts_with('[') {
            true
        } else if rest.starts_with('(') {
            false
        } else {
            return Err(format!("expected '[' or '(' at '{}'", rest));
        };
        let close = rest
            .find(|c: char| c == ']' || c == ')')
            .ok_or_else(|| "unterminated interval".to_string())?;
        let upper_inclusive = rest[close..].starts_with(']');
        let body = &rest[1..close];
        rest = rest[close + 1..].trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();

        let interval = match body.split_once(',') {
            None => {
                if !(lower_inclusive && upper_inclusive) {
                    return Err(format!("single version '{}' must be written as [v]", body));
                }
                Interval::exact(parse_exact(body)?)
            }
            Some((low, high)) => {
                let lower = if low.trim().is_empty() {
                    None
                } else {
                    Some(Bound {
                        version: parse_exact(low)?,
                        inclusive: lower_inclusive,
                    })
                };
                let upper = if high.trim().is_empty() {
                    None
                } else {
                    Some(Bound {
                        version: parse_exact(high)?,
                        inclusive: upper_inclusive,
                    })
                };
                Interval { lower, upper }
            }
        };

        if !interval.is_empty() {
            intervals.push(interval);
        }
    }

    Ok(intervals)
}

fn parse_exact(raw: &str) -> Result<Version, String> {
    let partial = parse_partial(raw)?;
    if partial.wildcard {
        return Err(format!("wildcard '{}' is not allowed inside an interval", raw.trim()));
    }
    Ok(partial.version)
}
