use crate::error::CoordinateError;
use crate::version_range::versions_overlap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Version-less identity of a package: `(ecosystem, namespace, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordinateKey {
    pub ecosystem: String,
    pub namespace: Option<String>,
    pub name: String,
}

/// Identifies a package and, optionally, a version or version range.
///
/// `==` is strict structural equality. Hashing only covers the version-less
/// [`CoordinateKey`], so coordinates that differ only by version land in the same
/// bucket; use [`PackageCoordinate::matches`] to decide whether they denote the
/// same package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCoordinate {
    ecosystem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl PackageCoordinate {
    pub fn builder() -> PackageCoordinateBuilder {
        PackageCoordinateBuilder::default()
    }

    /// Starts a builder pre-filled with this coordinate's fields.
    pub fn to_builder(&self) -> PackageCoordinateBuilder {
        PackageCoordinateBuilder {
            ecosystem: Some(self.ecosystem.clone()),
            namespace: self.namespace.clone(),
            name: Some(self.name.clone()),
            version: self.version.clone(),
        }
    }

    pub fn ecosystem(&self) -> &str {
        &self.ecosystem
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn key(&self) -> CoordinateKey {
        CoordinateKey {
            ecosystem: self.ecosystem.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// Package URL form (`pkg:ecosystem/namespace/name@version`), as the
    /// vulnerability service expects it in requests.
    pub fn to_purl(&self) -> String {
        let mut purl = format!("pkg:{}/", self.ecosystem);
        if let Some(namespace) = &self.namespace {
            purl.push_str(namespace);
            purl.push('/');
        }
        purl.push_str(&self.name);
        if let Some(version) = &self.version {
            purl.push('@');
            purl.push_str(version);
        }
        purl
    }

    /// Lower-cased canonical form, used for deduplication and as the cache key.
    pub fn cache_key(&self) -> String {
        self.to_string().to_lowercase()
    }

    /// Returns true when both coordinates name the same package and their versions
    /// are compatible: either side has no version, or the ranges intersect.
    ///
    /// This relation is not transitive (`[1,2]` matches `[2,3]` and `[2,3]` matches
    /// `[3,4]`), so it must never back a container's equality.
    pub fn matches(&self, other: &PackageCoordinate) -> bool {
        if self.ecosystem != other.ecosystem
            || self.namespace != other.namespace
            || self.name != other.name
        {
            return false;
        }
        match (&self.version, &other.version) {
            (Some(mine), Some(theirs)) => versions_overlap(mine, theirs),
            _ => true,
        }
    }
}

impl Hash for PackageCoordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ecosystem.hash(state);
        self.namespace.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for PackageCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.ecosystem)?;
        if let Some(namespace) = &self.namespace {
            write!(f, "{}/", namespace)?;
        }
        write!(f, "{}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, "@{}", version)?;
        }
        Ok(())
    }
}

impl FromStr for PackageCoordinate {
    type Err = CoordinateError;

    /// Parses `ecosystem:namespace/name@version` as well as package URLs
    /// (`pkg:ecosystem/namespace/name@version`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CoordinateError::Malformed(s.to_string());
        let s = s.trim();

        let (ecosystem, rest) = match s.strip_prefix("pkg:") {
            Some(purl) => purl.split_once('/').ok_or_else(malformed)?,
            None => s.split_once(':').ok_or_else(malformed)?,
        };
        let (namespace, name_and_version) = match rest.rsplit_once('/') {
            Some((namespace, tail)) => (Some(namespace), tail),
            None => (None, rest),
        };
        let (name, version) = match name_and_version.split_once('@') {
            Some((name, version)) => (name, Some(version)),
            None => (name_and_version, None),
        };

        let mut builder = PackageCoordinate::builder().ecosystem(ecosystem).name(name);
        if let Some(namespace) = namespace {
            builder = builder.namespace(namespace);
        }
        if let Some(version) = version {
            builder = builder.version(version);
        }
        builder.build()
    }
}

/// Builder for [`PackageCoordinate`].
///
/// Blank strings are treated as absent, so "no namespace" and `""` are the same.
#[derive(Debug, Clone, Default)]
pub struct PackageCoordinateBuilder {
    ecosystem: Option<String>,
    namespace: Option<String>,
    name: Option<String>,
    version: Option<String>,
}

fn present(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl PackageCoordinateBuilder {
    pub fn ecosystem(mut self, ecosystem: impl AsRef<str>) -> Self {
        self.ecosystem = present(ecosystem.as_ref());
        self
    }

    pub fn namespace(mut self, namespace: impl AsRef<str>) -> Self {
        self.namespace = present(namespace.as_ref());
        self
    }

    pub fn name(mut self, name: impl AsRef<str>) -> Self {
        self.name = present(name.as_ref());
        self
    }

    pub fn version(mut self, version: impl AsRef<str>) -> Self {
        self.version = present(version.as_ref());
        self
    }

    /// Drops any version, leaving a coordinate that matches every version.
    pub fn any_version(mut self) -> Self {
        self.version = None;
        self
    }

    pub fn build(self) -> Result<PackageCoordinate, CoordinateError> {
        Ok(PackageCoordinate {
            ecosystem: self
                .ecosystem
                .ok_or(CoordinateError::MissingField("ecosystem"))?,
            namespace: self.namespace,
            name: self.name.ok_or(CoordinateError::MissingField("name"))?,
            version: self.version,
        })
    }
}

/// The chain of packages from a root dependency down to the audited package
/// (inclusive). Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionPath(Vec<PackageCoordinate>);

impl InclusionPath {
    pub fn new(coordinates: Vec<PackageCoordinate>) -> Result<Self, CoordinateError> {
        if coordinates.is_empty() {
            return Err(CoordinateError::EmptyPath);
        }
        Ok(Self(coordinates))
    }

    /// A path consisting of a root dependency only.
    pub fn single(coordinate: PackageCoordinate) -> Self {
        Self(vec![coordinate])
    }

    /// The audited package: the last element of the path.
    pub fn target(&self) -> &PackageCoordinate {
        // Non-empty by construction.
        &self.0[self.0.len() - 1]
    }

    /// The first element of the path.
    pub fn root(&self) -> &PackageCoordinate {
        &self.0[0]
    }

    pub fn coordinates(&self) -> &[PackageCoordinate] {
        &self.0
    }

    /// Returns a new path extended by one more dependency.
    pub fn child(&self, coordinate: PackageCoordinate) -> Self {
        let mut coordinates = self.0.clone();
        coordinates.push(coordinate);
        Self(coordinates)
    }
}
