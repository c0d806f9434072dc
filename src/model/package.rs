use super::{PackageCoordinate, Vulnerability};
use crate::error::CoordinateError;
use serde::{Deserialize, Serialize};

/// Outcome of auditing a package once filtering has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    /// At least one vulnerability survived filtering.
    Vulnerable,
    /// Vulnerabilities were reported but every one of them was filtered out.
    Suppressed,
    /// The service reported no vulnerabilities.
    Clean,
}

/// A package as reported by the vulnerability service.
///
/// `coordinates` is the identity string the service echoes back; it is the
/// canonical coordinate form for packages registered through this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditedPackage {
    pub coordinates: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default)]
    pub unfiltered_vulnerability_count: usize,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
}

impl AuditedPackage {
    /// A placeholder for a registered coordinate with no findings yet.
    pub fn pending(coordinate: &PackageCoordinate) -> Self {
        Self {
            coordinates: coordinate.to_string(),
            description: None,
            reference: None,
            unfiltered_vulnerability_count: 0,
            vulnerabilities: Vec::new(),
        }
    }

    /// The cache key of the reported coordinate, whichever form the service
    /// echoed it in. Unparseable identities are only lower-cased.
    pub fn cache_key(&self) -> String {
        match self.coordinate() {
            Ok(coordinate) => coordinate.cache_key(),
            Err(_) => self.coordinates.to_lowercase(),
        }
    }

    /// Re-parses the identity string into a coordinate.
    pub fn coordinate(&self) -> Result<PackageCoordinate, CoordinateError> {
        self.coordinates.parse()
    }

    pub fn has_issues(&self) -> bool {
        !self.vulnerabilities.is_empty()
    }

    pub fn status(&self) -> AuditStatus {
        if self.has_issues() {
            AuditStatus::Vulnerable
        } else if self.unfiltered_vulnerability_count > 0 {
            AuditStatus::Suppressed
        } else {
            AuditStatus::Clean
        }
    }

    /// Returns a copy carrying only `vulnerabilities`, keeping the count of
    /// everything the service reported.
    pub fn with_vulnerabilities(&self, vulnerabilities: Vec<Vulnerability>) -> Self {
        Self {
            coordinates: self.coordinates.clone(),
            description: self.description.clone(),
            reference: self.reference.clone(),
            unfiltered_vulnerability_count: self.vulnerabilities.len(),
            vulnerabilities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"{
        "coordinates": "maven:org.webjars.npm/jquery@1.2.3",
        "description": "WebJar for jquery",
        "reference": "https://ossindex.sonatype.org/component/maven:org.webjars.npm/jquery@1.2.3",
        "vulnerabilities": [
            {"id": "49da4413-af2b-4e55-acc0-9c752e30dde4", "title": "XSS", "cvssScore": 6.1}
        ]
    }"#;

    #[test]
    fn test_decode_service_report() {
        let package: AuditedPackage = serde_json::from_str(REPORT).unwrap();
        assert_eq!(package.description.as_deref(), Some("WebJar for jquery"));
        assert_eq!(package.vulnerabilities.len(), 1);
        assert_eq!(package.unfiltered_vulnerability_count, 0);

        let coordinate = package.coordinate().unwrap();
        assert_eq!(coordinate.name(), "jquery");
        assert_eq!(coordinate.version(), Some("1.2.3"));
    }

    #[test]
    fn test_status_distinguishes_suppressed_from_clean() {
        let package: AuditedPackage = serde_json::from_str(REPORT).unwrap();
        assert_eq!(package.status(), AuditStatus::Vulnerable);

        let suppressed = package.with_vulnerabilities(Vec::new());
        assert_eq!(suppressed.unfiltered_vulnerability_count, 1);
        assert_eq!(suppressed.status(), AuditStatus::Suppressed);

        let coordinate = package.coordinate().unwrap();
        assert_eq!(AuditedPackage::pending(&coordinate).status(), AuditStatus::Clean);
    }

    #[test]
    fn test_pending_uses_canonical_form() {
        let coordinate = PackageCoordinate::builder()
            .ecosystem("maven")
            .namespace("org.webjars.npm")
            .name("jQuery")
            .version("1.2.3")
            .build()
            .unwrap();
        let pending = AuditedPackage::pending(&coordinate);
        assert_eq!(pending.coordinates, "maven:org.webjars.npm/jQuery@1.2.3");
        assert_eq!(pending.cache_key(), "maven:org.webjars.npm/jquery@1.2.3");
        assert!(!pending.has_issues());
    }

    #[test]
    fn test_cache_key_normalizes_echoed_purl() {
        let package = AuditedPackage {
            coordinates: "pkg:maven/org.webjars.npm/jQuery@1.2.3".to_string(),
            description: None,
            reference: None,
            unfiltered_vulnerability_count: 0,
            vulnerabilities: Vec::new(),
        };
        assert_eq!(package.cache_key(), "maven:org.webjars.npm/jquery@1.2.3");

        let opaque = AuditedPackage {
            coordinates: "Not A Coordinate".to_string(),
            ..package
        };
        assert_eq!(opaque.cache_key(), "not a coordinate");
    }
}
