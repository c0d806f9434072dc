//! Path-aware vulnerability suppression.
//!
//! A rule carries a *pattern*: a short chain of coordinates that must appear as a
//! contiguous run inside the inclusion path of the audited package. A single
//! coordinate pattern therefore matches wherever that package shows up in the
//! chain, while `[parent, child]` only matches when `child` was pulled in directly
//! by `parent`.
//!
//! Rules are OR-ed: a vulnerability is suppressed as soon as one rule applies.

use crate::model::{AuditedPackage, InclusionPath, PackageCoordinate};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterRule {
    /// Drops every vulnerability of a package whose path matches `pattern`.
    IgnorePackage { pattern: Vec<PackageCoordinate> },
    /// Drops one vulnerability id, either everywhere (`pattern: None`) or only on
    /// paths matching the pattern.
    IgnoreVulnerability {
        pattern: Option<Vec<PackageCoordinate>>,
        id: String,
    },
}

impl FilterRule {
    pub fn ignore_package(pattern: Vec<PackageCoordinate>) -> Self {
        FilterRule::IgnorePackage { pattern }
    }

    pub fn ignore_vulnerability(id: impl Into<String>) -> Self {
        FilterRule::IgnoreVulnerability {
            pattern: None,
            id: id.into(),
        }
    }

    pub fn ignore_vulnerability_in(pattern: Vec<PackageCoordinate>, id: impl Into<String>) -> Self {
        FilterRule::IgnoreVulnerability {
            pattern: Some(pattern),
            id: id.into(),
        }
    }

    /// Returns true when this rule suppresses `vulnerability_id` on `path`.
    pub fn suppresses(&self, path: &InclusionPath, vulnerability_id: &str) -> bool {
        match self {
            FilterRule::IgnorePackage { pattern } => pattern_matches(pattern, path),
            FilterRule::IgnoreVulnerability { pattern, id } => {
                id == vulnerability_id
                    && pattern
                        .as_ref()
                        .map(|pattern| pattern_matches(pattern, path))
                        .unwrap_or(true)
            }
        }
    }
}

/// Contiguous-subsequence match of `pattern` against the coordinates of `path`.
///
/// An empty pattern matches nothing; a pattern longer than the path never matches.
pub fn pattern_matches(pattern: &[PackageCoordinate], path: &InclusionPath) -> bool {
    if pattern.is_empty() {
        return false;
    }
    path.coordinates().windows(pattern.len()).any(|window| {
        window
            .iter()
            .zip(pattern)
            .all(|(actual, expected)| expected.matches(actual))
    })
}

#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    rules: Vec<FilterRule>,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: FilterRule) {
        self.rules.push(rule);
    }

    pub fn should_filter(&self, path: &InclusionPath, vulnerability_id: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.suppresses(path, vulnerability_id))
    }

    fn ignores_package(&self, path: &InclusionPath) -> bool {
        self.rules.iter().any(|rule| match rule {
            FilterRule::IgnorePackage { pattern } => pattern_matches(pattern, path),
            FilterRule::IgnoreVulnerability { .. } => false,
        })
    }

    /// Shapes a package reported by the service for the given inclusion path.
    ///
    /// The result always records how many vulnerabilities the service reported,
    /// even when all of them are suppressed.
    pub fn apply(&self, package: &AuditedPackage, path: &InclusionPath) -> AuditedPackage {
        if self.ignores_package(path) {
            debug!("Ignoring all vulnerabilities of {}", package.coordinates);
            return package.with_vulnerabilities(Vec::new());
        }

        let surviving = package
            .vulnerabilities
            .iter()
            .filter(|vuln| {
                let suppressed = self.should_filter(path, &vuln.id);
                if suppressed {
                    debug!("Suppressing {} in {}", vuln.id, package.coordinates);
                }
                !suppressed
            })
            .cloned()
            .collect();
        package.with_vulnerabilities(surviving)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Vulnerability;

    const XSS: &str = "49da4413-af2b-4e55-acc0-9c752e30dde4";

    fn maven(group: &str, name: &str, version: Option<&str>) -> PackageCoordinate {
        let builder = PackageCoordinate::builder()
            .ecosystem("maven")
            .namespace(group)
            .name(name);
        match version {
            Some(version) => builder.version(version),
            None => builder,
        }
        .build()
        .unwrap()
    }

    fn jquery() -> PackageCoordinate {
        maven("org.webjars.npm", "jquery", Some("1.2.3"))
    }

    fn another() -> PackageCoordinate {
        maven("com.example", "another", Some("1.0.0"))
    }

    fn path(coordinates: &[PackageCoordinate]) -> InclusionPath {
        InclusionPath::new(coordinates.to_vec()).unwrap()
    }

    fn report() -> AuditedPackage {
        let ids = [
            XSS,
            "52f593c8-7729-435c-b9df-a7bb9ded8589",
            "3b3ba2f8-9c2c-4afe-b593-75c6b3fd4bb7",
        ];
        let mut package = AuditedPackage::pending(&jquery());
        package.vulnerabilities = ids
            .iter()
            .map(|id| Vulnerability {
                id: id.to_string(),
                title: String::new(),
                description: String::new(),
                cvss_score: 6.1,
                cvss_vector: None,
                cwe: None,
                reference: None,
            })
            .collect();
        package
    }

    #[test]
    fn test_single_coordinate_pattern_matches_anywhere() {
        let x = jquery();
        let pattern = vec![maven("org.webjars.npm", "jquery", None)];
        assert!(pattern_matches(&pattern, &path(&[another(), x.clone()])));
        assert!(pattern_matches(&pattern, &path(&[x, another()])));
    }

    #[test]
    fn test_pattern_requires_contiguous_run() {
        let a = another();
        let y = maven("com.example", "other", None);
        let x = jquery();
        assert!(!pattern_matches(&[a.clone(), x.clone()], &path(&[y.clone(), x.clone()])));
        assert!(!pattern_matches(&[a.clone(), x.clone()], &path(&[a.clone(), y, x.clone()])));
        assert!(pattern_matches(&[a.clone(), x.clone()], &path(&[a, x])));
    }

    #[test]
    fn test_empty_and_overlong_patterns_never_match() {
        assert!(!pattern_matches(&[], &path(&[jquery()])));
        assert!(!pattern_matches(&[another(), jquery()], &path(&[jquery()])));
    }

    #[test]
    fn test_pattern_versions_use_range_overlap() {
        let in_range = vec![maven("org.webjars.npm", "jquery", Some("[1.0,2.0)"))];
        let out_of_range = vec![maven("org.webjars.npm", "jquery", Some("[3.0,)"))];
        assert!(pattern_matches(&in_range, &path(&[jquery()])));
        assert!(!pattern_matches(&out_of_range, &path(&[jquery()])));
    }

    #[test]
    fn test_empty_engine_passes_everything() {
        let engine = FilterEngine::new();
        let result = engine.apply(&report(), &path(&[jquery()]));
        assert_eq!(result.vulnerabilities.len(), 3);
        assert_eq!(result.unfiltered_vulnerability_count, 3);
    }

    #[test]
    fn test_ignore_package_drops_all_but_keeps_count() {
        let mut engine = FilterEngine::new();
        engine.add_rule(FilterRule::ignore_package(vec![jquery()]));
        let result = engine.apply(&report(), &path(&[jquery()]));
        assert!(result.vulnerabilities.is_empty());
        assert_eq!(result.unfiltered_vulnerability_count, 3);
    }

    #[test]
    fn test_global_vulnerability_rule() {
        let mut engine = FilterEngine::new();
        engine.add_rule(FilterRule::ignore_vulnerability(XSS));
        let result = engine.apply(&report(), &path(&[another(), jquery()]));
        assert_eq!(result.vulnerabilities.len(), 2);
        assert!(result.vulnerabilities.iter().all(|v| v.id != XSS));
        assert_eq!(result.vulnerabilities[0].id, "52f593c8-7729-435c-b9df-a7bb9ded8589");
    }

    #[test]
    fn test_vulnerability_rule_scoped_to_parent() {
        let mut engine = FilterEngine::new();
        engine.add_rule(FilterRule::ignore_vulnerability_in(vec![another()], XSS));
        assert!(engine.should_filter(&path(&[another(), jquery()]), XSS));
        assert!(!engine.should_filter(&path(&[jquery()]), XSS));
        assert!(!engine.should_filter(&path(&[another(), jquery()]), "other-id"));
    }

    #[test]
    fn test_vulnerability_rule_with_unrelated_chain() {
        let unrelated = maven("com.example", "non-vulnerable", Some("1.0.0"));
        let mut engine = FilterEngine::new();
        engine.add_rule(FilterRule::ignore_vulnerability_in(vec![unrelated, jquery()], XSS));
        let result = engine.apply(&report(), &path(&[another(), jquery()]));
        assert_eq!(result.vulnerabilities.len(), 3);
    }

    #[test]
    fn test_overlapping_rules_do_not_duplicate() {
        let mut engine = FilterEngine::new();
        engine.add_rule(FilterRule::ignore_vulnerability_in(vec![another()], "unrelated"));
        engine.add_rule(FilterRule::ignore_vulnerability_in(vec![jquery()], "also-unrelated"));
        let result = engine.apply(&report(), &path(&[another(), jquery()]));
        assert_eq!(result.vulnerabilities.len(), 3);
        assert_eq!(result.vulnerabilities[0].id, XSS);
    }
}
