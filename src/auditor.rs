//! Audits a resolved dependency tree.
//!
//! The auditor is the policy layer on top of [`LookupService`]: it registers
//! every artifact of the tree with the chain of dependencies that pulled it in,
//! turns configured [`Exclusion`]s into filter rules, decides what a rate-limited
//! response means, and keeps only the packages that had findings.

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::{AuditError, CoordinateError, Result};
use crate::filter::FilterRule;
use crate::lookup::{LookupService, LookupTransport};
use crate::model::{AuditStatus, AuditedPackage, InclusionPath, PackageCoordinate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const ECOSYSTEM: &str = "maven";

/// One resolved artifact and the artifacts it depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub group: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DependencyNode>,
}

impl DependencyNode {
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version: version.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: DependencyNode) -> Self {
        self.children.push(child);
        self
    }

    /// Parses a JSON array of root dependencies.
    pub fn parse_roots(json: &str) -> serde_json::Result<Vec<DependencyNode>> {
        serde_json::from_str(json)
    }

    pub fn coordinate(&self) -> std::result::Result<PackageCoordinate, CoordinateError> {
        PackageCoordinate::builder()
            .ecosystem(ECOSYSTEM)
            .namespace(&self.group)
            .name(&self.name)
            .version(&self.version)
            .build()
    }
}

/// A configured suppression.
///
/// Without `vid` every vulnerability of a matching package is ignored; with it,
/// only that vulnerability. `packages` is a dependency chain of
/// `group:name[:version]` entries; an empty chain with a `vid` ignores the
/// vulnerability everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Exclusion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vid: Option<String>,
    pub packages: Vec<String>,
}

impl Exclusion {
    /// Builds the filter rule for this exclusion.
    ///
    /// Returns `None` when any package entry is malformed: dropping a single
    /// entry would widen the rule to chains, or to a whole tree, that were
    /// never named.
    pub fn to_rule(&self) -> Option<FilterRule> {
        let mut pattern = Vec::with_capacity(self.packages.len());
        for entry in &self.packages {
            match parse_artifact(entry) {
                Some(coordinate) => pattern.push(coordinate),
                None => {
                    warn!(
                        "Ignoring exclusion {:?}: malformed package entry '{}'",
                        self, entry
                    );
                    return None;
                }
            }
        }

        Some(match &self.vid {
            None => FilterRule::ignore_package(pattern),
            Some(vid) if pattern.is_empty() => FilterRule::ignore_vulnerability(vid.clone()),
            Some(vid) => FilterRule::ignore_vulnerability_in(pattern, vid.clone()),
        })
    }
}

/// Parses `group:name[:version]`.
fn parse_artifact(entry: &str) -> Option<PackageCoordinate> {
    let mut tokens = entry.split(':');
    let group = tokens.next()?;
    let name = tokens.next()?;
    let mut builder = PackageCoordinate::builder()
        .ecosystem(ECOSYSTEM)
        .namespace(group)
        .name(name);
    if let Some(version) = tokens.next() {
        builder = builder.version(version);
    }
    builder.build().ok()
}

/// A package with findings, as it appears in the audit report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedPackage {
    #[serde(flatten)]
    pub package: AuditedPackage,
    pub status: AuditStatus,
    /// The root dependency through which this package was pulled in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub packages: Vec<ReportedPackage>,
    /// Vulnerabilities reported by the service, before filtering.
    pub total_vulnerabilities: usize,
    /// Vulnerabilities left after filtering.
    pub surviving_vulnerabilities: usize,
}

impl AuditReport {
    pub fn has_vulnerabilities(&self) -> bool {
        self.surviving_vulnerabilities > 0
    }
}

pub struct Auditor {
    service: LookupService,
    config: Config,
}

impl Auditor {
    pub fn new(config: Config, transport: Arc<dyn LookupTransport>) -> Result<Self> {
        let mut service = LookupService::new(transport);
        service.set_cache_location(config.cache_location())?;
        service.set_cache_ttl(config.cache_ttl_hours);
        service.set_max_batch_size(config.max_packages_per_batch)?;
        if let Some(credentials) = config
            .credentials
            .as_ref()
            .filter(|c| !c.username.is_empty() && !c.token.is_empty())
        {
            service.set_credentials(credentials.username.clone(), credentials.token.clone());
        }
        for rule in config.exclusions.iter().filter_map(Exclusion::to_rule) {
            debug!("Adding filter rule {:?}", rule);
            service.add_filter_rule(rule);
        }
        Ok(Self { service, config })
    }

    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.service = self.service.with_cache_store(store);
        self
    }

    fn has_credentials(&self) -> bool {
        self.config
            .credentials
            .as_ref()
            .is_some_and(|c| !c.username.is_empty() && !c.token.is_empty())
    }

    /// Registers every artifact in the trees rooted at `roots`.
    ///
    /// Each artifact is registered with the full chain from its root. Artifacts
    /// on the ignore list are skipped, but their dependencies are still audited.
    pub fn add_dependencies(&mut self, roots: &[DependencyNode]) -> Result<()> {
        for root in roots {
            self.add_node(root, None)?;
        }
        Ok(())
    }

    fn add_node(&mut self, node: &DependencyNode, parent: Option<&InclusionPath>) -> Result<()> {
        let coordinate = node.coordinate()?;
        let path = match parent {
            Some(parent) => parent.child(coordinate),
            None => InclusionPath::single(coordinate),
        };

        if self.config.is_ignored(&node.group, &node.name, &node.version) {
            info!("{}:{}:{} is ignored due to settings", node.group, node.name, node.version);
        } else {
            self.service.register(path.clone());
        }

        for child in &node.children {
            self.add_node(child, Some(&path))?;
        }
        Ok(())
    }

    /// Runs the audit and builds the report.
    pub async fn run(&self) -> Result<AuditReport> {
        let results = match self.service.run().await {
            Ok(results) => results,
            Err(e) if e.is_rate_limited() => return self.rate_limited(e),
            Err(e) => return Err(e),
        };

        let mut report = AuditReport::default();
        for (package, path) in results.into_iter().zip(self.service.registered_paths()) {
            if package.unfiltered_vulnerability_count == 0 {
                continue;
            }
            report.total_vulnerabilities += package.unfiltered_vulnerability_count;
            report.surviving_vulnerabilities += package.vulnerabilities.len();
            let parent = (path.coordinates().len() > 1).then(|| path.root().to_string());
            report.packages.push(ReportedPackage {
                status: package.status(),
                package,
                parent,
            });
        }
        Ok(report)
    }

    fn rate_limited(&self, error: AuditError) -> Result<AuditReport> {
        if !self.has_credentials() {
            return Err(AuditError::RateLimitedWithoutCredentials);
        }
        if self.config.rate_limit_as_error {
            return Err(error);
        }
        info!("Too many requests (429) while fetching audit results; fetched results have been cached.");
        info!("Wait before running again to audit the remaining packages, or raise cache_ttl_hours.");
        Ok(AuditReport::default())
    }
}
