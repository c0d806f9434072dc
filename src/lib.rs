pub mod auditor;
pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod lookup;
pub mod model;
pub mod output;
pub mod platform;
pub mod version_range;

pub use auditor::{AuditReport, Auditor, DependencyNode, Exclusion};
pub use cache::{CacheStore, FileCacheStore, MemoryCacheStore};
pub use config::Config;
pub use error::{AuditError, Result};
pub use filter::{FilterEngine, FilterRule};
pub use lookup::{Credentials, LookupService, LookupTransport, OssIndexClient, RunPhase};
pub use model::{AuditStatus, AuditedPackage, InclusionPath, PackageCoordinate, Severity, Vulnerability};
pub use version_range::VersionRange;
