//! Core data types for coordinates, vulnerabilities, and audit results.
//!
//! - [`PackageCoordinate`] - A package identity with an optional version or range
//! - [`InclusionPath`] - The chain of dependencies that pulled a package in
//! - [`Vulnerability`] - A single finding reported by the service
//! - [`AuditedPackage`] - A package together with its (filtered) findings
//!
//! # Example
//!
//! ```
//! use ossaudit::PackageCoordinate;
//!
//! let coordinate = PackageCoordinate::builder()
//!     .ecosystem("maven")
//!     .namespace("org.webjars.npm")
//!     .name("jquery")
//!     .version("1.2.3")
//!     .build()?;
//!
//! assert_eq!(coordinate.to_string(), "maven:org.webjars.npm/jquery@1.2.3");
//! # Ok::<(), ossaudit::error::CoordinateError>(())
//! ```

mod coordinate;
mod package;
mod vulnerability;

pub use coordinate::*;
pub use package::*;
pub use vulnerability::*;
