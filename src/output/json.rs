use crate::auditor::AuditReport;
use anyhow::{Context, Result};
use std::path::Path;

pub fn format_json(report: &AuditReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn print_json(report: &AuditReport) -> Result<()> {
    println!("{}", format_json(report)?);
    Ok(())
}

pub fn write_json(report: &AuditReport, path: &Path) -> Result<()> {
    std::fs::write(path, format_json(report)?)
        .with_context(|| format!("failed to write report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auditor::ReportedPackage;
    use crate::model::{AuditStatus, AuditedPackage};

    fn report() -> AuditReport {
        let package: AuditedPackage = serde_json::from_str(
            r#"{"coordinates": "maven:org.webjars.npm/jquery@1.2.3", "unfilteredVulnerabilityCount": 3}"#,
        )
        .unwrap();
        AuditReport {
            packages: vec![ReportedPackage {
                package,
                status: AuditStatus::Suppressed,
                parent: Some("maven:com.example/webapp@1.0.0".to_string()),
            }],
            total_vulnerabilities: 3,
            surviving_vulnerabilities: 0,
        }
    }

    #[test]
    fn test_report_json_shape() {
        let json: serde_json::Value = serde_json::from_str(&format_json(&report()).unwrap()).unwrap();
        assert_eq!(json["totalVulnerabilities"], 3);
        let package = &json["packages"][0];
        assert_eq!(package["coordinates"], "maven:org.webjars.npm/jquery@1.2.3");
        assert_eq!(package["unfilteredVulnerabilityCount"], 3);
        assert_eq!(package["status"], "suppressed");
        assert_eq!(package["parent"], "maven:com.example/webapp@1.0.0");
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        write_json(&report(), &path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("webapp"));
    }
}
