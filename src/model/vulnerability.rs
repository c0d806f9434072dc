use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Maps a numeric CVSS base score onto a severity bucket.
    pub fn from_cvss_score(score: f32) -> Self {
        match score {
            s if s >= 9.0 => Severity::Critical,
            s if s >= 7.0 => Severity::High,
            s if s >= 4.0 => Severity::Medium,
            s if s > 0.0 => Severity::Low,
            _ => Severity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Estimates severity from a CVSS vector string when no usable score is present.
///
/// Only the impact metrics are inspected.
pub fn severity_from_vector(vector: &str) -> Severity {
    if !vector.starts_with("CVSS:") {
        return Severity::Unknown;
    }
    if vector.contains("/C:H") || vector.contains("/I:H") || vector.contains("/A:H") {
        return Severity::High;
    }
    if vector.contains("/C:L") || vector.contains("/I:L") || vector.contains("/A:L") {
        return Severity::Medium;
    }
    Severity::Low
}

/// A single finding reported by the vulnerability service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cvss_score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_vector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Vulnerability {
    pub fn severity(&self) -> Severity {
        match Severity::from_cvss_score(self.cvss_score) {
            Severity::Unknown => self
                .cvss_vector
                .as_deref()
                .map(severity_from_vector)
                .unwrap_or(Severity::Unknown),
            severity => severity,
        }
    }
}
