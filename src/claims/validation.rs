//! Claim validation results
//!
//! Issues are graded: blocking issues (and time checks, which are blocking
//! for live traffic) cause the claim to be dropped; informational issues are
//! recorded for logging and otherwise ignored.

use super::codec::Claim;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Structurally unusable claim
    Blocking,
    /// Expired or not yet valid
    TimeCheck,
    /// Worth logging, never a reason to drop
    Informational,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub description: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResults {
    issues: Vec<ValidationIssue>,
}

impl ValidationResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_blocking(&mut self, description: impl Into<String>) {
        self.push(description, Severity::Blocking);
    }

    pub fn add_time_check(&mut self, description: impl Into<String>) {
        self.push(description, Severity::TimeCheck);
    }

    pub fn add_informational(&mut self, description: impl Into<String>) {
        self.push(description, Severity::Informational);
    }

    fn push(&mut self, description: impl Into<String>, severity: Severity) {
        self.issues.push(ValidationIssue {
            description: description.into(),
            severity,
        });
    }

    /// True if any issue should cause the claim to be rejected.
    pub fn is_blocking(&self, include_time_checks: bool) -> bool {
        self.issues.iter().any(|issue| match issue.severity {
            Severity::Blocking => true,
            Severity::TimeCheck => include_time_checks,
            Severity::Informational => false,
        })
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for ValidationResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let descriptions: Vec<&str> = self
            .issues
            .iter()
            .map(|issue| issue.description.as_str())
            .collect();
        write!(f, "{}", descriptions.join("; "))
    }
}

/// Check a decoded claim against the clock and the expected audience.
///
/// Signature checks happen in `decode`; this only looks at claim contents.
pub fn validate(claim: &Claim, now: i64, audience: Option<&str>) -> ValidationResults {
    let mut vr = ValidationResults::new();

    if claim.iss.is_empty() {
        vr.add_blocking("claim is missing an issuer");
    }
    if claim.sub.is_empty() {
        vr.add_blocking("claim is missing a subject");
    }
    if claim.jti.is_empty() {
        vr.add_blocking("claim is missing an id");
    }

    if let Some(exp) = claim.exp {
        if exp <= now {
            vr.add_time_check("claim is expired");
        }
    }
    if let Some(nbf) = claim.nbf {
        if nbf > now {
            vr.add_time_check("claim is not yet valid");
        }
    }

    if claim.iat == 0 {
        vr.add_informational("claim has no issued-at time");
    }
    if let (Some(expected), Some(actual)) = (audience, claim.aud.as_deref()) {
        if expected != actual {
            vr.add_informational(format!("claim audience {actual} does not match {expected}"));
        }
    }

    vr
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_claim() -> Claim {
        Claim {
            jti: "id-1".to_string(),
            iat: 1_000,
            iss: "UISSUER".to_string(),
            sub: "general".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_complete_claim_has_no_issues() {
        let vr = validate(&complete_claim(), 2_000, None);
        assert!(vr.is_empty());
        assert!(!vr.is_blocking(true));
    }

    #[test]
    fn test_expired_claim_is_time_check() {
        let claim = Claim {
            exp: Some(1_500),
            ..complete_claim()
        };
        let vr = validate(&claim, 2_000, None);

        assert!(vr.is_blocking(true));
        assert!(!vr.is_blocking(false));
        assert_eq!(vr.issues()[0].severity, Severity::TimeCheck);
    }

    #[test]
    fn test_expiry_boundary_is_expired() {
        let claim = Claim {
            exp: Some(2_000),
            ..complete_claim()
        };
        assert!(validate(&claim, 2_000, None).is_blocking(true));
    }

    #[test]
    fn test_not_yet_valid_claim() {
        let claim = Claim {
            nbf: Some(3_000),
            ..complete_claim()
        };
        assert!(validate(&claim, 2_000, None).is_blocking(true));
    }

    #[test]
    fn test_missing_fields_are_blocking() {
        let vr = validate(&Claim::default(), 2_000, None);
        assert!(vr.is_blocking(false));
        assert!(vr.to_string().contains("missing an issuer"));
        assert!(vr.to_string().contains("missing a subject"));
        assert!(vr.to_string().contains("missing an id"));
    }

    #[test]
    fn test_audience_mismatch_is_informational() {
        let claim = Claim {
            aud: Some("OTHER".to_string()),
            ..complete_claim()
        };
        let vr = validate(&claim, 2_000, Some("DEMO"));

        assert_eq!(vr.issues().len(), 1);
        assert_eq!(vr.issues()[0].severity, Severity::Informational);
        assert!(!vr.is_blocking(true));
    }
}
