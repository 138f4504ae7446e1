//! Closed enumerations used across MAS.
//!
//! All enums use `snake_case` serialization via `#[serde(rename_all = "snake_case")]`.
//! `FromStr` is the runtime validator at the serialization boundary (config,
//! env, SQL rows, CLI flags); everywhere else the type system does the work.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Implements `FromStr` through the serde representation so the accepted
/// spellings always match what is written to storage.
macro_rules! impl_from_str {
    ($ty:ty, $kind:literal) => {
        impl FromStr for $ty {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                serde_json::from_value(serde_json::Value::String(s.trim().to_ascii_lowercase()))
                    .map_err(|_| CoreError::InvalidEnum {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Taxonomy axis of a [`MasError`](crate::errors::MasError).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    General,
    Config,
    Provider,
    Workflow,
    Segment,
    Ai,
    Campaign,
    Consent,
    Validation,
    Security,
    Performance,
    Database,
    Api,
    Integration,
}

impl ErrorCategory {
    pub const ALL: [Self; 14] = [
        Self::General,
        Self::Config,
        Self::Provider,
        Self::Workflow,
        Self::Segment,
        Self::Ai,
        Self::Campaign,
        Self::Consent,
        Self::Validation,
        Self::Security,
        Self::Performance,
        Self::Database,
        Self::Api,
        Self::Integration,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Config => "config",
            Self::Provider => "provider",
            Self::Workflow => "workflow",
            Self::Segment => "segment",
            Self::Ai => "ai",
            Self::Campaign => "campaign",
            Self::Consent => "consent",
            Self::Validation => "validation",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Database => "database",
            Self::Api => "api",
            Self::Integration => "integration",
        }
    }

    /// Categories whose messages can be shown to an end user verbatim.
    #[must_use]
    pub const fn is_user_facing(self) -> bool {
        matches!(self, Self::Validation | Self::Config | Self::Provider)
    }
}

impl_from_str!(ErrorCategory, "error category");

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity shared by errors and audit events. Ordered `Low < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl_from_str!(Severity, "severity");

// ---------------------------------------------------------------------------
// AuditCategory
// ---------------------------------------------------------------------------

/// Category of an audit event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Authentication,
    Authorization,
    DataAccess,
    DataModification,
    Security,
    Consent,
    Gdpr,
    Configuration,
    System,
    Campaign,
    Workflow,
    Segment,
    Api,
    Integration,
}

impl AuditCategory {
    pub const ALL: [Self; 14] = [
        Self::Authentication,
        Self::Authorization,
        Self::DataAccess,
        Self::DataModification,
        Self::Security,
        Self::Consent,
        Self::Gdpr,
        Self::Configuration,
        Self::System,
        Self::Campaign,
        Self::Workflow,
        Self::Segment,
        Self::Api,
        Self::Integration,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::DataAccess => "data_access",
            Self::DataModification => "data_modification",
            Self::Security => "security",
            Self::Consent => "consent",
            Self::Gdpr => "gdpr",
            Self::Configuration => "configuration",
            Self::System => "system",
            Self::Campaign => "campaign",
            Self::Workflow => "workflow",
            Self::Segment => "segment",
            Self::Api => "api",
            Self::Integration => "integration",
        }
    }

    /// Whether partially masked sensitive values may be kept for display.
    ///
    /// Authentication and security events redact sensitive values entirely.
    #[must_use]
    pub const fn is_display_safe(self) -> bool {
        !matches!(self, Self::Authentication | Self::Security)
    }
}

impl_from_str!(AuditCategory, "audit category");

// ---------------------------------------------------------------------------
// ConsentAction
// ---------------------------------------------------------------------------

/// Action recorded in the consent log.
///
/// ```text
/// no-record → accept ⇄ revoke
///            accept → expire | withdraw
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConsentAction {
    Accept,
    Revoke,
    Update,
    Expire,
    Withdraw,
}

impl ConsentAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Revoke => "revoke",
            Self::Update => "update",
            Self::Expire => "expire",
            Self::Withdraw => "withdraw",
        }
    }
}

impl_from_str!(ConsentAction, "consent action");

// ---------------------------------------------------------------------------
// ConsentCategory
// ---------------------------------------------------------------------------

/// Purpose grouping of a consent definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConsentCategory {
    Necessary,
    Functional,
    Analytics,
    Marketing,
    Personalization,
    ThirdParty,
}

impl ConsentCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Necessary => "necessary",
            Self::Functional => "functional",
            Self::Analytics => "analytics",
            Self::Marketing => "marketing",
            Self::Personalization => "personalization",
            Self::ThirdParty => "third_party",
        }
    }
}

impl_from_str!(ConsentCategory, "consent category");

// ---------------------------------------------------------------------------
// LegalBasis
// ---------------------------------------------------------------------------

/// GDPR Article 6 lawful basis for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LegalBasis {
    Consent,
    Contract,
    LegalObligation,
    VitalInterests,
    PublicTask,
    LegitimateInterests,
}

impl LegalBasis {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Consent => "consent",
            Self::Contract => "contract",
            Self::LegalObligation => "legal_obligation",
            Self::VitalInterests => "vital_interests",
            Self::PublicTask => "public_task",
            Self::LegitimateInterests => "legitimate_interests",
        }
    }
}

impl_from_str!(LegalBasis, "legal basis");

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("validation", ErrorCategory::Validation)]
    #[case("AI", ErrorCategory::Ai)]
    #[case(" integration ", ErrorCategory::Integration)]
    fn error_category_parses(#[case] input: &str, #[case] expected: ErrorCategory) {
        assert_eq!(input.parse::<ErrorCategory>().unwrap(), expected);
    }

    #[test]
    fn unknown_values_are_rejected() {
        let err = "catastrophic".parse::<Severity>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidEnum { kind: "severity", .. }));
        assert!("".parse::<AuditCategory>().is_err());
        assert!("maybe".parse::<ConsentAction>().is_err());
    }

    #[test]
    fn as_str_matches_serde() {
        for category in ErrorCategory::ALL {
            let json = serde_json::to_value(category).unwrap();
            assert_eq!(json.as_str().unwrap(), category.as_str());
        }
        for category in AuditCategory::ALL {
            let json = serde_json::to_value(category).unwrap();
            assert_eq!(json.as_str().unwrap(), category.as_str());
            assert_eq!(category.as_str().parse::<AuditCategory>().unwrap(), category);
        }
        assert_eq!(
            serde_json::to_value(LegalBasis::LegitimateInterests).unwrap(),
            "legitimate_interests"
        );
    }

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low < Severity::Medium);
        assert_eq!(Severity::ALL.iter().max(), Some(&Severity::Critical));
    }

    #[test]
    fn user_facing_categories() {
        let facing: Vec<_> = ErrorCategory::ALL
            .into_iter()
            .filter(|c| c.is_user_facing())
            .collect();
        assert_eq!(
            facing,
            vec![
                ErrorCategory::Config,
                ErrorCategory::Provider,
                ErrorCategory::Validation
            ]
        );
    }

    #[test]
    fn display_safety() {
        assert!(!AuditCategory::Security.is_display_safe());
        assert!(!AuditCategory::Authentication.is_display_safe());
        assert!(AuditCategory::Consent.is_display_safe());
    }
}
