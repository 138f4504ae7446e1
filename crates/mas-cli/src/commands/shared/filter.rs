use mas_audit::AuditFilter;
use mas_core::enums::{AuditCategory, Severity};

use crate::cli::subcommands::AuditFilterArgs;
use crate::commands::shared::parse::{parse_timestamp, parse_value};

/// Build an [`AuditFilter`] from command-line flags.
pub fn audit_filter(args: &AuditFilterArgs) -> anyhow::Result<AuditFilter> {
    Ok(AuditFilter {
        category: args
            .category
            .as_deref()
            .map(parse_value::<AuditCategory>)
            .transpose()?,
        action: args.action.clone(),
        severities: args
            .severities
            .iter()
            .map(|raw| parse_value::<Severity>(raw))
            .collect::<anyhow::Result<_>>()?,
        user_id: args.user,
        customer_id: args.customer,
        ip_address: args.ip.clone(),
        from: args
            .from
            .as_deref()
            .map(|raw| parse_timestamp(raw, "from"))
            .transpose()?,
        to: args
            .to
            .as_deref()
            .map(|raw| parse_timestamp(raw, "to"))
            .transpose()?,
        search: args.search.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_flags_build_an_empty_filter() {
        let filter = audit_filter(&AuditFilterArgs::default()).unwrap();
        assert_eq!(filter, AuditFilter::default());
    }

    #[test]
    fn flags_map_onto_filter_fields() {
        let args = AuditFilterArgs {
            category: Some("security".into()),
            severities: vec!["high".into(), "critical".into()],
            customer: Some(7),
            from: Some("2026-01-01".into()),
            ..AuditFilterArgs::default()
        };
        let filter = audit_filter(&args).unwrap();
        assert_eq!(filter.category, Some(AuditCategory::Security));
        assert_eq!(filter.severities, vec![Severity::High, Severity::Critical]);
        assert_eq!(filter.customer_id, Some(7));
        assert!(filter.from.is_some());
    }

    #[test]
    fn unknown_category_is_rejected() {
        let args = AuditFilterArgs {
            category: Some("billing".into()),
            ..AuditFilterArgs::default()
        };
        assert!(audit_filter(&args).is_err());
    }
}
