//! Sensitive-field masking and context size bounding.
//!
//! Keys are matched case-insensitively by substring, so `customer_api_key`
//! and `X-Api-Key` both hit an `api_key` / `api-key` style denylist entry
//! once normalized (`-` and spaces fold to `_`).

use mas_core::enums::AuditCategory;
use serde_json::{Map, Value, json};

/// Replacement for values that must not be shown at all.
pub const REDACTED: &str = "[REDACTED]";

/// Longest preview kept from a truncated context.
const MAX_PREVIEW_BYTES: usize = 1024;

/// Applies the configured denylists to an event context.
#[derive(Debug, Clone)]
pub struct Masker {
    sensitive: Vec<String>,
    redact: Vec<String>,
}

fn normalize(key: &str) -> String {
    key.to_lowercase().replace(['-', ' '], "_")
}

impl Masker {
    pub fn new(sensitive: &[String], redact: &[String]) -> Self {
        let clean = |fields: &[String]| {
            fields
                .iter()
                .map(|f| normalize(f.trim()))
                .filter(|f| !f.is_empty())
                .collect::<Vec<_>>()
        };
        Self {
            sensitive: clean(sensitive),
            redact: clean(redact),
        }
    }

    #[must_use]
    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = normalize(key);
        self.sensitive.iter().chain(&self.redact).any(|f| key.contains(f.as_str()))
    }

    fn is_redacted(&self, key: &str) -> bool {
        let key = normalize(key);
        self.redact.iter().any(|f| key.contains(f.as_str()))
    }

    /// Mask every sensitive value in `context`, at any depth.
    #[must_use]
    pub fn mask(&self, category: AuditCategory, context: &Value) -> Value {
        match context {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, value) in map {
                    let masked = if self.is_sensitive(key) {
                        let full = self.is_redacted(key) || !category.is_display_safe();
                        mask_sensitive(value, full)
                    } else {
                        self.mask(category, value)
                    };
                    out.insert(key.clone(), masked);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.mask(category, v)).collect()),
            other => other.clone(),
        }
    }
}

/// Mask a value found under a sensitive key, leaf by leaf.
fn mask_sensitive(value: &Value, full: bool) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) if full => {
            if s.is_empty() {
                Value::String(String::new())
            } else {
                Value::String(REDACTED.to_string())
            }
        }
        Value::String(s) => Value::String(mask_string(s)),
        Value::Bool(_) | Value::Number(_) => Value::String(REDACTED.to_string()),
        Value::Array(items) => Value::Array(items.iter().map(|v| mask_sensitive(v, full)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), mask_sensitive(v, full)))
                .collect(),
        ),
    }
}

/// Keep a short head and tail, star the middle.
///
/// Up to 4 characters are fully starred; 5 to 8 keep one character at each
/// end; longer values keep two.
#[must_use]
pub fn mask_string(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let n = chars.len();
    let keep = match n {
        0..=4 => return "*".repeat(n),
        5..=8 => 1,
        _ => 2,
    };
    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[n - keep..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(n - 2 * keep))
}

/// Replace a context whose serialized form exceeds `max_bytes`.
///
/// The replacement records the original size and a char-safe preview.
#[must_use]
pub fn bound_context(context: Value, max_bytes: usize) -> Value {
    let serialized = context.to_string();
    if serialized.len() <= max_bytes {
        return context;
    }
    let budget = (max_bytes / 2).min(MAX_PREVIEW_BYTES);
    let mut end = budget.min(serialized.len());
    while !serialized.is_char_boundary(end) {
        end -= 1;
    }
    json!({
        "_truncated": true,
        "original_bytes": serialized.len(),
        "preview": &serialized[..end],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn masker() -> Masker {
        let sensitive: Vec<String> = ["password", "token", "api_key", "card_number", "ssn"]
            .into_iter()
            .map(String::from)
            .collect();
        let redact = vec!["password".to_string()];
        Masker::new(&sensitive, &redact)
    }

    #[rstest]
    #[case("", "")]
    #[case("abcd", "****")]
    #[case("abcde", "a***e")]
    #[case("abcdefgh", "a******h")]
    #[case("4111111111111111", "41************11")]
    #[case("pässwörter", "pä******er")]
    fn string_masking_lengths(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(mask_string(input), expected);
    }

    #[test]
    fn password_is_never_stored_raw() {
        let masked = masker().mask(AuditCategory::DataModification, &json!({"password": "secret123"}));
        assert_eq!(masked["password"], REDACTED);
    }

    #[test]
    fn nested_and_case_insensitive() {
        let ctx = json!({
            "customer": {"name": "Ada", "API-Key": "sk_live_abcdef123456"},
            "payments": [{"card_number": "4111111111111111", "amount": 12}],
            "Session_Token": 123456,
        });
        let masked = masker().mask(AuditCategory::DataAccess, &ctx);
        assert_eq!(masked["customer"]["name"], "Ada");
        assert_eq!(masked["customer"]["API-Key"], "sk****************56");
        assert_eq!(masked["payments"][0]["card_number"], "41************11");
        assert_eq!(masked["payments"][0]["amount"], 12);
        assert_eq!(masked["Session_Token"], REDACTED);
    }

    #[test]
    fn sensitive_objects_are_masked_leaf_wise() {
        let ctx = json!({"token": {"access": "abcdefghij", "expires": 3600}});
        let masked = masker().mask(AuditCategory::Api, &ctx);
        assert_eq!(masked["token"], json!({"access": "ab******ij", "expires": REDACTED}));
    }

    #[test]
    fn non_display_safe_categories_redact_fully() {
        let ctx = json!({"token": "abcdefghij", "username": "ada"});
        let masked = masker().mask(AuditCategory::Authentication, &ctx);
        assert_eq!(masked["token"], REDACTED);
        assert_eq!(masked["username"], "ada");
    }

    #[test]
    fn raw_values_never_survive() {
        let raw = "sk_live_abcdef123456";
        let ctx = json!({"api_key": raw, "nested": {"x_api_key": raw}, "list": [{"api_key": raw}]});
        for category in AuditCategory::ALL {
            let masked = masker().mask(category, &ctx).to_string();
            assert!(!masked.contains(raw), "{category}: {masked}");
        }
    }

    #[test]
    fn small_context_is_untouched() {
        let ctx = json!({"a": 1});
        assert_eq!(bound_context(ctx.clone(), 100), ctx);
    }

    #[test]
    fn large_context_is_truncated() {
        let ctx = json!({"blob": "é".repeat(500)});
        let bounded = bound_context(ctx.clone(), 101);
        assert_eq!(bounded["_truncated"], true);
        assert_eq!(bounded["original_bytes"], ctx.to_string().len());
        let preview = bounded["preview"].as_str().unwrap();
        assert!(preview.len() <= 50);
        assert!(preview.starts_with("{\"blob\""));
    }
}
