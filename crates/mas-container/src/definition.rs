//! Service definitions and registration options.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::container::Resolver;
use crate::error::ContainerError;

/// A resolved, type-erased service instance.
pub type Service = Arc<dyn Any + Send + Sync>;

/// Builds a service, resolving its dependencies through the [`Resolver`].
pub type FactoryFn = dyn Fn(&mut Resolver<'_>) -> Result<Service, ContainerError> + Send + Sync;

/// Wraps an already-built service.
pub type DecoratorFn =
    dyn Fn(Service, &mut Resolver<'_>) -> Result<Service, ContainerError> + Send + Sync;

/// Builds a service of a registered class from its JSON arguments.
pub type ConstructorFn =
    dyn Fn(&[Value], &mut Resolver<'_>) -> Result<Service, ContainerError> + Send + Sync;

/// How a service is produced.
#[derive(Clone)]
pub enum Definition {
    /// A closure invoked on resolution.
    Factory(Arc<FactoryFn>),
    /// A ready-made instance, returned as-is.
    Instance(Service),
    /// A registered class name plus constructor arguments.
    Class { class: String, arguments: Vec<Value> },
}

impl Definition {
    /// Factory returning an owned value; the container wraps it in an `Arc`.
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut Resolver<'_>) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        Self::Factory(erase(move |resolver| {
            factory(resolver).map(|value| Arc::new(value) as Service)
        }))
    }

    /// Factory returning an already shared value.
    pub fn shared_factory<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut Resolver<'_>) -> Result<Arc<T>, ContainerError> + Send + Sync + 'static,
    {
        Self::Factory(erase(move |resolver| {
            factory(resolver).map(|value| value as Service)
        }))
    }

    pub fn instance<T: Any + Send + Sync>(value: T) -> Self {
        Self::Instance(Arc::new(value))
    }

    pub fn shared<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self::Instance(value)
    }

    pub fn class(class: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self::Class {
            class: class.into(),
            arguments,
        }
    }

    /// Parse a definition written as data (configuration files).
    ///
    /// Accepted shapes: `"ClassName"` or `{"class": "ClassName", "arguments": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::InvalidDefinition` for any other shape.
    pub fn from_value(id: &str, value: &Value) -> Result<Self, ContainerError> {
        let invalid = |reason: &str| ContainerError::InvalidDefinition {
            id: id.to_string(),
            reason: reason.to_string(),
        };
        match value {
            Value::String(class) => Ok(Self::class(class.clone(), Vec::new())),
            Value::Object(map) => {
                let class = map
                    .get("class")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("object definitions require a string 'class' key"))?;
                let arguments = match map.get("arguments") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items.clone(),
                    Some(_) => return Err(invalid("'arguments' must be an array")),
                };
                if let Some(extra) = map.keys().find(|k| *k != "class" && *k != "arguments") {
                    return Err(invalid(&format!("unexpected key '{extra}'")));
                }
                Ok(Self::class(class, arguments))
            }
            _ => Err(invalid(
                "expected a factory, an instance, a class name or {class, arguments}",
            )),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Factory(_) => "factory",
            Self::Instance(_) => "instance",
            Self::Class { .. } => "class",
        }
    }
}

/// Pins the closure signature so it is generic over the resolver lifetime.
fn erase<F>(factory: F) -> Arc<FactoryFn>
where
    F: Fn(&mut Resolver<'_>) -> Result<Service, ContainerError> + Send + Sync + 'static,
{
    Arc::new(factory)
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Factory(_) => f.write_str("Definition::Factory(..)"),
            Self::Instance(_) => f.write_str("Definition::Instance(..)"),
            Self::Class { class, arguments } => f
                .debug_struct("Definition::Class")
                .field("class", class)
                .field("arguments", arguments)
                .finish(),
        }
    }
}

/// Registration options for [`crate::ServiceContainer::set`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub singleton: bool,
    pub tags: BTreeSet<String>,
    pub metadata: Map<String, Value>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self::singleton()
    }
}

impl ServiceOptions {
    /// Cache the first resolved instance for the container's lifetime.
    #[must_use]
    pub fn singleton() -> Self {
        Self {
            singleton: true,
            tags: BTreeSet::new(),
            metadata: Map::new(),
        }
    }

    /// Build a fresh instance on every resolution.
    #[must_use]
    pub fn transient() -> Self {
        Self {
            singleton: false,
            ..Self::singleton()
        }
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_is_a_class_reference() {
        let def = Definition::from_value("mailer", &json!("SmtpMailer")).unwrap();
        assert!(matches!(def, Definition::Class { ref class, ref arguments } if class == "SmtpMailer" && arguments.is_empty()));
    }

    #[test]
    fn object_with_class_and_arguments() {
        let def =
            Definition::from_value("mailer", &json!({"class": "SmtpMailer", "arguments": ["localhost", 25]}))
                .unwrap();
        match def {
            Definition::Class { class, arguments } => {
                assert_eq!(class, "SmtpMailer");
                assert_eq!(arguments, vec![json!("localhost"), json!(25)]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_shapes_fail_validation() {
        for bad in [
            json!(42),
            json!(null),
            json!(["SmtpMailer"]),
            json!({"arguments": []}),
            json!({"class": "X", "arguments": "nope"}),
            json!({"class": "X", "factory": true}),
        ] {
            assert!(
                matches!(
                    Definition::from_value("svc", &bad),
                    Err(ContainerError::InvalidDefinition { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn options_builders() {
        let opts = ServiceOptions::transient().tag("mas.core").meta("owner", "audit");
        assert!(!opts.singleton);
        assert!(opts.tags.contains("mas.core"));
        assert_eq!(opts.metadata["owner"], json!("audit"));
        assert!(ServiceOptions::default().singleton);
    }
}
