//! Schema - Define type schemas for resources
//!
//! Each resource type the topology emits has a schema, so descriptors can be
//! checked before anything is provisioned.

use std::collections::HashMap;
use std::fmt;

use crate::effect::ReplaceOrder;
use crate::resource::{Resource, Value};

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            // ResourceRef values resolve to strings at runtime, so they're valid for String types
            (
                AttributeType::String,
                Value::String(_) | Value::Secret(_) | Value::ResourceRef(_, _),
            ) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            // Only the base type can be checked before the reference resolves
            (AttributeType::Custom { base, .. }, Value::ResourceRef(_, _)) => base.validate(value),
            (AttributeType::Custom { validate, .. }, v) => {
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
            Value::ResourceRef(binding, attr) => format!("ResourceRef({}.{})", binding, attr),
            Value::Secret(_) => "Secret".to_string(),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    pub description: Option<String>,
    /// Provider-side property name (e.g., "VpcId" for AWS Cloud Control)
    pub provider_name: Option<String>,
    /// Changing this attribute replaces the resource
    pub create_only: bool,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            description: None,
            provider_name: None,
            create_only: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    pub fn create_only(mut self) -> Self {
        self.create_only = true;
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
    /// Attributes the provider reports back after creation (e.g., "arn")
    pub outputs: Vec<String>,
    /// Every attribute is create-only; each change is a new revision
    pub immutable: bool,
    pub replace_order: ReplaceOrder,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
            outputs: Vec::new(),
            immutable: false,
            replace_order: ReplaceOrder::DeleteFirst,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    /// Replace on any change, creating the successor before retiring the old one
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self.replace_order = ReplaceOrder::CreateFirst;
        self
    }

    /// Whether changing `attribute` forces a replacement
    pub fn forces_replacement(&self, attribute: &str) -> bool {
        self.immutable
            || self
                .attributes
                .get(attribute)
                .is_some_and(|a| a.create_only)
    }

    /// Validate resource attributes.
    ///
    /// Unlike a loose schema, unknown attributes are rejected: every
    /// attribute a descriptor carries is sent to the provider.
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        let mut required: Vec<&String> = self
            .attributes
            .iter()
            .filter(|(name, schema)| schema.required && !attributes.contains_key(*name))
            .map(|(name, _)| name)
            .collect();
        required.sort();
        for name in required {
            errors.push(TypeError::MissingRequired { name: name.clone() });
        }

        let mut names: Vec<&String> = attributes.keys().collect();
        names.sort();
        for name in names {
            match self.attributes.get(name) {
                Some(schema) => {
                    if let Err(e) = schema.attr_type.validate(&attributes[name]) {
                        errors.push(TypeError::AttributeError {
                            name: name.clone(),
                            inner: Box::new(e),
                        });
                    }
                }
                None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Provider-side name of an attribute, if the schema declares one
    pub fn provider_name(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|a| a.provider_name.as_deref())
    }
}

/// Validate every resource against its type's schema.
///
/// Returns one message per problem, prefixed with the resource id.
pub fn validate_resources(
    resources: &[Resource],
    schemas: &HashMap<String, ResourceSchema>,
) -> Result<(), Vec<String>> {
    let mut messages = Vec::new();
    for resource in resources {
        match schemas.get(&resource.id.resource_type) {
            Some(schema) => {
                if let Err(errors) = schema.validate(&resource.attributes) {
                    messages.extend(errors.iter().map(|e| format!("{}: {}", resource.id, e)));
                }
            }
            None => messages.push(format!(
                "{}: unknown resource type '{}'",
                resource.id, resource.id.resource_type
            )),
        }
    }

    if messages.is_empty() {
        Ok(())
    } else {
        Err(messages)
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| {
                if let Value::Int(n) = value {
                    if *n > 0 {
                        Ok(())
                    } else {
                        Err("Value must be positive".to_string())
                    }
                } else {
                    Err("Expected integer".to_string())
                }
            },
        }
    }

    /// Port number type (1-65535)
    pub fn port_number() -> AttributeType {
        AttributeType::Custom {
            name: "PortNumber".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| {
                if let Value::Int(n) = value {
                    if (1..=65535).contains(n) {
                        Ok(())
                    } else {
                        Err("Port number must be between 1 and 65535".to_string())
                    }
                } else {
                    Err("Expected integer".to_string())
                }
            },
        }
    }

    /// CIDR block type (e.g., "10.0.0.0/16")
    pub fn cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| {
                if let Value::String(s) = value {
                    validate_cidr(s)
                } else {
                    Err("Expected string".to_string())
                }
            },
        }
    }

    /// Load balancer and target group names: at most 32 characters of
    /// alphanumerics and hyphens, not starting or ending with a hyphen
    pub fn elb_name() -> AttributeType {
        AttributeType::Custom {
            name: "ElbName".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| {
                if let Value::String(s) = value {
                    validate_elb_name(s)
                } else {
                    Err("Expected string".to_string())
                }
            },
        }
    }

    /// ARN string (e.g., "arn:aws:acm:...")
    pub fn arn() -> AttributeType {
        AttributeType::Custom {
            name: "Arn".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) if s.starts_with("arn:") => Ok(()),
                Value::String(s) => Err(format!("'{}' is not an ARN", s)),
                _ => Err("Expected string".to_string()),
            },
        }
    }
}

/// Validate CIDR block format (e.g., "10.0.0.0/16")
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    let Some((ip, prefix)) = cidr.split_once('/') else {
        return Err(format!(
            "Invalid CIDR format '{}': expected IP/prefix",
            cidr
        ));
    };

    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() != 4 || octets.iter().any(|o| o.parse::<u8>().is_err()) {
        return Err(format!("Invalid IP address '{}' in CIDR '{}'", ip, cidr));
    }

    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok(()),
        _ => Err(format!(
            "Invalid prefix length '{}' in CIDR '{}': expected 0-32",
            prefix, cidr
        )),
    }
}

/// Maximum length AWS accepts for load balancer and target group names
pub const ELB_NAME_MAX_LEN: usize = 32;

/// Validate a load balancer or target group name
pub fn validate_elb_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > ELB_NAME_MAX_LEN {
        return Err(format!(
            "'{}' must be between 1 and {} characters",
            name, ELB_NAME_MAX_LEN
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(format!("'{}' must not begin or end with a hyphen", name));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!(
            "'{}' may only contain alphanumerics and hyphens",
            name
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("elbv2.target_group")
            .attribute(AttributeSchema::new("name", types::elb_name()).required())
            .attribute(AttributeSchema::new("port", types::port_number()))
            .attribute(AttributeSchema::new("vpc_id", AttributeType::String))
            .attribute(AttributeSchema::new("health_check_enabled", AttributeType::Bool));

        let attrs = HashMap::from([
            ("name".to_string(), Value::from("slsd-cli-tg-dev")),
            ("port".to_string(), Value::Int(5555)),
            ("vpc_id".to_string(), Value::reference("vpc", "id")),
            ("health_check_enabled".to_string(), Value::Bool(true)),
        ]);

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_and_unknown_attributes() {
        let schema = ResourceSchema::new("ecs.cluster")
            .attribute(AttributeSchema::new("cluster_name", AttributeType::String).required());

        let attrs = HashMap::from([("color".to_string(), Value::from("blue"))]);
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(
            errors,
            vec![
                TypeError::MissingRequired {
                    name: "cluster_name".to_string()
                },
                TypeError::UnknownAttribute {
                    name: "color".to_string()
                },
            ]
        );
    }

    #[test]
    fn secrets_and_refs_count_as_strings() {
        assert!(
            AttributeType::String
                .validate(&Value::Secret("k".to_string()))
                .is_ok()
        );
        assert!(
            types::arn()
                .validate(&Value::reference("task_role", "arn"))
                .is_ok()
        );
        assert!(
            types::port_number()
                .validate(&Value::reference("x", "port"))
                .is_err()
        );
    }

    #[test]
    fn enum_rejects_unlisted_value() {
        let scheme = AttributeType::Enum(vec!["internal".to_string(), "internet-facing".to_string()]);
        assert!(scheme.validate(&Value::from("internal")).is_ok());
        let err = scheme.validate(&Value::from("public")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid enum variant 'public', expected one of: internal, internet-facing"
        );
    }

    #[test]
    fn validate_cidr_type() {
        let t = types::cidr();

        assert!(t.validate(&Value::from("0.0.0.0/0")).is_ok());
        assert!(t.validate(&Value::from("10.0.0.0/16")).is_ok());

        assert!(t.validate(&Value::from("10.0.0.0")).is_err()); // no prefix
        assert!(t.validate(&Value::from("10.0.0.0/33")).is_err()); // prefix too large
        assert!(t.validate(&Value::from("10.0.0.256/16")).is_err()); // octet > 255
        assert!(t.validate(&Value::Int(42)).is_err()); // wrong type
    }

    #[test]
    fn elb_name_rules() {
        assert!(validate_elb_name("slsd-int-elb-dev").is_ok());
        assert!(validate_elb_name(&"a".repeat(32)).is_ok());
        assert!(validate_elb_name(&"a".repeat(33)).is_err());
        assert!(validate_elb_name("-slsd").is_err());
        assert!(validate_elb_name("slsd_elb").is_err());
    }

    #[test]
    fn validate_resources_reports_unknown_types() {
        let schemas = HashMap::new();
        let resources = vec![Resource::new("s3.bucket", "b")];
        let messages = validate_resources(&resources, &schemas).unwrap_err();
        assert_eq!(messages, vec!["s3.bucket.b: unknown resource type 's3.bucket'"]);
    }
}
