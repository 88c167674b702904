//! Resource - Representing resource descriptors and their live state

use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// Resource type (e.g., "elbv2.load_balancer", "ecs.service")
    pub resource_type: String,
    /// Physical resource name (e.g., "slsd-ext-elb-dev")
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    /// Reference to another resource's attribute (binding_name, attribute_name)
    ResourceRef(String, String),
    /// String that must never be printed (license keys and the like)
    Secret(String),
}

impl Value {
    /// Reference to `attribute` of the resource bound as `binding`
    pub fn reference(binding: impl Into<String>, attribute: impl Into<String>) -> Self {
        Value::ResourceRef(binding.into(), attribute.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Secret(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// True when no `ResourceRef` remains anywhere inside this value
    pub fn is_resolved(&self) -> bool {
        match self {
            Value::ResourceRef(_, _) => false,
            Value::List(items) => items.iter().all(Value::is_resolved),
            Value::Map(map) => map.values().all(Value::is_resolved),
            _ => true,
        }
    }

    /// Collect every (binding, attribute) pair referenced by this value
    pub fn collect_refs(&self, refs: &mut Vec<(String, String)>) {
        match self {
            Value::ResourceRef(binding, attr) => refs.push((binding.clone(), attr.clone())),
            Value::List(items) => items.iter().for_each(|v| v.collect_refs(refs)),
            Value::Map(map) => map.values().for_each(|v| v.collect_refs(refs)),
            _ => {}
        }
    }

    /// Equality that ignores the secret marker.
    ///
    /// Persisted state has no notion of secrets, so a `Secret` compares equal
    /// to a plain string with the same content.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Secret(a) | Value::String(a), Value::Secret(b) | Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other| v.same_as(other)))
            }
            _ => self == other,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// Desired state of a single resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    /// Logical name other resources use to reference this one
    pub binding: String,
    pub attributes: HashMap<String, Value>,
    /// Bindings that must exist before this resource, beyond those it references
    pub depends_on: Vec<String>,
    /// Stage (group of resources) this resource was emitted by
    pub stage: Option<String>,
    /// If true, this is a data source (read-only lookup) that won't be modified
    pub read_only: bool,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        let id = ResourceId::new(resource_type, name);
        Self {
            binding: id.name.clone(),
            id,
            attributes: HashMap::new(),
            depends_on: Vec::new(),
            stage: None,
            read_only: false,
        }
    }

    pub fn with_binding(mut self, binding: impl Into<String>) -> Self {
        self.binding = binding.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Declare an ordering edge on `binding` that no attribute expresses
    pub fn depends_on(mut self, binding: impl Into<String>) -> Self {
        let binding = binding.into();
        if !self.depends_on.contains(&binding) {
            self.depends_on.push(binding);
        }
        self
    }

    /// Returns true if this resource is a data source (read-only)
    pub fn is_data_source(&self) -> bool {
        self.read_only
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Every (binding, attribute) pair referenced from this resource's attributes
    pub fn references(&self) -> Vec<(String, String)> {
        let mut refs = Vec::new();
        for value in self.attributes.values() {
            value.collect_refs(&mut refs);
        }
        refs
    }

    /// Bindings this resource must be ordered after: referenced and explicit
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.references()
            .into_iter()
            .map(|(binding, _)| binding)
            .chain(self.depends_on.iter().cloned())
            .filter(|binding| binding != &self.binding)
            .collect()
    }
}

/// Current state fetched from actual infrastructure
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Provider identifier (e.g., sg-xxx, a load balancer ARN)
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_include_refs_and_explicit_edges() {
        let resource = Resource::new("ecs.service", "svc")
            .with_binding("service")
            .with_attribute("cluster", Value::reference("cluster", "arn"))
            .with_attribute(
                "load_balancers",
                Value::List(vec![Value::Map(HashMap::from([(
                    "target_group_arn".to_string(),
                    Value::reference("client_tg", "arn"),
                )]))]),
            )
            .depends_on("client_listener")
            .depends_on("client_listener");

        let deps: Vec<_> = resource.dependencies().into_iter().collect();
        assert_eq!(deps, vec!["client_listener", "client_tg", "cluster"]);
        assert_eq!(resource.depends_on.len(), 1);
    }

    #[test]
    fn secret_compares_equal_to_plain_string() {
        let secret = Value::Secret("abc".to_string());
        assert!(secret.same_as(&Value::String("abc".to_string())));
        assert!(!secret.same_as(&Value::String("abd".to_string())));
        assert_ne!(secret, Value::String("abc".to_string()));
    }

    #[test]
    fn resolved_check_walks_nested_values() {
        let value = Value::List(vec![Value::from("a"), Value::reference("x", "id")]);
        assert!(!value.is_resolved());
        assert!(Value::from(vec!["a", "b"]).is_resolved());
    }

    #[test]
    fn resource_id_display() {
        let id = ResourceId::new("ec2.security_group", "slsd-svc-sg-dev");
        assert_eq!(id.to_string(), "ec2.security_group.slsd-svc-sg-dev");
    }
}
