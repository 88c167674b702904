//! State file structures for persisting provisioned resources

use std::collections::HashMap;

use brokerstack_core::resource::{Resource, ResourceId, State, Value};
use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, BackendResult};

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage
    pub lineage: String,
    /// Version of brokerstack that last modified this state
    pub brokerstack_version: String,
    /// Naming pattern of the stack this state belongs to (e.g. "slsd-*-dev")
    #[serde(default)]
    pub stack: String,
    /// Managed resources in the order they were provisioned
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    /// Current state file format version
    pub const CURRENT_VERSION: u32 = 1;

    /// Create a new empty state file for `stack`
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            brokerstack_version: env!("CARGO_PKG_VERSION").to_string(),
            stack: stack.into(),
            resources: Vec::new(),
        }
    }

    /// Increment serial and update the tool version for a new state write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.brokerstack_version = env!("CARGO_PKG_VERSION").to_string();
    }

    /// Refuse to act on state recorded for a different prefix/stage
    pub fn check_stack(&self, stack: &str) -> BackendResult<()> {
        if self.stack.is_empty() || self.stack == stack {
            Ok(())
        } else {
            Err(BackendError::StackMismatch {
                expected: stack.to_string(),
                actual: self.stack.clone(),
            })
        }
    }

    /// Find a resource by type and name
    pub fn find_resource(&self, resource_type: &str, name: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    pub fn find_by_binding(&self, binding: &str) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.binding == binding)
    }

    fn find_resource_mut(&mut self, resource_type: &str, name: &str) -> Option<&mut ResourceState> {
        self.resources
            .iter_mut()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Add or update a resource; new resources go to the end
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        if let Some(existing) = self.find_resource_mut(&resource.resource_type, &resource.name) {
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
    }

    /// Remove a resource from the state
    pub fn remove_resource(&mut self, resource_type: &str, name: &str) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == resource_type && r.name == name)?;
        Some(self.resources.remove(pos))
    }

    /// Recorded states keyed by resource id, for diffing
    pub fn current_states(&self) -> HashMap<ResourceId, State> {
        self.resources
            .iter()
            .map(|r| (r.id(), r.to_state()))
            .collect()
    }

    /// Managed (non data source) resources, most recently provisioned first
    pub fn teardown_order(&self) -> Vec<&ResourceState> {
        self.resources
            .iter()
            .rev()
            .filter(|r| !r.data_source)
            .collect()
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new("")
    }
}

/// State of a single provisioned resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "elbv2.listener")
    pub resource_type: String,
    /// Physical name (e.g., "slsd-in-elb-clt-lnr-dev")
    pub name: String,
    /// Logical name other resources reference it by
    pub binding: String,
    #[serde(default)]
    pub stage: Option<String>,
    /// Provider identifier; absent only for records that never finished creating
    pub identifier: Option<String>,
    /// Applied attributes merged with live attributes, as JSON values
    pub attributes: HashMap<String, serde_json::Value>,
    /// Looked up rather than created; never deleted
    #[serde(default)]
    pub data_source: bool,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        binding: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            binding: binding.into(),
            stage: None,
            identifier: None,
            attributes: HashMap::new(),
            data_source: false,
        }
    }

    /// Record a resource as applied: resolved descriptor attributes overlaid with live ones
    pub fn from_applied(resource: &Resource, state: &State) -> Self {
        let mut attributes: HashMap<String, serde_json::Value> = resource
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), value_to_json(v)))
            .collect();
        for (k, v) in &state.attributes {
            attributes.insert(k.clone(), value_to_json(v));
        }

        Self {
            resource_type: resource.id.resource_type.clone(),
            name: resource.id.name.clone(),
            binding: resource.binding.clone(),
            stage: resource.stage.clone(),
            identifier: state.identifier.clone(),
            attributes,
            data_source: resource.is_data_source(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    /// Attributes converted back to values
    pub fn values(&self) -> HashMap<String, Value> {
        self.attributes
            .iter()
            .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
            .collect()
    }

    pub fn to_state(&self) -> State {
        let state = State::existing(self.id(), self.values());
        match &self.identifier {
            Some(identifier) => state.with_identifier(identifier),
            None => state,
        }
    }
}

/// Convert a value to JSON for persistence.
///
/// Secrets are stored in clear, the same as every other attribute the
/// provider received. Unresolved references are kept as `${binding.attr}`.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) | Value::Secret(s) => serde_json::Value::String(s.clone()),
        Value::Int(n) => serde_json::Value::from(*n),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
        Value::ResourceRef(binding, attr) => {
            serde_json::Value::String(format!("${{{}.{}}}", binding, attr))
        }
    }
}

/// Convert persisted JSON back to a value; nulls and floats are dropped
pub fn json_to_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => n.as_i64().map(Value::Int),
        serde_json::Value::Array(items) => {
            Some(Value::List(items.iter().filter_map(json_to_value).collect()))
        }
        serde_json::Value::Object(map) => Some(Value::Map(
            map.iter()
                .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        serde_json::Value::Null => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_file_new() {
        let state = StateFile::new("slsd-*-dev");
        assert_eq!(state.version, StateFile::CURRENT_VERSION);
        assert_eq!(state.serial, 0);
        assert!(!state.lineage.is_empty());
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_state_file_increment_serial() {
        let mut state = StateFile::default();
        state.increment_serial();
        state.increment_serial();
        assert_eq!(state.serial, 2);
    }

    #[test]
    fn test_upsert_keeps_position() {
        let mut state = StateFile::default();
        state.upsert_resource(ResourceState::new("iam.role", "slsd-task-role-dev", "task_role"));
        state.upsert_resource(ResourceState::new("ecs.cluster", "slsd-ecs-cluster-dev", "cluster"));
        state.upsert_resource(
            ResourceState::new("iam.role", "slsd-task-role-dev", "task_role")
                .with_identifier("slsd-task-role-dev"),
        );

        assert_eq!(state.resources.len(), 2);
        assert_eq!(state.resources[0].binding, "task_role");
        assert_eq!(
            state.resources[0].identifier.as_deref(),
            Some("slsd-task-role-dev")
        );
    }

    #[test]
    fn test_remove_resource() {
        let mut state = StateFile::default();
        state.upsert_resource(ResourceState::new("ecs.cluster", "c", "cluster"));
        assert!(state.remove_resource("ecs.cluster", "c").is_some());
        assert!(state.remove_resource("ecs.cluster", "c").is_none());
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_teardown_order_is_reverse_and_skips_lookups() {
        let mut state = StateFile::default();
        let mut vpc = ResourceState::new("ec2.vpc", "default", "vpc");
        vpc.data_source = true;
        state.upsert_resource(vpc);
        state.upsert_resource(ResourceState::new("ec2.security_group", "sg", "edge_sg"));
        state.upsert_resource(ResourceState::new("elbv2.load_balancer", "lb", "external_lb"));

        let order: Vec<_> = state
            .teardown_order()
            .iter()
            .map(|r| r.binding.as_str())
            .collect();
        assert_eq!(order, vec!["external_lb", "edge_sg"]);
    }

    #[test]
    fn test_stack_mismatch() {
        let state = StateFile::new("slsd-*-dev");
        assert!(state.check_stack("slsd-*-dev").is_ok());
        let err = state.check_stack("acme-*-prod").unwrap_err();
        assert_eq!(
            err.to_string(),
            "State belongs to stack slsd-*-dev, not acme-*-prod"
        );
    }

    #[test]
    fn test_from_applied_overlays_live_attributes() {
        let resource = Resource::new("elbv2.load_balancer", "slsd-ex-elb-dev")
            .with_binding("external_lb")
            .with_stage("external-elb")
            .with_attribute("scheme", "internet-facing")
            .with_attribute("subnets", vec!["subnet-a"]);
        let live = State::existing(
            resource.id.clone(),
            HashMap::from([("dns_name".to_string(), Value::from("lb.example"))]),
        )
        .with_identifier("arn:lb");

        let recorded = ResourceState::from_applied(&resource, &live);
        assert_eq!(recorded.binding, "external_lb");
        assert_eq!(recorded.stage.as_deref(), Some("external-elb"));
        assert_eq!(recorded.attributes["subnets"], json!(["subnet-a"]));
        assert_eq!(recorded.attributes["dns_name"], json!("lb.example"));

        let state = recorded.to_state();
        assert!(state.exists);
        assert_eq!(state.identifier.as_deref(), Some("arn:lb"));
        assert_eq!(state.attributes["scheme"], Value::from("internet-facing"));
    }

    #[test]
    fn test_secret_is_persisted_as_plain_string() {
        let value = Value::Map(HashMap::from([(
            "THUNDRA_LICENSE_KEY".to_string(),
            Value::Secret("k".to_string()),
        )]));
        let persisted = value_to_json(&value);
        assert_eq!(persisted, json!({"THUNDRA_LICENSE_KEY": "k"}));
        assert!(json_to_value(&persisted).unwrap().same_as(&value));
    }

    #[test]
    fn test_state_file_serialization() {
        let mut state = StateFile::new("slsd-*-dev");
        state.upsert_resource(
            ResourceState::new("ecs.cluster", "slsd-ecs-cluster-dev", "cluster")
                .with_identifier("slsd-ecs-cluster-dev")
                .with_attribute("arn", json!("arn:aws:ecs:cluster")),
        );

        let text = serde_json::to_string_pretty(&state).unwrap();
        let deserialized: StateFile = serde_json::from_str(&text).unwrap();

        assert_eq!(deserialized.lineage, state.lineage);
        assert_eq!(deserialized.stack, "slsd-*-dev");
        assert_eq!(
            deserialized.find_by_binding("cluster").unwrap().attributes["arn"],
            json!("arn:aws:ecs:cluster")
        );
    }
}
