//! Translation between descriptor attributes and CloudFormation properties
//!
//! Attributes whose schema declares a `provider_name` map 1:1. Everything
//! else (ingress rules, trust policies, container definitions, service
//! networking) is shaped here per resource type.

use std::collections::{BTreeMap, HashMap};

use brokerstack_core::provider::ProviderError;
use brokerstack_core::providers::aws;
use brokerstack_core::resource::{Resource, State, Value};
use brokerstack_core::schema::ResourceSchema;
use serde::Serialize;
use serde_json::{Map, json};

use crate::resources::ResourceConfig;

const ANY_IPV4: &str = "0.0.0.0/0";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PropertyError {
    #[error("unresolved reference to {0}.{1}")]
    UnresolvedReference(String, String),

    #[error("attribute '{attribute}' {reason}")]
    Malformed { attribute: String, reason: String },

    #[error("no schema for resource type '{0}'")]
    UnknownType(String),
}

impl From<PropertyError> for ProviderError {
    fn from(err: PropertyError) -> Self {
        ProviderError::new(err.to_string()).with_cause(err)
    }
}

fn malformed(attribute: &str, reason: &str) -> PropertyError {
    PropertyError::Malformed {
        attribute: attribute.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyDocument<'a> {
    version: &'static str,
    statement: Vec<PolicyStatement<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyStatement<'a> {
    effect: &'static str,
    principal: ServicePrincipal<'a>,
    action: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ServicePrincipal<'a> {
    service: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerDefinition<'a> {
    name: &'a str,
    image: &'a str,
    essential: bool,
    port_mappings: Vec<PortMapping>,
    environment: Vec<EnvironmentVariable<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PortMapping {
    container_port: i64,
    protocol: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EnvironmentVariable<'a> {
    name: &'a str,
    value: &'a str,
}

/// Convert a resolved attribute value to JSON
pub fn value_to_json(value: &Value) -> Result<serde_json::Value, PropertyError> {
    match value {
        Value::String(s) | Value::Secret(s) => Ok(json!(s)),
        Value::Int(i) => Ok(json!(i)),
        Value::Bool(b) => Ok(json!(b)),
        Value::List(items) => items
            .iter()
            .map(value_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array),
        Value::Map(map) => {
            let mut object = Map::new();
            for (k, v) in map {
                object.insert(k.clone(), value_to_json(v)?);
            }
            Ok(serde_json::Value::Object(object))
        }
        Value::ResourceRef(binding, attr) => Err(PropertyError::UnresolvedReference(
            binding.clone(),
            attr.clone(),
        )),
    }
}

/// Convert JSON returned by the provider into a Value
pub fn json_to_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Value::Int),
        serde_json::Value::Array(arr) => {
            Some(Value::List(arr.iter().filter_map(json_to_value).collect()))
        }
        serde_json::Value::Object(obj) => Some(Value::Map(
            obj.iter()
                .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        serde_json::Value::Null => None,
    }
}

fn string_attr<'a>(resource: &'a Resource, name: &str) -> Result<Option<&'a str>, PropertyError> {
    match resource.attributes.get(name) {
        None => Ok(None),
        Some(Value::ResourceRef(binding, attr)) => Err(PropertyError::UnresolvedReference(
            binding.clone(),
            attr.clone(),
        )),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| malformed(name, "must be a string")),
    }
}

fn int_attr(resource: &Resource, name: &str) -> Result<Option<i64>, PropertyError> {
    match resource.attributes.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_int()
            .map(Some)
            .ok_or_else(|| malformed(name, "must be an integer")),
    }
}

fn list_attr<'a>(resource: &'a Resource, name: &str) -> Result<&'a [Value], PropertyError> {
    match resource.attributes.get(name) {
        None => Ok(Default::default()),
        Some(value) => value
            .as_list()
            .ok_or_else(|| malformed(name, "must be a list")),
    }
}

/// Build the tags array in CloudFormation format, sorted by key
pub fn build_tags(tags: Option<&Value>) -> Vec<serde_json::Value> {
    let Some(Value::Map(tags)) = tags else {
        return Vec::new();
    };
    let sorted: BTreeMap<&String, &Value> = tags.iter().collect();
    sorted
        .into_iter()
        .filter_map(|(key, value)| value.as_str().map(|v| json!({"Key": key, "Value": v})))
        .collect()
}

/// Parse tags from CloudFormation format to a map
pub fn parse_tags(tags: &[serde_json::Value]) -> HashMap<String, Value> {
    tags.iter()
        .filter_map(|tag| {
            let key = tag.get("Key")?.as_str()?;
            let value = tag.get("Value")?.as_str()?;
            Some((key.to_string(), Value::String(value.to_string())))
        })
        .collect()
}

fn ingress_rules(resource: &Resource) -> Result<Vec<serde_json::Value>, PropertyError> {
    let mut rules = Vec::new();
    for rule in list_attr(resource, "ingress")? {
        let rule = rule
            .as_map()
            .ok_or_else(|| malformed("ingress", "must hold maps"))?;
        let mut out = Map::new();
        for (key, property) in [
            ("ip_protocol", "IpProtocol"),
            ("from_port", "FromPort"),
            ("to_port", "ToPort"),
            ("cidr_ip", "CidrIp"),
            ("source_security_group_id", "SourceSecurityGroupId"),
            ("description", "Description"),
        ] {
            if let Some(value) = rule.get(key) {
                out.insert(property.to_string(), value_to_json(value)?);
            }
        }
        rules.push(serde_json::Value::Object(out));
    }
    Ok(rules)
}

fn assume_role_policy(service: &str) -> serde_json::Value {
    let document = PolicyDocument {
        version: "2012-10-17",
        statement: vec![PolicyStatement {
            effect: "Allow",
            principal: ServicePrincipal { service },
            action: "sts:AssumeRole",
        }],
    };
    serde_json::to_value(document).unwrap_or_default()
}

fn container_definitions(resource: &Resource) -> Result<serde_json::Value, PropertyError> {
    let name = string_attr(resource, "container_name")?
        .ok_or_else(|| malformed("container_name", "is required"))?;
    let image =
        string_attr(resource, "image")?.ok_or_else(|| malformed("image", "is required"))?;

    let port_mappings = list_attr(resource, "container_ports")?
        .iter()
        .map(|port| {
            port.as_int()
                .map(|container_port| PortMapping {
                    container_port,
                    protocol: "tcp",
                })
                .ok_or_else(|| malformed("container_ports", "must hold integers"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut environment = Vec::new();
    if let Some(Value::Map(vars)) = resource.attributes.get("environment") {
        let sorted: BTreeMap<&String, &Value> = vars.iter().collect();
        for (name, value) in sorted {
            let value = value
                .as_str()
                .ok_or_else(|| malformed("environment", "must hold strings"))?;
            environment.push(EnvironmentVariable { name, value });
        }
    }

    let definition = ContainerDefinition {
        name,
        image,
        essential: true,
        port_mappings,
        environment,
    };
    serde_json::to_value(vec![definition])
        .map_err(|e| malformed("container_name", &e.to_string()))
}

fn service_load_balancers(resource: &Resource) -> Result<Vec<serde_json::Value>, PropertyError> {
    list_attr(resource, "load_balancers")?
        .iter()
        .map(|binding| {
            let binding = binding
                .as_map()
                .ok_or_else(|| malformed("load_balancers", "must hold maps"))?;
            let field = |key: &str| {
                binding
                    .get(key)
                    .ok_or_else(|| malformed("load_balancers", &format!("missing '{}'", key)))
                    .and_then(value_to_json)
            };
            Ok(json!({
                "ContainerName": field("container_name")?,
                "ContainerPort": field("container_port")?,
                "TargetGroupArn": field("target_group_arn")?,
            }))
        })
        .collect()
}

/// Properties that need reshaping beyond a 1:1 rename
fn special_properties(
    resource: &Resource,
    desired: &mut Map<String, serde_json::Value>,
) -> Result<(), PropertyError> {
    match resource.id.resource_type.as_str() {
        aws::SECURITY_GROUP => {
            desired.insert(
                "SecurityGroupIngress".to_string(),
                json!(ingress_rules(resource)?),
            );
            if resource.attributes.get("allow_all_outbound") == Some(&Value::Bool(true)) {
                desired.insert(
                    "SecurityGroupEgress".to_string(),
                    json!([{"IpProtocol": "-1", "CidrIp": ANY_IPV4}]),
                );
            }
        }
        aws::IAM_ROLE => {
            let service = string_attr(resource, "assumed_by")?
                .ok_or_else(|| malformed("assumed_by", "is required"))?;
            desired.insert(
                "AssumeRolePolicyDocument".to_string(),
                assume_role_policy(service),
            );
        }
        aws::TARGET_GROUP => {
            // CloudFormation types the health check port as a string
            if let Some(port) = int_attr(resource, "health_check_port")? {
                desired.insert("HealthCheckPort".to_string(), json!(port.to_string()));
            }
        }
        aws::LISTENER => {
            let target_group = string_attr(resource, "default_target_group_arn")?
                .ok_or_else(|| malformed("default_target_group_arn", "is required"))?;
            desired.insert(
                "DefaultActions".to_string(),
                json!([{"Type": "forward", "TargetGroupArn": target_group}]),
            );
            let certificates: Vec<_> = list_attr(resource, "certificate_arns")?
                .iter()
                .filter_map(Value::as_str)
                .map(|arn| json!({"CertificateArn": arn}))
                .collect();
            if !certificates.is_empty() {
                desired.insert("Certificates".to_string(), json!(certificates));
            }
        }
        aws::TASK_DEFINITION => {
            for (attr, property) in [("cpu", "Cpu"), ("memory", "Memory")] {
                if let Some(n) = int_attr(resource, attr)? {
                    desired.insert(property.to_string(), json!(n.to_string()));
                }
            }
            desired.insert(
                "ContainerDefinitions".to_string(),
                container_definitions(resource)?,
            );
        }
        aws::ECS_SERVICE => {
            let assign_public_ip = match resource.attributes.get("assign_public_ip") {
                Some(Value::Bool(true)) => "ENABLED",
                _ => "DISABLED",
            };
            let subnets: Vec<_> = list_attr(resource, "subnets")?
                .iter()
                .map(value_to_json)
                .collect::<Result<_, _>>()?;
            let security_groups: Vec<_> = list_attr(resource, "security_groups")?
                .iter()
                .map(value_to_json)
                .collect::<Result<_, _>>()?;
            desired.insert(
                "NetworkConfiguration".to_string(),
                json!({
                    "AwsvpcConfiguration": {
                        "AssignPublicIp": assign_public_ip,
                        "Subnets": subnets,
                        "SecurityGroups": security_groups,
                    }
                }),
            );
            desired.insert(
                "LoadBalancers".to_string(),
                json!(service_load_balancers(resource)?),
            );
        }
        _ => {}
    }
    Ok(())
}

/// Build the Cloud Control desired state of a fully resolved resource
pub fn desired_state(
    resource: &Resource,
    schema: &ResourceSchema,
    config: &ResourceConfig,
) -> Result<Map<String, serde_json::Value>, PropertyError> {
    let mut desired = Map::new();

    // Map attributes to AWS properties using provider_name
    for (name, value) in &resource.attributes {
        if name == "tags" {
            continue;
        }
        if let Some(property) = schema.provider_name(name) {
            desired.insert(property.to_string(), value_to_json(value)?);
        }
    }

    special_properties(resource, &mut desired)?;

    if config.has_tags {
        let tags = build_tags(resource.attributes.get("tags"));
        if !tags.is_empty() {
            desired.insert("Tags".to_string(), json!(tags));
        }
    }

    Ok(desired)
}

/// JSON Patch operations replacing every patchable property
pub fn patch_operations(
    desired: &Map<String, serde_json::Value>,
    config: &ResourceConfig,
) -> Vec<serde_json::Value> {
    let mut properties: Vec<_> = desired
        .iter()
        .filter(|(property, _)| !config.is_create_only(property))
        .collect();
    properties.sort_by(|a, b| a.0.cmp(b.0));
    properties
        .into_iter()
        .map(|(property, value)| {
            json!({
                "op": "replace",
                "path": format!("/{}", property),
                "value": value
            })
        })
        .collect()
}

/// Changed attributes Cloud Control cannot patch, sorted
pub fn create_only_changes(from: &State, to: &Resource, schema: &ResourceSchema) -> Vec<String> {
    let mut changed: Vec<String> = to
        .attributes
        .iter()
        .filter(|(name, value)| {
            schema.forces_replacement(name)
                && !from
                    .attributes
                    .get(name.as_str())
                    .is_some_and(|current| current.same_as(value))
        })
        .map(|(name, _)| name.clone())
        .collect();
    changed.sort();
    changed
}

/// Attributes reported back for a resource read from Cloud Control
pub fn read_attributes(
    props: &serde_json::Value,
    schema: &ResourceSchema,
    config: &ResourceConfig,
) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();

    for (name, attr) in &schema.attributes {
        if name == "tags" {
            continue;
        }
        if let Some(property) = &attr.provider_name
            && let Some(value) = props.get(property.as_str()).and_then(json_to_value)
        {
            attributes.insert(name.clone(), value);
        }
    }

    for (output, property) in config.outputs {
        if let Some(value) = props.get(*property).and_then(json_to_value) {
            attributes.insert(output.to_string(), value);
        }
    }

    if config.has_tags
        && let Some(tags) = props.get("Tags").and_then(|v| v.as_array())
    {
        let tags = parse_tags(tags);
        if !tags.is_empty() {
            attributes.insert("tags".to_string(), Value::Map(tags));
        }
    }

    attributes
}

/// Schema for `resource_type`
pub fn schema_for(resource_type: &str) -> Result<ResourceSchema, PropertyError> {
    aws::schemas()
        .into_iter()
        .find(|s| s.resource_type == resource_type)
        .ok_or_else(|| PropertyError::UnknownType(resource_type.to_string()))
}
