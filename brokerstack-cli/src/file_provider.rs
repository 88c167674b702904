//! Offline provider that records resources in a JSON file.
//!
//! Identifiers, ARNs and load balancer DNS names are derived from the
//! resource name, so repeated runs against the same file are stable.
//! Records are keyed by identifier. Task definitions get a new revision per
//! registration and deregistered revisions stay on file as inactive.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use brokerstack_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
use brokerstack_core::providers::aws;
use brokerstack_core::resource::{Resource, ResourceId, State, Value};
use brokerstack_provider_awscc::resources;
use brokerstack_state::state::{json_to_value, value_to_json};

const ACCOUNT_ID: &str = "000000000000";
const STATUS: &str = "status";
const INACTIVE: &str = "INACTIVE";

type Records = HashMap<String, HashMap<String, serde_json::Value>>;

pub struct FileProvider {
    state_file: PathBuf,
    region: String,
}

impl FileProvider {
    pub const DEFAULT_PATH: &'static str = ".brokerstack/resources.json";

    pub fn new(region: impl Into<String>) -> Self {
        Self::with_path(PathBuf::from(Self::DEFAULT_PATH), region)
    }

    pub fn with_path(state_file: PathBuf, region: impl Into<String>) -> Self {
        Self {
            state_file,
            region: region.into(),
        }
    }

    fn load(&self) -> ProviderResult<Records> {
        match fs::read_to_string(&self.state_file) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                ProviderError::new(format!(
                    "Failed to parse {}: {}",
                    self.state_file.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(ProviderError::new(format!("Failed to read resources: {}", e))),
        }
    }

    fn save(&self, records: &Records) -> ProviderResult<()> {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.state_file.parent() {
                fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string_pretty(records)?;
            fs::write(&self.state_file, content)
        };
        write().map_err(|e| ProviderError::new(format!("Failed to save resources: {}", e)))
    }

    fn arn(&self, service: &str, kind: &str, name: &str) -> String {
        format!(
            "arn:aws:{}:{}:{}:{}/{}",
            service, self.region, ACCOUNT_ID, kind, name
        )
    }

    /// Short stable suffix for generated ids
    fn fingerprint(name: &str) -> String {
        let hash = name
            .bytes()
            .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
        format!("{:012x}", hash & 0xffff_ffff_ffff)
    }

    /// Next unused revision of a task definition family
    fn next_revision(records: &Records, family: &str) -> u32 {
        records
            .keys()
            .filter_map(|k| k.strip_prefix(family)?.strip_prefix(':')?.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Identifier plus the output attributes a real provider would report
    fn generate(&self, resource: &Resource, records: &Records) -> (String, HashMap<String, Value>) {
        let name = resource.id.name.as_str();
        let suffix = Self::fingerprint(name);
        let mut outputs = HashMap::new();

        let identifier = match resource.id.resource_type.as_str() {
            aws::SECURITY_GROUP => {
                let id = format!("sg-{}", suffix);
                outputs.insert("id".to_string(), Value::from(id.as_str()));
                id
            }
            aws::IAM_ROLE => {
                outputs.insert("arn".to_string(), Value::from(self.arn("iam", "role", name)));
                name.to_string()
            }
            aws::TARGET_GROUP => {
                let arn = self.arn("elasticloadbalancing", "targetgroup", &format!("{}/{}", name, suffix));
                outputs.insert("arn".to_string(), Value::from(arn.as_str()));
                arn
            }
            aws::LOAD_BALANCER => {
                let arn = self.arn("elasticloadbalancing", "loadbalancer/app", &format!("{}/{}", name, suffix));
                let internal = resource.attribute("scheme").and_then(Value::as_str) == Some("internal");
                let dns_name = format!(
                    "{}{}-{}.{}.elb.amazonaws.com",
                    if internal { "internal-" } else { "" },
                    name,
                    &suffix[..8],
                    self.region
                );
                outputs.insert("arn".to_string(), Value::from(arn.as_str()));
                outputs.insert("dns_name".to_string(), Value::from(dns_name));
                arn
            }
            aws::LISTENER => {
                let arn = self.arn("elasticloadbalancing", "listener/app", &format!("{}/{}", name, suffix));
                outputs.insert("arn".to_string(), Value::from(arn.as_str()));
                arn
            }
            aws::ECS_CLUSTER => {
                let arn = self.arn("ecs", "cluster", name);
                outputs.insert("arn".to_string(), Value::from(arn.as_str()));
                outputs.insert("name".to_string(), Value::from(name));
                arn
            }
            aws::TASK_DEFINITION => {
                let family = self.arn("ecs", "task-definition", name);
                let arn = format!("{}:{}", family, Self::next_revision(records, &family));
                outputs.insert("arn".to_string(), Value::from(arn.as_str()));
                arn
            }
            aws::ECS_SERVICE => {
                let arn = self.arn("ecs", "service", name);
                outputs.insert("arn".to_string(), Value::from(arn.as_str()));
                arn
            }
            aws::CNAME_RECORD => {
                let zone = resource
                    .attribute("hosted_zone_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                outputs.insert("fqdn".to_string(), Value::from(name));
                format!("{}|{}", zone, name)
            }
            _ => name.to_string(),
        };
        (identifier, outputs)
    }

    fn record(&self, id: &ResourceId, identifier: &str, attributes: &HashMap<String, Value>) -> ProviderResult<()> {
        let mut records = self.load()?;
        let mut stored: HashMap<String, serde_json::Value> = attributes
            .iter()
            .map(|(k, v)| (k.clone(), value_to_json(v)))
            .collect();
        stored.insert("resource".to_string(), serde_json::Value::from(id.to_string()));
        records.insert(identifier.to_string(), stored);
        self.save(&records)
    }

    fn lookup_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let (identifier, attributes) = match resource.id.resource_type.as_str() {
            aws::VPC => {
                let id = resource
                    .attribute("vpc_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("vpc-{}", Self::fingerprint(&self.region)));
                let attrs = HashMap::from([("id".to_string(), Value::from(id.as_str()))]);
                (id, attrs)
            }
            aws::HOSTED_ZONE => {
                let domain_name = resource
                    .attribute("domain_name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ProviderError::new("domain_name is required"))?;
                let id = format!("Z{}", Self::fingerprint(domain_name).to_uppercase());
                let attrs = HashMap::from([
                    ("id".to_string(), Value::from(id.as_str())),
                    ("domain_name".to_string(), Value::from(domain_name)),
                ]);
                (id, attrs)
            }
            other => {
                return Err(ProviderError::new(format!("{} is not a data source", other))
                    .for_resource(resource.id.clone()));
            }
        };
        Ok(State::existing(resource.id.clone(), attributes).with_identifier(identifier))
    }

    fn read_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let records = self.load()?;
        let Some(stored) = records.get(identifier) else {
            return Ok(State::not_found(id.clone()));
        };
        if stored.get(STATUS).and_then(|v| v.as_str()) == Some(INACTIVE) {
            return Ok(State::not_found(id.clone()));
        }
        let attributes = stored
            .iter()
            .filter(|(k, _)| k.as_str() != "resource")
            .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
            .collect();
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let records = self.load()?;
        let (identifier, outputs) = self.generate(resource, &records);
        if records.contains_key(&identifier) {
            return Err(ProviderError::new("resource already exists").for_resource(resource.id.clone()));
        }
        let mut attributes = resource.attributes.clone();
        attributes.extend(outputs);
        self.record(&resource.id, &identifier, &attributes)?;
        log::info!("created {} as {}", resource.id, identifier);
        Ok(State::existing(resource.id.clone(), attributes).with_identifier(identifier))
    }

    fn update_resource(&self, id: &ResourceId, identifier: &str, to: &Resource) -> ProviderResult<State> {
        let current = self.read_resource(id, identifier)?;
        if !current.exists {
            return Err(ProviderError::new("resource not found").for_resource(id.clone()));
        }
        let mut attributes = current.attributes;
        attributes.extend(to.attributes.clone());
        self.record(id, identifier, &attributes)?;
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let mut records = self.load()?;
        if id.resource_type == aws::TASK_DEFINITION {
            // deregistered revisions keep their number
            match records.get_mut(identifier) {
                Some(stored) => {
                    stored.insert(STATUS.to_string(), serde_json::Value::from(INACTIVE));
                }
                None => log::warn!("{} was already gone", identifier),
            }
        } else if records.remove(identifier).is_none() {
            log::warn!("{} was already gone", identifier);
        }
        self.save(&records)
    }
}

impl Provider for FileProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::resource_types()
    }

    fn lookup(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.lookup_resource(&resource) })
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.read_resource(&id, &identifier) })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource) })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &to) })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier) })
    }
}
