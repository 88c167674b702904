//! Stage - Typed output of one topology component plus the descriptors it emits

use std::collections::HashMap;

use brokerstack_core::providers::aws;
use brokerstack_core::resource::{Resource, ResourceId, Value};

use crate::config::Config;

pub const SECURITY: &str = "security";
pub const INTERNAL_ELB: &str = "internal-elb";
pub const EXTERNAL_ELB: &str = "external-elb";
pub const SERVICE: &str = "service";
pub const DNS: &str = "dns";

pub const TAG_KEY: &str = "PRODUCT";
pub const TAG_VALUE: &str = "SERVERLESS_DEBUGGER";

/// Resource types that accept tags
const TAGGABLE: &[&str] = &[
    aws::IAM_ROLE,
    aws::SECURITY_GROUP,
    aws::TARGET_GROUP,
    aws::LOAD_BALANCER,
    aws::ECS_CLUSTER,
    aws::TASK_DEFINITION,
    aws::ECS_SERVICE,
];

/// Reference to a resource emitted by an earlier stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    pub id: ResourceId,
    pub binding: String,
}

impl Handle {
    /// Value that resolves to `attribute` of the live resource
    pub fn attr(&self, attribute: &str) -> Value {
        Value::reference(&self.binding, attribute)
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }
}

/// What one component produced
#[derive(Debug, Clone)]
pub struct Stage<T> {
    pub name: &'static str,
    pub output: T,
    pub resources: Vec<Resource>,
}

impl<T> Stage<T> {
    pub fn bindings(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.binding.as_str()).collect()
    }

    pub fn resource(&self, binding: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.binding == binding)
    }
}

/// Collects descriptors for one stage, stamping stage and tags on each
pub(crate) struct StageBuilder<'a> {
    config: &'a Config,
    name: &'static str,
    resources: Vec<Resource>,
}

impl<'a> StageBuilder<'a> {
    pub fn new(config: &'a Config, name: &'static str) -> Self {
        Self {
            config,
            name,
            resources: Vec::new(),
        }
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    pub fn add(&mut self, resource: Resource) -> Handle {
        let mut resource = resource.with_stage(self.name);
        if self.config.apply_tags && TAGGABLE.contains(&resource.id.resource_type.as_str()) {
            resource = resource.with_attribute(
                "tags",
                Value::Map(HashMap::from([(
                    TAG_KEY.to_string(),
                    Value::from(TAG_VALUE),
                )])),
            );
        }
        let handle = Handle {
            id: resource.id.clone(),
            binding: resource.binding.clone(),
        };
        self.resources.push(resource);
        handle
    }

    pub fn finish<T>(self, output: T) -> Stage<T> {
        log::debug!("stage {}: {} resources", self.name, self.resources.len());
        Stage {
            name: self.name,
            output,
            resources: self.resources,
        }
    }
}
