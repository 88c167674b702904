//! Resource type configurations for AWS Cloud Control API
//!
//! This module defines:
//! - Resource type definitions (implementing ResourceType trait)
//! - Mapping between descriptor resource types and CloudFormation resource types
//! - Which properties each type reports back as outputs

use brokerstack_core::provider::ResourceType;
use brokerstack_core::providers::aws;

// =============================================================================
// Resource Type Definitions
// =============================================================================

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr) => {
        define_resource_type!($name, $type_name, false);
    };
    ($name:ident, $type_name:expr, $data_source:expr) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn is_data_source(&self) -> bool {
                $data_source
            }
        }
    };
}

define_resource_type!(VpcType, aws::VPC, true);
define_resource_type!(HostedZoneType, aws::HOSTED_ZONE, true);
define_resource_type!(SecurityGroupType, aws::SECURITY_GROUP);
define_resource_type!(IamRoleType, aws::IAM_ROLE);
define_resource_type!(TargetGroupType, aws::TARGET_GROUP);
define_resource_type!(LoadBalancerType, aws::LOAD_BALANCER);
define_resource_type!(ListenerType, aws::LISTENER);
define_resource_type!(ClusterType, aws::ECS_CLUSTER);
define_resource_type!(TaskDefinitionType, aws::TASK_DEFINITION);
define_resource_type!(ServiceType, aws::ECS_SERVICE);
define_resource_type!(CnameRecordType, aws::CNAME_RECORD);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(VpcType),
        Box::new(HostedZoneType),
        Box::new(SecurityGroupType),
        Box::new(IamRoleType),
        Box::new(TargetGroupType),
        Box::new(LoadBalancerType),
        Box::new(ListenerType),
        Box::new(ClusterType),
        Box::new(TaskDefinitionType),
        Box::new(ServiceType),
        Box::new(CnameRecordType),
    ]
}

// =============================================================================
// Resource Configuration
// =============================================================================

/// Output mapping: (output attribute, CloudFormation property)
pub type OutputMapping = (&'static str, &'static str);

/// Cloud Control configuration of one resource type
pub struct ResourceConfig {
    pub resource_type: &'static str,
    /// AWS CloudFormation type name (e.g., "AWS::ECS::Service")
    pub aws_type_name: &'static str,
    /// Read-only properties surfaced as outputs other resources reference
    pub outputs: &'static [OutputMapping],
    /// Properties that cannot be patched; changing them needs a replacement
    pub create_only: &'static [&'static str],
    /// Whether this resource type uses tags
    pub has_tags: bool,
}

impl ResourceConfig {
    pub fn is_create_only(&self, property: &str) -> bool {
        self.create_only.contains(&property)
    }
}

pub const SECURITY_GROUP_CONFIG: ResourceConfig = ResourceConfig {
    resource_type: aws::SECURITY_GROUP,
    aws_type_name: "AWS::EC2::SecurityGroup",
    outputs: &[("id", "GroupId")],
    create_only: &["GroupName", "GroupDescription", "VpcId"],
    has_tags: true,
};

pub const IAM_ROLE_CONFIG: ResourceConfig = ResourceConfig {
    resource_type: aws::IAM_ROLE,
    aws_type_name: "AWS::IAM::Role",
    outputs: &[("arn", "Arn")],
    create_only: &["RoleName"],
    has_tags: true,
};

pub const TARGET_GROUP_CONFIG: ResourceConfig = ResourceConfig {
    resource_type: aws::TARGET_GROUP,
    aws_type_name: "AWS::ElasticLoadBalancingV2::TargetGroup",
    outputs: &[("arn", "TargetGroupArn")],
    create_only: &["Name", "Port", "Protocol", "TargetType", "VpcId"],
    has_tags: true,
};

pub const LOAD_BALANCER_CONFIG: ResourceConfig = ResourceConfig {
    resource_type: aws::LOAD_BALANCER,
    aws_type_name: "AWS::ElasticLoadBalancingV2::LoadBalancer",
    outputs: &[("arn", "LoadBalancerArn"), ("dns_name", "DNSName")],
    create_only: &["Name", "Scheme", "Type"],
    has_tags: true,
};

pub const LISTENER_CONFIG: ResourceConfig = ResourceConfig {
    resource_type: aws::LISTENER,
    aws_type_name: "AWS::ElasticLoadBalancingV2::Listener",
    outputs: &[("arn", "ListenerArn")],
    create_only: &["LoadBalancerArn"],
    has_tags: false,
};

pub const CLUSTER_CONFIG: ResourceConfig = ResourceConfig {
    resource_type: aws::ECS_CLUSTER,
    aws_type_name: "AWS::ECS::Cluster",
    outputs: &[("arn", "Arn"), ("name", "ClusterName")],
    create_only: &["ClusterName"],
    has_tags: true,
};

// Task definitions are immutable; every property is create-only.
pub const TASK_DEFINITION_CONFIG: ResourceConfig = ResourceConfig {
    resource_type: aws::TASK_DEFINITION,
    aws_type_name: "AWS::ECS::TaskDefinition",
    outputs: &[("arn", "TaskDefinitionArn")],
    create_only: &[
        "Family",
        "Cpu",
        "Memory",
        "NetworkMode",
        "RequiresCompatibilities",
        "ExecutionRoleArn",
        "TaskRoleArn",
        "ContainerDefinitions",
        "Tags",
    ],
    has_tags: true,
};

pub const SERVICE_CONFIG: ResourceConfig = ResourceConfig {
    resource_type: aws::ECS_SERVICE,
    aws_type_name: "AWS::ECS::Service",
    outputs: &[("arn", "ServiceArn")],
    create_only: &["ServiceName", "Cluster", "LaunchType"],
    has_tags: true,
};

const CONFIGS: &[&ResourceConfig] = &[
    &SECURITY_GROUP_CONFIG,
    &IAM_ROLE_CONFIG,
    &TARGET_GROUP_CONFIG,
    &LOAD_BALANCER_CONFIG,
    &LISTENER_CONFIG,
    &CLUSTER_CONFIG,
    &TASK_DEFINITION_CONFIG,
    &SERVICE_CONFIG,
];

/// Cloud Control configuration for `resource_type`, if Cloud Control manages it
pub fn get_resource_config(resource_type: &str) -> Option<&'static ResourceConfig> {
    CONFIGS
        .iter()
        .copied()
        .find(|c| c.resource_type == resource_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_sources_are_marked() {
        let data_sources: Vec<_> = resource_types()
            .into_iter()
            .filter(|t| t.is_data_source())
            .map(|t| t.name())
            .collect();
        assert_eq!(data_sources, aws::DATA_SOURCES.to_vec());
    }

    #[test]
    fn every_schema_type_is_supported() {
        let supported: Vec<_> = resource_types().iter().map(|t| t.name()).collect();
        for schema in aws::schemas() {
            assert!(
                supported.contains(&schema.resource_type.as_str()),
                "{} has no resource type",
                schema.resource_type
            );
        }
    }

    #[test]
    fn route53_types_bypass_cloud_control() {
        assert!(get_resource_config(aws::CNAME_RECORD).is_none());
        assert!(get_resource_config(aws::HOSTED_ZONE).is_none());
        assert!(get_resource_config(aws::VPC).is_none());
        assert_eq!(
            get_resource_config(aws::LOAD_BALANCER).map(|c| c.aws_type_name),
            Some("AWS::ElasticLoadBalancingV2::LoadBalancer")
        );
    }

    #[test]
    fn create_only_properties_force_replacement_in_the_plan() {
        for schema in aws::schemas() {
            let Some(config) = get_resource_config(&schema.resource_type) else {
                continue;
            };
            for (name, attr) in &schema.attributes {
                let Some(property) = attr.provider_name.as_deref() else {
                    continue;
                };
                assert_eq!(
                    config.is_create_only(property),
                    schema.forces_replacement(name),
                    "{}.{} ({})",
                    schema.resource_type,
                    name,
                    property
                );
            }
        }
    }
}
